mod affinity;
mod allocation;
mod grading;
mod leaderboard;
mod profiling;

pub use allocation::{CapacityChange, ManualAssignmentOutcome};
pub use grading::RecalcReport;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::affinity::AffinityCalculator;
use super::allocation::AllocationConfig;
use super::clock::{Clock, SystemClock};
use super::config::EngineConfig;
use super::domain::{Candidate, CandidateId, EntityRef, Supporter, SupporterId};
use super::error::{EngineError, ValidationError};
use super::grading::GradingEngine;
use super::repository::{ActivityLedger, ProfileStore};

/// Service composing the store, the ledger and the pure engine stages.
///
/// All durable state lives behind `S` and `L`; the service itself only holds
/// configuration, so one instance can serve concurrent callers.
pub struct MatchingService<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    config: Arc<EngineConfig>,
    grading: Arc<GradingEngine>,
    calculator: Arc<AffinityCalculator>,
    clock: Arc<dyn Clock>,
}

impl<S, L> MatchingService<S, L>
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>, config: EngineConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            store,
            ledger,
            grading: Arc::new(GradingEngine::new(config.grading.clone())),
            calculator: Arc::new(AffinityCalculator::new(config.affinity.clone())),
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn allocation_config(&self) -> &AllocationConfig {
        &self.config.allocation
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn load_supporter(&self, id: &SupporterId) -> Result<Supporter, EngineError> {
        self.store
            .supporter(id)?
            .ok_or_else(|| EngineError::NotFound(EntityRef::Supporter(id.clone())))
    }

    pub(crate) fn load_candidate(&self, id: &CandidateId) -> Result<Candidate, EngineError> {
        self.store
            .candidate(id)?
            .ok_or_else(|| EngineError::NotFound(EntityRef::Candidate(id.clone())))
    }

    /// Visits every supporter in id order, one bounded page at a time.
    pub(crate) fn for_each_supporter<F>(&self, mut visit: F) -> Result<(), EngineError>
    where
        F: FnMut(Supporter) -> Result<(), EngineError>,
    {
        let page_size = self.config.allocation.page_size;
        let mut after: Option<SupporterId> = None;
        loop {
            let page = self.store.supporters_page(after.as_ref(), page_size)?;
            let exhausted = page.len() < page_size;
            after = page.last().map(|supporter| supporter.id.clone());
            for supporter in page {
                visit(supporter)?;
            }
            if exhausted || after.is_none() {
                return Ok(());
            }
        }
    }

    /// Visits every candidate in id order, one bounded page at a time.
    pub(crate) fn for_each_candidate<F>(&self, mut visit: F) -> Result<(), EngineError>
    where
        F: FnMut(Candidate) -> Result<bool, EngineError>,
    {
        let page_size = self.config.allocation.page_size;
        let mut after: Option<CandidateId> = None;
        loop {
            let page = self.store.candidates_page(after.as_ref(), page_size)?;
            let exhausted = page.len() < page_size;
            after = page.last().map(|candidate| candidate.id.clone());
            for candidate in page {
                if !visit(candidate)? {
                    return Ok(());
                }
            }
            if exhausted || after.is_none() {
                return Ok(());
            }
        }
    }
}
