//! Capacity-constrained allocation: configuration, ranking, eligibility and summaries.

mod assignment;
mod rules;

pub use assignment::{
    Assignment, AssignmentId, AssignmentPerformance, AssignmentRole, AssignmentSource,
    AssignmentStatus, AssignmentType, PriorityModifier,
};
pub use rules::{
    default_role_rules, effective_priority, select_role, AssignmentBands, ModifierClamps,
    RoleRule, DEFAULT_ROLE,
};

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{Candidate, CandidateId, GeographicMatch, Grade, SkillTag, Supporter, SupporterId};
use super::error::{EngineError, ValidationError};

pub const DEFAULT_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Supporters fetched per store round trip while building a ranking.
    pub page_size: usize,
    /// Used when a batch request does not carry its own threshold.
    pub default_min_score: f32,
    pub single_match_min_score: f32,
    pub bands: AssignmentBands,
    pub role_rules: Vec<RoleRule>,
    pub modifier_clamps: ModifierClamps,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            default_min_score: 0.0,
            single_match_min_score: 40.0,
            bands: AssignmentBands::default(),
            role_rules: default_role_rules(),
            modifier_clamps: ModifierClamps::default(),
        }
    }
}

impl AllocationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_size == 0 {
            return Err(ValidationError::AllocationSettings(
                "page_size must be at least 1".to_string(),
            ));
        }
        validate_score(self.default_min_score)?;
        validate_score(self.single_match_min_score)?;
        for rule in &self.role_rules {
            validate_score(rule.min_score)?;
        }
        self.bands.validate()?;
        self.modifier_clamps.validate()
    }
}

pub(crate) fn validate_score(score: f32) -> Result<(), ValidationError> {
    if score.is_finite() && (0.0..=100.0).contains(&score) {
        Ok(())
    } else {
        Err(ValidationError::ScoreOutOfRange(score))
    }
}

/// Parameters for one candidate's batch run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub max_to_assign: u32,
    pub min_score: f32,
}

impl AllocationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_to_assign == 0 {
            return Err(ValidationError::EmptyBatch);
        }
        validate_score(self.min_score)
    }
}

/// Why an eligible, above-threshold supporter was passed over. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    #[serde(rename = "AT CAPACITY")]
    AtCapacity,
    #[serde(rename = "ALREADY ASSIGNED")]
    AlreadyAssigned,
}

impl SkipReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AtCapacity => "AT CAPACITY",
            Self::AlreadyAssigned => "ALREADY ASSIGNED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ConcurrencyConflict,
    NotFound,
    StaleData,
    Validation,
    Store,
    Ledger,
}

impl From<&EngineError> for FailureReason {
    fn from(error: &EngineError) -> Self {
        match error {
            EngineError::ConcurrencyConflict(_) => Self::ConcurrencyConflict,
            EngineError::NotFound(_) => Self::NotFound,
            EngineError::StaleData { .. } => Self::StaleData,
            EngineError::Validation(_) => Self::Validation,
            EngineError::Store(_) => Self::Store,
            EngineError::Ledger(_) => Self::Ledger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedEntry {
    pub supporter_id: SupporterId,
    pub assignment_id: AssignmentId,
    pub score: f32,
    pub role: AssignmentRole,
    pub assignment_type: AssignmentType,
    pub base_priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub supporter_id: SupporterId,
    pub score: f32,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub supporter_id: SupporterId,
    pub reason: FailureReason,
    pub message: String,
}

impl FailedEntry {
    pub(crate) fn from_error(supporter_id: SupporterId, error: &EngineError) -> Self {
        Self {
            supporter_id,
            reason: FailureReason::from(error),
            message: error.to_string(),
        }
    }
}

/// Outcome of one candidate's batch run; partial failures never abort the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub candidate_id: CandidateId,
    pub cap: Option<u32>,
    pub assigned: Vec<AssignedEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub failed: Vec<FailedEntry>,
    /// Automatic assignments superseded before ranking.
    pub cleared_automatic: u32,
    /// Manual assignments left in place (and holding their slots).
    pub preserved_manual: u32,
    pub below_min_score: u32,
    pub ineligible: u32,
}

impl AllocationSummary {
    pub(crate) fn new(candidate_id: CandidateId, cap: Option<u32>) -> Self {
        Self {
            candidate_id,
            cap,
            assigned: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            cleared_automatic: 0,
            preserved_manual: 0,
            below_min_score: 0,
            ineligible: 0,
        }
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped
            .iter()
            .filter(|entry| entry.reason == reason)
            .count()
    }
}

/// Minimal per-supporter row kept while ranking a candidate's pool.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RankedEntry {
    pub supporter_id: SupporterId,
    pub score: f32,
    pub grade: Grade,
    pub skills: BTreeSet<SkillTag>,
}

/// Score descending, supporter id ascending.
pub(crate) fn rank(entries: &mut [RankedEntry]) {
    entries.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then_with(|| left.supporter_id.cmp(&right.supporter_id))
    });
}

/// Orders candidate choices for a single supporter: score descending, candidate id ascending.
pub(crate) fn compare_choices(
    left: &(CandidateId, f32),
    right: &(CandidateId, f32),
) -> CmpOrdering {
    right.1.total_cmp(&left.1).then_with(|| left.0.cmp(&right.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligibility {
    OptedOut,
    Unreachable,
    OutsideCoverage,
    NotAccepting,
}

pub fn eligibility(supporter: &Supporter, candidate: &Candidate) -> Result<(), Ineligibility> {
    if !candidate.accepting {
        return Err(Ineligibility::NotAccepting);
    }
    if supporter.contact.opted_out {
        return Err(Ineligibility::OptedOut);
    }
    if !supporter.contact.reachable() {
        return Err(Ineligibility::Unreachable);
    }
    if candidate.geographic_match(&supporter.county) == GeographicMatch::NoMatch {
        return Err(Ineligibility::OutsideCoverage);
    }
    Ok(())
}

/// Cooperative cancellation flag shared with a running bulk job.
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    cancelled: Arc<AtomicBool>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub candidate_id: CandidateId,
    pub reason: FailureReason,
    pub message: String,
}

/// Outcome of an allocation pass across every candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAllocationReport {
    pub summaries: Vec<AllocationSummary>,
    pub failures: Vec<CandidateFailure>,
    pub cancelled: bool,
}

impl BatchAllocationReport {
    pub fn assigned_total(&self) -> usize {
        self.summaries
            .iter()
            .map(AllocationSummary::assigned_count)
            .sum()
    }
}
