use tracing::debug;

use super::super::affinity::AffinityScore;
use super::super::domain::{Candidate, CandidateId, Supporter, SupporterId};
use super::super::error::EngineError;
use super::super::repository::{ActivityLedger, ProfileStore};
use super::MatchingService;

impl<S, L> MatchingService<S, L>
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    /// Returns the cached score for the pair when still fresh, otherwise computes and
    /// stores a new one. Cold pairs are computed on demand.
    pub fn compute_affinity(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<AffinityScore, EngineError> {
        let supporter = self.load_supporter(supporter_id)?;
        let candidate = self.load_candidate(candidate_id)?;
        self.affinity_for(&supporter, &candidate)
    }

    /// Always recalculates, archiving the previous row.
    pub fn recompute_affinity(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<AffinityScore, EngineError> {
        let supporter = self.load_supporter(supporter_id)?;
        let candidate = self.load_candidate(candidate_id)?;
        self.calculate_and_record(&supporter, &candidate)
    }

    pub(crate) fn affinity_for(
        &self,
        supporter: &Supporter,
        candidate: &Candidate,
    ) -> Result<AffinityScore, EngineError> {
        if let Some(cached) = self.store.affinity(&supporter.id, &candidate.id)? {
            let version = self.calculator.calculation_version();
            match cached.ensure_fresh(self.now(), &version, supporter, candidate) {
                Ok(()) => return Ok(cached),
                Err(stale) => debug!(reason = %stale, "recomputing affinity"),
            }
        }
        self.calculate_and_record(supporter, candidate)
    }

    fn calculate_and_record(
        &self,
        supporter: &Supporter,
        candidate: &Candidate,
    ) -> Result<AffinityScore, EngineError> {
        let entries = self.ledger.entries_for(&supporter.id)?;
        let summary = self.grading.summarize(&entries);
        let history = summary.per_candidate.get(&candidate.id);

        let score = self
            .calculator
            .calculate(supporter, candidate, history, self.now());
        self.store.record_affinity(score.clone())?;

        debug!(
            supporter_id = %supporter.id,
            candidate_id = %candidate.id,
            total = score.total_score,
            category = score.category.label(),
            "affinity calculated"
        );
        Ok(score)
    }
}
