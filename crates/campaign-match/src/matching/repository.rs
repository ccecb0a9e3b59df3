use serde::{Deserialize, Serialize};

use super::affinity::AffinityScore;
use super::allocation::{Assignment, AssignmentId, AssignmentStatus, PriorityModifier};
use super::domain::{ActivityRecord, Candidate, CandidateId, NewActivity, Supporter, SupporterId};

/// Error enumeration for profile store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("assignment id {0} is already taken")]
    DuplicateId(AssignmentId),
    #[error("record version mismatch (expected {expected}, found {found})")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// Error enumeration for activity ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("activity ledger unavailable: {0}")]
    Unavailable(String),
    #[error("activity ledger read timed out")]
    TimedOut,
}

/// Result of an atomic check-and-increment on a candidate's slot counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SlotReservation {
    Reserved { assigned: u32 },
    AtCapacity { cap: u32, assigned: u32 },
    /// The counter moved since it was read; `assigned` is the fresh value.
    Contended { assigned: u32 },
}

/// Versioned key-value storage for supporters, candidates, affinity rows and assignments.
///
/// Saves compare the record's `version` with the stored one and fail with
/// [`StoreError::VersionMismatch`] when they differ; successful saves bump the version.
pub trait ProfileStore: Send + Sync {
    fn supporter(&self, id: &SupporterId) -> Result<Option<Supporter>, StoreError>;
    /// Supporters ordered by id, strictly after `after`.
    fn supporters_page(
        &self,
        after: Option<&SupporterId>,
        limit: usize,
    ) -> Result<Vec<Supporter>, StoreError>;
    fn save_supporter(&self, supporter: Supporter) -> Result<Supporter, StoreError>;

    fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError>;
    /// Candidates ordered by id, strictly after `after`.
    fn candidates_page(
        &self,
        after: Option<&CandidateId>,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError>;
    fn save_candidate(&self, candidate: Candidate) -> Result<Candidate, StoreError>;

    /// Increments the slot counter from `expected_assigned` if the cap allows it, atomically.
    fn reserve_slot(
        &self,
        id: &CandidateId,
        expected_assigned: u32,
    ) -> Result<SlotReservation, StoreError>;
    fn release_slot(&self, id: &CandidateId) -> Result<(), StoreError>;

    fn affinity(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<Option<AffinityScore>, StoreError>;
    /// Stores the score, archiving any previous row for the pair.
    fn record_affinity(&self, score: AffinityScore) -> Result<(), StoreError>;
    fn affinity_history(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<Vec<AffinityScore>, StoreError>;
    fn affinities_for_supporter(&self, id: &SupporterId)
        -> Result<Vec<AffinityScore>, StoreError>;
    fn affinities_for_candidate(&self, id: &CandidateId)
        -> Result<Vec<AffinityScore>, StoreError>;

    fn assignments_for_supporter(&self, id: &SupporterId) -> Result<Vec<Assignment>, StoreError>;
    fn assignments_for_candidate(&self, id: &CandidateId) -> Result<Vec<Assignment>, StoreError>;
    /// Issues an id no stored assignment uses, across engine restarts.
    fn next_assignment_id(&self) -> Result<AssignmentId, StoreError>;
    /// Fails with [`StoreError::Conflict`] when the pair already holds a slot and with
    /// [`StoreError::DuplicateId`] when the id is taken.
    fn insert_assignment(&self, assignment: Assignment) -> Result<Assignment, StoreError>;
    /// Replaces the stored assignment only while its status is still `expected`. When
    /// the replacement gives up a slot the candidate's counter is released in the same
    /// step. Returns `false`, changing nothing, when the row has already moved on.
    fn swap_assignment(
        &self,
        assignment: Assignment,
        expected: AssignmentStatus,
    ) -> Result<bool, StoreError>;

    /// Modifiers scoped to the candidate plus global ones.
    fn priority_modifiers(&self, id: &CandidateId) -> Result<Vec<PriorityModifier>, StoreError>;

    fn enqueue_recalc(&self, id: &SupporterId) -> Result<(), StoreError>;
    fn take_recalc_batch(&self, limit: usize) -> Result<Vec<SupporterId>, StoreError>;
}

/// Append-only activity log; reads may run concurrently with appends.
pub trait ActivityLedger: Send + Sync {
    fn append(&self, activity: NewActivity) -> Result<ActivityRecord, LedgerError>;
    fn entries_for(&self, supporter_id: &SupporterId) -> Result<Vec<ActivityRecord>, LedgerError>;
}
