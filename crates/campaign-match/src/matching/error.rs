use chrono::{DateTime, Utc};

use super::domain::{ActivityId, CandidateId, EntityRef, SupporterId};
use super::repository::{LedgerError, StoreError};

/// Malformed or out-of-range input rejected at the engine boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("lead score {0} exceeds the maximum of 1000")]
    LeadScoreOutOfRange(u32),
    #[error("dimension vector expects {expected} components, found {found}")]
    DimensionLength { expected: usize, found: usize },
    #[error("dimension {dimension} value {value} outside [0, 100]")]
    DimensionOutOfRange { dimension: &'static str, value: f32 },
    #[error("attribute for {dimension} is not a finite number")]
    NonFiniteAttribute { dimension: &'static str },
    #[error("affinity weights must sum to 100 (found {0})")]
    WeightsSum(u32),
    #[error("category bands must be strictly descending within [0, 100]")]
    CategoryBands,
    #[error("geography tiers must be descending within [0, 100]")]
    GeographyTiers,
    #[error("invalid grade table: {0}")]
    GradeTable(String),
    #[error("invalid allocation settings: {0}")]
    AllocationSettings(String),
    #[error("score {0} outside [0, 100]")]
    ScoreOutOfRange(f32),
    #[error("max_to_assign must be at least 1")]
    EmptyBatch,
    #[error("activity {0} carries no amount")]
    EmptyActivity(ActivityId),
    #[error("cap {requested} for {candidate} is below its {manual} manual assignment(s)")]
    CapBelowManual {
        candidate: CandidateId,
        requested: u32,
        manual: u32,
    },
    #[error("assignment cannot move from {from} to {to}")]
    StatusTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Error raised by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(EntityRef),
    #[error("affinity {supporter_id}/{candidate_id} is stale (expires {expires_at})")]
    StaleData {
        supporter_id: SupporterId,
        candidate_id: CandidateId,
        expires_at: DateTime<Utc>,
    },
    #[error("concurrent update lost for {0} after retry")]
    ConcurrencyConflict(EntityRef),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl EngineError {
    /// Stable machine-readable code for batch summaries and HTTP payloads.
    pub const fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::StaleData { .. } => "stale_data",
            EngineError::ConcurrencyConflict(_) => "concurrency_conflict",
            EngineError::Store(StoreError::Conflict) => "conflict",
            EngineError::Store(_) => "store",
            EngineError::Ledger(_) => "ledger",
        }
    }
}
