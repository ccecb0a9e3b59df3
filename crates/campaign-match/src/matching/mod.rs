//! Supporter grading, candidate affinity scoring and capacity-constrained allocation.

pub mod affinity;
pub mod allocation;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod grading;
pub mod import;
pub mod leaderboard;
pub mod memory;
pub mod profiler;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use affinity::{AffinityCalculator, AffinityCategory, AffinityConfig, AffinityFactor, AffinityScore};
pub use allocation::{
    AllocationConfig, AllocationRequest, AllocationSummary, Assignment, AssignmentRole,
    AssignmentStatus, BatchAllocationReport, JobControl, PriorityModifier, SkipReason,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use domain::{
    ActivityId, ActivityKind, ActivityRecord, ActivityStatus, Candidate, CandidateId,
    EntityAttributes, EntityRef, Grade, LeadScore, NewActivity, OfficeLevel, Supporter,
    SupporterId,
};
pub use error::{EngineError, ValidationError};
pub use events::{DispatchOutcome, EngineEvent, EventDispatcher};
pub use grading::{GradeOutcome, GradingConfig};
pub use import::{ImportError, SeedImporter, SeedPaths, SeedReport};
pub use leaderboard::{Leaderboard, LeaderboardEntry, LeaderboardScope};
pub use memory::{InMemoryLedger, InMemoryProfileStore};
pub use repository::{ActivityLedger, LedgerError, ProfileStore, StoreError};
pub use router::matching_router;
pub use service::{CapacityChange, ManualAssignmentOutcome, MatchingService, RecalcReport};
