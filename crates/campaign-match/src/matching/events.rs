//! Explicit dispatcher for upstream change events.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::allocation::AssignmentId;
use super::domain::{
    ActivityRecord, CandidateId, DimensionProfile, EntityAttributes, EntityRef, NewActivity,
    SupporterId,
};
use super::error::EngineError;
use super::grading::GradeOutcome;
use super::repository::{ActivityLedger, ProfileStore};
use super::service::{CapacityChange, MatchingService};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ActivityRecorded {
        activity: NewActivity,
    },
    SupporterAttributesChanged {
        supporter_id: SupporterId,
        /// Replacement attributes; when absent the stored ones are re-profiled.
        #[serde(default)]
        attributes: Option<EntityAttributes>,
    },
    CandidateCapacityChanged {
        candidate_id: CandidateId,
        new_cap: Option<u32>,
    },
}

impl EngineEvent {
    pub const fn label(&self) -> &'static str {
        match self {
            EngineEvent::ActivityRecorded { .. } => "activity_recorded",
            EngineEvent::SupporterAttributesChanged { .. } => "supporter_attributes_changed",
            EngineEvent::CandidateCapacityChanged { .. } => "candidate_capacity_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchOutcome {
    ActivityRecorded {
        record: ActivityRecord,
        grade: GradeOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        credited_assignment: Option<AssignmentId>,
    },
    DimensionsRefreshed {
        supporter_id: SupporterId,
        profile: DimensionProfile,
    },
    CapacityChanged(CapacityChange),
}

/// Routes each event to the engine operation it triggers.
pub struct EventDispatcher<S, L> {
    service: Arc<MatchingService<S, L>>,
}

impl<S, L> EventDispatcher<S, L>
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    pub fn new(service: Arc<MatchingService<S, L>>) -> Self {
        Self { service }
    }

    pub fn dispatch(&self, event: EngineEvent) -> Result<DispatchOutcome, EngineError> {
        let label = event.label();
        let outcome = match event {
            EngineEvent::ActivityRecorded { activity } => self.activity_recorded(activity)?,
            EngineEvent::SupporterAttributesChanged {
                supporter_id,
                attributes,
            } => {
                let profile = match attributes {
                    Some(attributes) => self
                        .service
                        .update_supporter_attributes(&supporter_id, attributes)?,
                    None => self
                        .service
                        .refresh_dimensions(&EntityRef::Supporter(supporter_id.clone()))?,
                };
                DispatchOutcome::DimensionsRefreshed {
                    supporter_id,
                    profile,
                }
            }
            EngineEvent::CandidateCapacityChanged {
                candidate_id,
                new_cap,
            } => DispatchOutcome::CapacityChanged(
                self.service.set_capacity(&candidate_id, new_cap)?,
            ),
        };
        info!(event = label, "event dispatched");
        Ok(outcome)
    }

    fn activity_recorded(&self, activity: NewActivity) -> Result<DispatchOutcome, EngineError> {
        activity.validate()?;
        self.service.load_supporter(&activity.supporter_id)?;
        if let Some(candidate_id) = &activity.candidate_id {
            self.service.load_candidate(candidate_id)?;
        }

        let record = self.service.ledger().append(activity)?;
        let grade = self.service.recompute_grade(&record.supporter_id)?;
        let credited_assignment = self.service.record_assignment_activity(&record)?;

        Ok(DispatchOutcome::ActivityRecorded {
            record,
            grade,
            credited_assignment,
        })
    }
}
