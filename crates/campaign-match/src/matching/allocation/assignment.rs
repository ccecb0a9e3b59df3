use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{ActivityKind, CandidateId, Grade, SupporterId};
use super::super::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tier of an assignment derived from the affinity score bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Primary,
    Secondary,
    Backup,
}

impl AssignmentType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Backup => "backup",
        }
    }

    /// Stored priority before modifiers; lower is more urgent.
    pub const fn base_priority(self) -> u8 {
        match self {
            Self::Primary => 2,
            Self::Secondary => 5,
            Self::Backup => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole {
    MajorDonorHost,
    FieldOrganizer,
    PhoneBanker,
    EventHost,
    DigitalAmbassador,
    GeneralSupporter,
}

impl AssignmentRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::MajorDonorHost => "major_donor_host",
            Self::FieldOrganizer => "field_organizer",
            Self::PhoneBanker => "phone_banker",
            Self::EventHost => "event_host",
            Self::DigitalAmbassador => "digital_ambassador",
            Self::GeneralSupporter => "general_supporter",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "major_donor_host" => Some(Self::MajorDonorHost),
            "field_organizer" => Some(Self::FieldOrganizer),
            "phone_banker" => Some(Self::PhoneBanker),
            "event_host" => Some(Self::EventHost),
            "digital_ambassador" => Some(Self::DigitalAmbassador),
            "general_supporter" => Some(Self::GeneralSupporter),
            _ => None,
        }
    }
}

/// Assignment lifecycle. Proposed, Accepted and Active hold a capacity slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Proposed,
    Accepted,
    Active,
    Completed,
    Declined,
    Cancelled,
    Superseded,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
            Self::Superseded => "superseded",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "proposed" => Some(Self::Proposed),
            "accepted" => Some(Self::Accepted),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "declined" => Some(Self::Declined),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }

    pub const fn holds_slot(self) -> bool {
        matches!(self, Self::Proposed | Self::Accepted | Self::Active)
    }

    pub const fn is_terminal(self) -> bool {
        !self.holds_slot()
    }

    /// Transitions available to callers. `Superseded` is reserved for the allocator.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Accepted)
                | (Self::Accepted, Self::Active)
                | (Self::Active, Self::Completed)
                | (
                    Self::Proposed | Self::Accepted | Self::Active,
                    Self::Declined | Self::Cancelled
                )
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    Automatic,
    Manual,
}

/// Counters for activity the supporter logged with the assigned candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPerformance {
    pub activities: u32,
    pub donated_cents: u64,
    pub volunteer_minutes: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl AssignmentPerformance {
    pub(crate) fn record(&mut self, kind: ActivityKind, at: DateTime<Utc>) {
        self.activities += 1;
        match kind {
            ActivityKind::Donation { amount_cents } => self.donated_cents += amount_cents,
            ActivityKind::Volunteer { minutes } => self.volunteer_minutes += minutes,
        }
        self.last_activity_at = self.last_activity_at.max(Some(at));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub supporter_id: SupporterId,
    pub candidate_id: CandidateId,
    pub role: AssignmentRole,
    pub assignment_type: AssignmentType,
    pub base_priority: u8,
    pub status: AssignmentStatus,
    pub source: AssignmentSource,
    /// Affinity total at assignment time.
    pub score: f32,
    pub grade: Grade,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub performance: AssignmentPerformance,
}

impl Assignment {
    pub fn holds_slot(&self) -> bool {
        self.status.holds_slot()
    }

    pub fn is_manual(&self) -> bool {
        self.source == AssignmentSource::Manual
    }

    pub(crate) fn transition(
        &mut self,
        next: AssignmentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(next) {
            return Err(ValidationError::StatusTransition {
                from: self.status.label(),
                to: next.label(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn supersede(&mut self, now: DateTime<Utc>) {
        self.status = AssignmentStatus::Superseded;
        self.updated_at = now;
    }
}

/// Tag-based adjustment to effective priority. Positive deltas demote, negative promote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityModifier {
    pub id: String,
    pub tag: String,
    /// `None` applies to every candidate.
    #[serde(default)]
    pub candidate_id: Option<CandidateId>,
    pub delta: i8,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl PriorityModifier {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}
