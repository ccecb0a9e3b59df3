//! Converts the activity ledger into grades and lead scores.

mod ledger;
mod thresholds;

pub use ledger::{CandidateHistory, LedgerSummary};
pub use thresholds::{GradeTier, GradingConfig, DEFAULT_GRADE_TIERS, DEFAULT_VOLUNTEER_HOUR_VALUE_CENTS};

pub(crate) use ledger::{activity_value_cents, summarize};

use serde::{Deserialize, Serialize};

use super::domain::{ActivityRecord, ActivityTotals, Grade, LeadScore, Supporter};

/// Stateless evaluator applying the grade table to a ledger snapshot.
pub struct GradingEngine {
    config: GradingConfig,
}

impl GradingEngine {
    pub fn new(config: GradingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn summarize(&self, entries: &[ActivityRecord]) -> LedgerSummary {
        summarize(entries, self.config.volunteer_hour_value_cents)
    }

    pub fn evaluate(&self, entries: &[ActivityRecord]) -> GradeEvaluation {
        let summary = self.summarize(entries);
        let lead_score = self.config.lead_score_for(summary.totals.sum_cents);
        GradeEvaluation {
            grade: self.config.grade_for(lead_score),
            lead_score,
            totals: summary.totals,
        }
    }
}

/// Grade, score and totals derived from one ledger snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeEvaluation {
    pub grade: Grade,
    pub lead_score: LeadScore,
    pub totals: ActivityTotals,
}

impl GradeEvaluation {
    pub fn matches(&self, supporter: &Supporter) -> bool {
        supporter.grade == self.grade
            && supporter.lead_score == self.lead_score
            && supporter.totals == self.totals
    }

    pub fn apply(&self, supporter: &mut Supporter) {
        supporter.grade = self.grade;
        supporter.lead_score = self.lead_score;
        supporter.totals = self.totals.clone();
        supporter.needs_recalc = false;
    }
}

/// Result of a `recompute_grade` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GradeOutcome {
    Updated {
        grade: Grade,
        lead_score: LeadScore,
        previous_grade: Grade,
        previous_lead_score: LeadScore,
    },
    Unchanged {
        grade: Grade,
        lead_score: LeadScore,
    },
    /// The ledger could not be read; the prior grade is retained and the supporter queued.
    Deferred {
        retained_grade: Grade,
        retained_lead_score: LeadScore,
        reason: String,
    },
}

impl GradeOutcome {
    pub fn grade(&self) -> Grade {
        match self {
            GradeOutcome::Updated { grade, .. } | GradeOutcome::Unchanged { grade, .. } => *grade,
            GradeOutcome::Deferred { retained_grade, .. } => *retained_grade,
        }
    }

    pub fn lead_score(&self) -> LeadScore {
        match self {
            GradeOutcome::Updated { lead_score, .. } | GradeOutcome::Unchanged { lead_score, .. } => {
                *lead_score
            }
            GradeOutcome::Deferred {
                retained_lead_score,
                ..
            } => *retained_lead_score,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, GradeOutcome::Deferred { .. })
    }
}
