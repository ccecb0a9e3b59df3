use serde::{Deserialize, Serialize};

use super::super::domain::{Grade, LeadScore};
use super::super::error::ValidationError;

/// One row of the grade table. Both columns are inclusive lower bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeTier {
    pub grade: Grade,
    pub min_total_dollars: u64,
    pub min_lead_score: u16,
}

const fn tier(grade: Grade, min_total_dollars: u64, min_lead_score: u16) -> GradeTier {
    GradeTier {
        grade,
        min_total_dollars,
        min_lead_score,
    }
}

/// Default dollar thresholds, lowest tier first.
pub const DEFAULT_GRADE_TIERS: [GradeTier; Grade::COUNT] = [
    tier(Grade::UMinus, 0, 0),
    tier(Grade::U, 1, 50),
    tier(Grade::UPlus, 25, 100),
    tier(Grade::F, 50, 150),
    tier(Grade::FPlus, 100, 200),
    tier(Grade::EMinus, 125, 250),
    tier(Grade::E, 150, 300),
    tier(Grade::EPlus, 200, 350),
    tier(Grade::DMinus, 250, 400),
    tier(Grade::D, 300, 450),
    tier(Grade::DPlus, 400, 500),
    tier(Grade::CMinus, 500, 550),
    tier(Grade::C, 750, 600),
    tier(Grade::CPlus, 1_000, 650),
    tier(Grade::BMinus, 1_500, 700),
    tier(Grade::B, 2_000, 750),
    tier(Grade::BPlus, 2_500, 800),
    tier(Grade::AMinus, 3_500, 850),
    tier(Grade::A, 5_000, 900),
    tier(Grade::APlus, 7_500, 950),
    tier(Grade::APlusPlus, 10_000, 1_000),
];

pub const DEFAULT_VOLUNTEER_HOUR_VALUE_CENTS: u64 = 2_500;

/// Grade table plus the dollar value credited per volunteer hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingConfig {
    pub tiers: Vec<GradeTier>,
    pub volunteer_hour_value_cents: u64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_GRADE_TIERS.to_vec(),
            volunteer_hour_value_cents: DEFAULT_VOLUNTEER_HOUR_VALUE_CENTS,
        }
    }
}

impl GradingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tiers.len() != Grade::COUNT {
            return Err(ValidationError::GradeTable(format!(
                "expected {} tiers, found {}",
                Grade::COUNT,
                self.tiers.len()
            )));
        }

        for (row, expected) in self.tiers.iter().zip(Grade::ordered()) {
            if row.grade != expected {
                return Err(ValidationError::GradeTable(format!(
                    "tier for {} out of order (expected {})",
                    row.grade, expected
                )));
            }
        }

        let first = self.tiers[0];
        if first.min_total_dollars != 0 || first.min_lead_score != 0 {
            return Err(ValidationError::GradeTable(
                "lowest tier must start at zero".to_string(),
            ));
        }

        for pair in self.tiers.windows(2) {
            if pair[1].min_total_dollars <= pair[0].min_total_dollars
                || pair[1].min_lead_score <= pair[0].min_lead_score
            {
                return Err(ValidationError::GradeTable(format!(
                    "thresholds must strictly increase at {}",
                    pair[1].grade
                )));
            }
        }

        if self.tiers[Grade::COUNT - 1].min_lead_score != LeadScore::MAX {
            return Err(ValidationError::GradeTable(
                "top tier must start at lead score 1000".to_string(),
            ));
        }

        Ok(())
    }

    /// Interpolates between the surrounding tiers, saturating at the top tier.
    pub fn lead_score_for(&self, total_cents: u64) -> LeadScore {
        let position = self
            .tiers
            .iter()
            .rposition(|tier| total_cents >= tier.min_total_dollars.saturating_mul(100));

        let Some(index) = position else {
            return LeadScore::default();
        };

        let lower = self.tiers[index];
        let Some(upper) = self.tiers.get(index + 1) else {
            return LeadScore::saturating(u64::from(lower.min_lead_score));
        };

        let floor_cents = lower.min_total_dollars * 100;
        let span_cents = (upper.min_total_dollars - lower.min_total_dollars) * 100;
        let score_span = u64::from(upper.min_lead_score - lower.min_lead_score);
        let progress = total_cents - floor_cents;

        LeadScore::saturating(u64::from(lower.min_lead_score) + score_span * progress / span_cents)
    }

    pub fn grade_for(&self, score: LeadScore) -> Grade {
        self.tiers
            .iter()
            .rev()
            .find(|tier| score.value() >= tier.min_lead_score)
            .map(|tier| tier.grade)
            .unwrap_or(Grade::UMinus)
    }
}
