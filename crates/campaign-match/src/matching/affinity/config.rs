use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::super::error::ValidationError;

/// Component weights; they must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityWeights {
    pub ideology: u8,
    pub geography: u8,
    pub history: u8,
    pub capacity_fit: u8,
}

impl Default for AffinityWeights {
    fn default() -> Self {
        Self {
            ideology: 40,
            geography: 30,
            history: 20,
            capacity_fit: 10,
        }
    }
}

impl AffinityWeights {
    pub fn sum(&self) -> u32 {
        u32::from(self.ideology)
            + u32::from(self.geography)
            + u32::from(self.history)
            + u32::from(self.capacity_fit)
    }
}

/// Lower bounds (inclusive) for each affinity category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryBands {
    pub exceptional: f32,
    pub strong: f32,
    pub good: f32,
    pub moderate: f32,
}

impl Default for CategoryBands {
    fn default() -> Self {
        Self {
            exceptional: 80.0,
            strong: 60.0,
            good: 40.0,
            moderate: 20.0,
        }
    }
}

/// Step values for the three geographic tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeographyTiers {
    pub exact_county: f32,
    pub coverage_area: f32,
    pub no_match: f32,
}

impl Default for GeographyTiers {
    fn default() -> Self {
        Self {
            exact_county: 100.0,
            coverage_area: 60.0,
            no_match: 0.0,
        }
    }
}

/// History component shape: warm pairs climb from `prior_base`, cold pairs are
/// credited up to `cold_start_max` by lead score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryScoring {
    pub prior_base: f32,
    pub prior_step: f32,
    pub cold_start_max: f32,
}

impl Default for HistoryScoring {
    fn default() -> Self {
        Self {
            prior_base: 60.0,
            prior_step: 10.0,
            cold_start_max: 30.0,
        }
    }
}

/// Utilization at or below which a candidate gets the full capacity-fit score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityFitScoring {
    pub full_fit_utilization: f32,
}

impl Default for CapacityFitScoring {
    fn default() -> Self {
        Self {
            full_fit_utilization: 0.8,
        }
    }
}

pub const DEFAULT_AFFINITY_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityConfig {
    pub weights: AffinityWeights,
    pub bands: CategoryBands,
    pub geography: GeographyTiers,
    pub history: HistoryScoring,
    pub capacity_fit: CapacityFitScoring,
    pub ttl_hours: i64,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            weights: AffinityWeights::default(),
            bands: CategoryBands::default(),
            geography: GeographyTiers::default(),
            history: HistoryScoring::default(),
            capacity_fit: CapacityFitScoring::default(),
            ttl_hours: DEFAULT_AFFINITY_TTL_HOURS,
        }
    }
}

impl AffinityConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let sum = self.weights.sum();
        if sum != 100 {
            return Err(ValidationError::WeightsSum(sum));
        }

        let bands = [
            self.bands.exceptional,
            self.bands.strong,
            self.bands.good,
            self.bands.moderate,
        ];
        if bands.iter().any(|band| !band.is_finite())
            || self.bands.exceptional > 100.0
            || self.bands.moderate < 0.0
            || bands.windows(2).any(|pair| pair[1] >= pair[0])
        {
            return Err(ValidationError::CategoryBands);
        }

        let geography = self.geography;
        if !(geography.exact_county <= 100.0
            && geography.exact_county > geography.coverage_area
            && geography.coverage_area > geography.no_match
            && geography.no_match >= 0.0)
        {
            return Err(ValidationError::GeographyTiers);
        }

        for value in [
            self.history.prior_base,
            self.history.prior_step,
            self.history.cold_start_max,
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ValidationError::ScoreOutOfRange(value));
            }
        }

        let threshold = self.capacity_fit.full_fit_utilization;
        if !(threshold.is_finite() && threshold >= 0.0 && threshold < 1.0) {
            return Err(ValidationError::AllocationSettings(format!(
                "full_fit_utilization {threshold} must be in [0, 1)"
            )));
        }

        if self.ttl_hours <= 0 {
            return Err(ValidationError::AllocationSettings(
                "affinity ttl must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Version tag for cached rows. Every parameter that feeds the score is part of
    /// the tag; `ttl_hours` only affects expiry and is left out.
    pub fn calculation_version(&self) -> String {
        let Self {
            weights,
            bands,
            geography,
            history,
            capacity_fit,
            ttl_hours: _,
        } = self;
        format!(
            "affinity-v1/w{}-{}-{}-{}/b{}-{}-{}-{}/g{}-{}-{}/h{}-{}-{}/c{}",
            weights.ideology,
            weights.geography,
            weights.history,
            weights.capacity_fit,
            bands.exceptional,
            bands.strong,
            bands.good,
            bands.moderate,
            geography.exact_county,
            geography.coverage_area,
            geography.no_match,
            history.prior_base,
            history.prior_step,
            history.cold_start_max,
            capacity_fit.full_fit_utilization,
        )
    }

    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours)
    }
}
