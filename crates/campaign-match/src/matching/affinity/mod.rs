mod config;
mod rules;

pub use config::{
    AffinityConfig, AffinityWeights, CapacityFitScoring, CategoryBands, GeographyTiers,
    HistoryScoring, DEFAULT_AFFINITY_TTL_HOURS,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Candidate, CandidateId, Supporter, SupporterId};
use super::error::EngineError;
use super::grading::CandidateHistory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityFactor {
    Ideology,
    Geography,
    History,
    CapacityFit,
}

impl AffinityFactor {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ideology => "ideology",
            Self::Geography => "geography",
            Self::History => "history",
            Self::CapacityFit => "capacity_fit",
        }
    }
}

/// Discrete contribution to an affinity score, kept for audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityComponent {
    pub factor: AffinityFactor,
    pub score: f32,
    pub weight: u8,
    pub notes: String,
}

impl AffinityComponent {
    pub fn weighted(&self) -> f32 {
        self.score * f32::from(self.weight) / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityCategory {
    Weak,
    Moderate,
    Good,
    Strong,
    Exceptional,
}

impl AffinityCategory {
    pub fn from_score(score: f32, bands: &CategoryBands) -> Self {
        if score >= bands.exceptional {
            Self::Exceptional
        } else if score >= bands.strong {
            Self::Strong
        } else if score >= bands.good {
            Self::Good
        } else if score >= bands.moderate {
            Self::Moderate
        } else {
            Self::Weak
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Moderate => "moderate",
            Self::Good => "good",
            Self::Strong => "strong",
            Self::Exceptional => "exceptional",
        }
    }
}

/// Cached compatibility between one supporter and one candidate.
///
/// The row records the entity versions it was computed from, so any later save of
/// either record (profile refresh, grade change, slot movement) makes it stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityScore {
    pub supporter_id: SupporterId,
    pub candidate_id: CandidateId,
    pub total_score: f32,
    pub components: Vec<AffinityComponent>,
    pub category: AffinityCategory,
    pub calculation_version: String,
    pub supporter_version: u64,
    pub candidate_version: u64,
    pub calculated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AffinityScore {
    pub fn is_fresh(
        &self,
        now: DateTime<Utc>,
        calculation_version: &str,
        supporter: &Supporter,
        candidate: &Candidate,
    ) -> bool {
        now < self.expires_at
            && self.calculation_version == calculation_version
            && self.supporter_version == supporter.version
            && self.candidate_version == candidate.version
    }

    pub fn ensure_fresh(
        &self,
        now: DateTime<Utc>,
        calculation_version: &str,
        supporter: &Supporter,
        candidate: &Candidate,
    ) -> Result<(), EngineError> {
        if self.is_fresh(now, calculation_version, supporter, candidate) {
            Ok(())
        } else {
            Err(EngineError::StaleData {
                supporter_id: self.supporter_id.clone(),
                candidate_id: self.candidate_id.clone(),
                expires_at: self.expires_at,
            })
        }
    }

    pub fn component(&self, factor: AffinityFactor) -> Option<&AffinityComponent> {
        self.components
            .iter()
            .find(|component| component.factor == factor)
    }
}

/// Stateless calculator applying the affinity weights to one pair.
pub struct AffinityCalculator {
    config: AffinityConfig,
}

impl AffinityCalculator {
    pub fn new(config: AffinityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AffinityConfig {
        &self.config
    }

    pub fn calculation_version(&self) -> String {
        self.config.calculation_version()
    }

    pub fn calculate(
        &self,
        supporter: &Supporter,
        candidate: &Candidate,
        history: Option<&CandidateHistory>,
        now: DateTime<Utc>,
    ) -> AffinityScore {
        let components = rules::score_components(supporter, candidate, history, &self.config);
        let weighted: f32 = components.iter().map(AffinityComponent::weighted).sum();
        let total_score = round_score(weighted);

        AffinityScore {
            supporter_id: supporter.id.clone(),
            candidate_id: candidate.id.clone(),
            total_score,
            category: AffinityCategory::from_score(total_score, &self.config.bands),
            components,
            calculation_version: self.config.calculation_version(),
            supporter_version: supporter.version,
            candidate_version: candidate.version,
            calculated_at: now,
            expires_at: now + self.config.ttl(),
        }
    }
}

fn round_score(value: f32) -> f32 {
    ((value * 100.0).round() / 100.0).clamp(0.0, 100.0)
}
