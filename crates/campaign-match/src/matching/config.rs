use serde::{Deserialize, Serialize};

use super::affinity::AffinityConfig;
use super::allocation::AllocationConfig;
use super::error::ValidationError;
use super::grading::GradingConfig;

/// Tunables for every engine stage. Loaded once and validated before use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub grading: GradingConfig,
    pub affinity: AffinityConfig,
    pub allocation: AllocationConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.grading.validate()?;
        self.affinity.validate()?;
        self.allocation.validate()
    }
}
