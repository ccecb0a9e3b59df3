use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{
    AttributeInput, Dimension, DimensionProfile, DimensionVector, EntityAttributes, EntityRef,
    RawAttribute,
};
use super::error::ValidationError;

/// Derives dimension vectors from raw attribute inputs.
///
/// Missing dimensions sit at the neutral midpoint so sparse profiles are not pulled
/// toward zero. Several inputs for the same dimension are averaged.
pub struct DimensionProfiler;

impl DimensionProfiler {
    pub fn profile(
        entity: &EntityRef,
        attributes: &EntityAttributes,
        now: DateTime<Utc>,
    ) -> Result<DimensionProfile, ValidationError> {
        let ideology = Self::vector(entity, &attributes.ideology)?;
        let local = Self::vector(entity, &attributes.local)?;
        let (primary, secondary) = ideology.top_two();

        Ok(DimensionProfile {
            ideology,
            local,
            primary,
            secondary,
            refreshed_at: Some(now),
        })
    }

    pub fn vector<D: Dimension>(
        entity: &EntityRef,
        inputs: &[AttributeInput<D>],
    ) -> Result<DimensionVector<D>, ValidationError> {
        let mut sums = vec![0.0_f32; D::COUNT];
        let mut counts = vec![0_u32; D::COUNT];

        for input in inputs {
            let value = normalize(entity, input.dimension, input.value)?;
            sums[input.dimension.index()] += value;
            counts[input.dimension.index()] += 1;
        }

        let values = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| {
                if count == 0 {
                    DimensionVector::<D>::NEUTRAL
                } else {
                    sum / count as f32
                }
            })
            .collect();

        DimensionVector::new(values)
    }
}

fn normalize<D: Dimension>(
    entity: &EntityRef,
    dimension: D,
    value: RawAttribute,
) -> Result<f32, ValidationError> {
    match value {
        RawAttribute::Stance(stance) => Ok(stance.score()),
        RawAttribute::Flag(true) => Ok(100.0),
        RawAttribute::Flag(false) => Ok(0.0),
        RawAttribute::Continuous(raw) if !raw.is_finite() => {
            Err(ValidationError::NonFiniteAttribute {
                dimension: dimension.label(),
            })
        }
        RawAttribute::Continuous(raw) if !(0.0..=100.0).contains(&raw) => {
            let clamped = raw.clamp(0.0, 100.0);
            warn!(
                %entity,
                dimension = dimension.label(),
                raw,
                clamped,
                "attribute outside [0, 100]; clamping"
            );
            Ok(clamped)
        }
        RawAttribute::Continuous(raw) => Ok(raw),
    }
}
