use tracing::{debug, info};

use super::super::domain::{DimensionProfile, EntityAttributes, EntityRef, SupporterId};
use super::super::error::EngineError;
use super::super::profiler::DimensionProfiler;
use super::super::repository::{ActivityLedger, ProfileStore, StoreError};
use super::MatchingService;

impl<S, L> MatchingService<S, L>
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    /// Rederives the dimension profile for a supporter or candidate.
    ///
    /// Saving bumps the entity version, which invalidates every cached affinity row
    /// touching it. Unchanged vectors are not written.
    pub fn refresh_dimensions(&self, entity: &EntityRef) -> Result<DimensionProfile, EngineError> {
        for attempt in 0..2 {
            let now = self.now();
            let saved = match entity {
                EntityRef::Supporter(id) => {
                    let mut supporter = self.load_supporter(id)?;
                    let profile = DimensionProfiler::profile(entity, &supporter.attributes, now)?;
                    if supporter.profile.same_vectors(&profile) {
                        debug!(%entity, "dimension profile unchanged");
                        return Ok(supporter.profile);
                    }
                    supporter.profile = profile;
                    self.store
                        .save_supporter(supporter)
                        .map(|saved| saved.profile)
                }
                EntityRef::Candidate(id) => {
                    let mut candidate = self.load_candidate(id)?;
                    let profile = DimensionProfiler::profile(entity, &candidate.attributes, now)?;
                    if candidate.profile.same_vectors(&profile) {
                        debug!(%entity, "dimension profile unchanged");
                        return Ok(candidate.profile);
                    }
                    candidate.profile = profile;
                    self.store
                        .save_candidate(candidate)
                        .map(|saved| saved.profile)
                }
            };

            match saved {
                Ok(profile) => {
                    info!(
                        %entity,
                        primary = ?profile.primary,
                        secondary = ?profile.secondary,
                        "dimension profile refreshed"
                    );
                    return Ok(profile);
                }
                Err(StoreError::VersionMismatch { .. }) => {
                    debug!(%entity, attempt, "entity changed during profiling; retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(EngineError::ConcurrencyConflict(entity.clone()))
    }

    /// Replaces a supporter's raw attributes and rederives the profile in one save.
    pub fn update_supporter_attributes(
        &self,
        supporter_id: &SupporterId,
        attributes: EntityAttributes,
    ) -> Result<DimensionProfile, EngineError> {
        let entity = EntityRef::Supporter(supporter_id.clone());
        for attempt in 0..2 {
            let mut supporter = self.load_supporter(supporter_id)?;
            supporter.profile = DimensionProfiler::profile(&entity, &attributes, self.now())?;
            supporter.attributes = attributes.clone();

            match self.store.save_supporter(supporter) {
                Ok(saved) => {
                    info!(%supporter_id, primary = ?saved.profile.primary, "supporter attributes replaced");
                    return Ok(saved.profile);
                }
                Err(StoreError::VersionMismatch { .. }) => {
                    debug!(%supporter_id, attempt, "supporter changed during attribute update; retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(EngineError::ConcurrencyConflict(entity))
    }
}
