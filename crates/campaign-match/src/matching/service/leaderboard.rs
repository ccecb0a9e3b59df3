use tracing::info;

use super::super::error::EngineError;
use super::super::leaderboard::{
    build_leaderboard, Leaderboard, LeaderboardScope, LeaderboardSnapshot,
};
use super::super::repository::{ActivityLedger, ProfileStore};
use super::MatchingService;

impl<S, L> MatchingService<S, L>
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    /// Snapshots the store and ranks supporters for `scope`. Nothing is written.
    pub fn build_leaderboard(&self, scope: &LeaderboardScope) -> Result<Leaderboard, EngineError> {
        let mut snapshot = LeaderboardSnapshot::default();
        self.for_each_supporter(|supporter| {
            snapshot.supporters.push(supporter);
            Ok(())
        })?;

        if let LeaderboardScope::Candidate(candidate_id) = scope {
            self.load_candidate(candidate_id)?;
            snapshot.affinities = self.store.affinities_for_candidate(candidate_id)?;
            snapshot.assignments = self.store.assignments_for_candidate(candidate_id)?;
            snapshot.modifiers = self.store.priority_modifiers(candidate_id)?;
        }

        let leaderboard = build_leaderboard(
            &snapshot,
            scope,
            self.now(),
            &self.allocation_config().modifier_clamps,
        );
        info!(
            ?scope,
            entries = leaderboard.entries.len(),
            counties = leaderboard.counties.len(),
            "leaderboard built"
        );
        Ok(leaderboard)
    }
}
