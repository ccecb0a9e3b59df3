//! In-process store and ledger used by the api service, the CLI and tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::affinity::AffinityScore;
use super::allocation::{Assignment, AssignmentId, AssignmentStatus, PriorityModifier};
use super::domain::{ActivityRecord, Candidate, CandidateId, NewActivity, Supporter, SupporterId};
use super::repository::{ActivityLedger, LedgerError, ProfileStore, SlotReservation, StoreError};

type PairKey = (SupporterId, CandidateId);

#[derive(Default)]
struct StoreState {
    supporters: BTreeMap<SupporterId, Supporter>,
    candidates: BTreeMap<CandidateId, Candidate>,
    affinities: BTreeMap<PairKey, AffinityScore>,
    archived_affinities: BTreeMap<PairKey, Vec<AffinityScore>>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    assignment_sequence: u64,
    modifiers: Vec<PriorityModifier>,
    recalc_queue: VecDeque<SupporterId>,
    queued: BTreeSet<SupporterId>,
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    state: Mutex<StoreState>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("profile store lock poisoned".to_string()))
    }

    /// Inserts or replaces a supporter without a version check.
    pub fn seed_supporter(&self, supporter: Supporter) -> Result<(), StoreError> {
        let mut state = self.state()?;
        state.supporters.insert(supporter.id.clone(), supporter);
        Ok(())
    }

    /// Inserts or replaces a candidate without a version check.
    pub fn seed_candidate(&self, candidate: Candidate) -> Result<(), StoreError> {
        let mut state = self.state()?;
        state.candidates.insert(candidate.id.clone(), candidate);
        Ok(())
    }

    pub fn add_modifier(&self, modifier: PriorityModifier) -> Result<(), StoreError> {
        let mut state = self.state()?;
        state.modifiers.retain(|existing| existing.id != modifier.id);
        state.modifiers.push(modifier);
        Ok(())
    }

    pub fn supporter_count(&self) -> Result<usize, StoreError> {
        Ok(self.state()?.supporters.len())
    }

    pub fn candidate_count(&self) -> Result<usize, StoreError> {
        Ok(self.state()?.candidates.len())
    }
}

fn check_version(expected: u64, found: u64) -> Result<(), StoreError> {
    if expected == found {
        Ok(())
    } else {
        Err(StoreError::VersionMismatch { expected, found })
    }
}

fn page<K: Ord + Clone, V: Clone>(
    map: &BTreeMap<K, V>,
    after: Option<&K>,
    limit: usize,
) -> Vec<V> {
    let lower = match after {
        Some(key) => Bound::Excluded(key.clone()),
        None => Bound::Unbounded,
    };
    map.range((lower, Bound::Unbounded))
        .take(limit)
        .map(|(_, value)| value.clone())
        .collect()
}

impl ProfileStore for InMemoryProfileStore {
    fn supporter(&self, id: &SupporterId) -> Result<Option<Supporter>, StoreError> {
        Ok(self.state()?.supporters.get(id).cloned())
    }

    fn supporters_page(
        &self,
        after: Option<&SupporterId>,
        limit: usize,
    ) -> Result<Vec<Supporter>, StoreError> {
        Ok(page(&self.state()?.supporters, after, limit))
    }

    fn save_supporter(&self, mut supporter: Supporter) -> Result<Supporter, StoreError> {
        let mut state = self.state()?;
        if let Some(stored) = state.supporters.get(&supporter.id) {
            check_version(supporter.version, stored.version)?;
        }
        supporter.version += 1;
        state
            .supporters
            .insert(supporter.id.clone(), supporter.clone());
        Ok(supporter)
    }

    fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError> {
        Ok(self.state()?.candidates.get(id).cloned())
    }

    fn candidates_page(
        &self,
        after: Option<&CandidateId>,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        Ok(page(&self.state()?.candidates, after, limit))
    }

    fn save_candidate(&self, mut candidate: Candidate) -> Result<Candidate, StoreError> {
        let mut state = self.state()?;
        if let Some(stored) = state.candidates.get(&candidate.id) {
            check_version(candidate.version, stored.version)?;
        }
        candidate.version += 1;
        state
            .candidates
            .insert(candidate.id.clone(), candidate.clone());
        Ok(candidate)
    }

    fn reserve_slot(
        &self,
        id: &CandidateId,
        expected_assigned: u32,
    ) -> Result<SlotReservation, StoreError> {
        let mut state = self.state()?;
        let candidate = state.candidates.get_mut(id).ok_or(StoreError::NotFound)?;
        let policy = &mut candidate.capacity;

        if let Some(cap) = policy.cap {
            if policy.assigned >= cap {
                return Ok(SlotReservation::AtCapacity {
                    cap,
                    assigned: policy.assigned,
                });
            }
        }
        if policy.assigned != expected_assigned {
            return Ok(SlotReservation::Contended {
                assigned: policy.assigned,
            });
        }

        policy.assigned += 1;
        let assigned = policy.assigned;
        candidate.version += 1;
        Ok(SlotReservation::Reserved { assigned })
    }

    fn release_slot(&self, id: &CandidateId) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let candidate = state.candidates.get_mut(id).ok_or(StoreError::NotFound)?;
        candidate.capacity.assigned = candidate.capacity.assigned.saturating_sub(1);
        candidate.version += 1;
        Ok(())
    }

    fn affinity(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<Option<AffinityScore>, StoreError> {
        let state = self.state()?;
        Ok(state
            .affinities
            .get(&(supporter_id.clone(), candidate_id.clone()))
            .cloned())
    }

    fn record_affinity(&self, score: AffinityScore) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let key = (score.supporter_id.clone(), score.candidate_id.clone());
        if let Some(previous) = state.affinities.insert(key.clone(), score) {
            state.archived_affinities.entry(key).or_default().push(previous);
        }
        Ok(())
    }

    fn affinity_history(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<Vec<AffinityScore>, StoreError> {
        let state = self.state()?;
        Ok(state
            .archived_affinities
            .get(&(supporter_id.clone(), candidate_id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn affinities_for_supporter(
        &self,
        id: &SupporterId,
    ) -> Result<Vec<AffinityScore>, StoreError> {
        let state = self.state()?;
        Ok(state
            .affinities
            .values()
            .filter(|score| &score.supporter_id == id)
            .cloned()
            .collect())
    }

    fn affinities_for_candidate(
        &self,
        id: &CandidateId,
    ) -> Result<Vec<AffinityScore>, StoreError> {
        let state = self.state()?;
        Ok(state
            .affinities
            .values()
            .filter(|score| &score.candidate_id == id)
            .cloned()
            .collect())
    }

    fn assignments_for_supporter(&self, id: &SupporterId) -> Result<Vec<Assignment>, StoreError> {
        let state = self.state()?;
        Ok(state
            .assignments
            .values()
            .filter(|assignment| &assignment.supporter_id == id)
            .cloned()
            .collect())
    }

    fn assignments_for_candidate(&self, id: &CandidateId) -> Result<Vec<Assignment>, StoreError> {
        let state = self.state()?;
        Ok(state
            .assignments
            .values()
            .filter(|assignment| &assignment.candidate_id == id)
            .cloned()
            .collect())
    }

    fn next_assignment_id(&self) -> Result<AssignmentId, StoreError> {
        let mut state = self.state()?;
        loop {
            state.assignment_sequence += 1;
            let id = AssignmentId(format!("asg-{:06}", state.assignment_sequence));
            if !state.assignments.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    fn insert_assignment(&self, assignment: Assignment) -> Result<Assignment, StoreError> {
        let mut state = self.state()?;
        if state.assignments.contains_key(&assignment.id) {
            return Err(StoreError::DuplicateId(assignment.id));
        }
        let live_pair = state.assignments.values().any(|existing| {
            existing.holds_slot()
                && existing.supporter_id == assignment.supporter_id
                && existing.candidate_id == assignment.candidate_id
        });
        if live_pair {
            return Err(StoreError::Conflict);
        }
        state
            .assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok(assignment)
    }

    fn swap_assignment(
        &self,
        assignment: Assignment,
        expected: AssignmentStatus,
    ) -> Result<bool, StoreError> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let stored = state
            .assignments
            .get_mut(&assignment.id)
            .ok_or(StoreError::NotFound)?;
        if stored.status != expected {
            return Ok(false);
        }

        let releases = stored.holds_slot() && !assignment.holds_slot();
        let candidate_id = assignment.candidate_id.clone();
        *stored = assignment;
        if releases {
            if let Some(candidate) = state.candidates.get_mut(&candidate_id) {
                candidate.capacity.assigned = candidate.capacity.assigned.saturating_sub(1);
                candidate.version += 1;
            }
        }
        Ok(true)
    }

    fn priority_modifiers(&self, id: &CandidateId) -> Result<Vec<PriorityModifier>, StoreError> {
        let state = self.state()?;
        Ok(state
            .modifiers
            .iter()
            .filter(|modifier| {
                modifier
                    .candidate_id
                    .as_ref()
                    .map_or(true, |scoped| scoped == id)
            })
            .cloned()
            .collect())
    }

    fn enqueue_recalc(&self, id: &SupporterId) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.queued.insert(id.clone()) {
            state.recalc_queue.push_back(id.clone());
        }
        Ok(())
    }

    fn take_recalc_batch(&self, limit: usize) -> Result<Vec<SupporterId>, StoreError> {
        let mut state = self.state()?;
        let count = limit.min(state.recalc_queue.len());
        let batch: Vec<SupporterId> = state.recalc_queue.drain(..count).collect();
        for id in &batch {
            state.queued.remove(id);
        }
        Ok(batch)
    }
}

/// Append-only ledger with a switch to simulate an outage.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<Vec<ActivityRecord>>,
    sequence: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(LedgerError::Unavailable("ledger offline".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActivityLedger for InMemoryLedger {
    fn append(&self, activity: NewActivity) -> Result<ActivityRecord, LedgerError> {
        self.ensure_online()?;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let record = ActivityRecord::from_new(activity, sequence);
        self.entries
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".to_string()))?
            .push(record.clone());
        Ok(record)
    }

    fn entries_for(&self, supporter_id: &SupporterId) -> Result<Vec<ActivityRecord>, LedgerError> {
        self.ensure_online()?;
        let entries = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".to_string()))?;
        Ok(entries
            .iter()
            .filter(|entry| &entry.supporter_id == supporter_id)
            .cloned()
            .collect())
    }
}
