use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::matching::affinity::{AffinityCategory, AffinityScore};
use crate::matching::allocation::{Assignment, AssignmentId, AssignmentStatus, PriorityModifier};
use crate::matching::clock::{Clock, FixedClock};
use crate::matching::config::EngineConfig;
use crate::matching::domain::{
    ActivityId, ActivityKind, ActivityRecord, ActivityStatus, Candidate, CandidateId,
    CapacityPolicy, NewActivity, OfficeLevel, Supporter, SupporterId,
};
use crate::matching::memory::{InMemoryLedger, InMemoryProfileStore};
use crate::matching::repository::{ActivityLedger, ProfileStore, SlotReservation, StoreError};
use crate::matching::service::MatchingService;

pub(super) type MemoryService = MatchingService<InMemoryProfileStore, InMemoryLedger>;

pub(super) struct Harness {
    pub(super) service: Arc<MemoryService>,
    pub(super) store: Arc<InMemoryProfileStore>,
    pub(super) ledger: Arc<InMemoryLedger>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub(super) fn harness_with(config: EngineConfig) -> Harness {
    let store = Arc::new(InMemoryProfileStore::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let clock = Arc::new(FixedClock::new(start()));
    let service = MatchingService::new(store.clone(), ledger.clone(), config)
        .expect("valid engine config")
        .with_clock(clock.clone());
    Harness {
        service: Arc::new(service),
        store,
        ledger,
        clock,
    }
}

pub(super) fn supporter(id: &str, county: &str) -> Supporter {
    Supporter::new(id, format!("Supporter {id}"), county)
}

pub(super) fn candidate(id: &str, home_county: &str, cap: Option<u32>) -> Candidate {
    let mut candidate = Candidate::new(id, format!("Candidate {id}"), OfficeLevel::Legislative, home_county);
    candidate.capacity = CapacityPolicy {
        cap,
        assigned: 0,
        priority_weight: 1,
    };
    candidate
}

impl Harness {
    pub(super) fn seed_supporters(&self, supporters: impl IntoIterator<Item = Supporter>) {
        for supporter in supporters {
            self.store.seed_supporter(supporter).expect("seed supporter");
        }
    }

    pub(super) fn seed_candidate(&self, candidate: Candidate) {
        self.store.seed_candidate(candidate).expect("seed candidate");
    }

    pub(super) fn stored_supporter(&self, id: &str) -> Supporter {
        self.store
            .supporter(&SupporterId(id.to_string()))
            .expect("store readable")
            .expect("supporter present")
    }

    pub(super) fn stored_candidate(&self, id: &str) -> Candidate {
        self.store
            .candidate(&CandidateId(id.to_string()))
            .expect("store readable")
            .expect("candidate present")
    }

    /// Records a fresh affinity row for the pair at the current entity versions.
    pub(super) fn pin_affinity(&self, supporter_id: &str, candidate_id: &str, total_score: f32) {
        let supporter = self.stored_supporter(supporter_id);
        let candidate = self.stored_candidate(candidate_id);
        let config = &self.service.config().affinity;
        let now = self.clock_now();
        self.store
            .record_affinity(AffinityScore {
                supporter_id: supporter.id,
                candidate_id: candidate.id,
                total_score,
                components: Vec::new(),
                category: AffinityCategory::from_score(total_score, &config.bands),
                calculation_version: config.calculation_version(),
                supporter_version: supporter.version,
                candidate_version: candidate.version,
                calculated_at: now,
                expires_at: now + config.ttl(),
            })
            .expect("record affinity");
    }

    pub(super) fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(super) fn live_assignments(&self, candidate_id: &str) -> Vec<Assignment> {
        self.store
            .assignments_for_candidate(&CandidateId(candidate_id.to_string()))
            .expect("store readable")
            .into_iter()
            .filter(Assignment::holds_slot)
            .collect()
    }

    pub(super) fn record(&self, activity: NewActivity) -> ActivityRecord {
        self.ledger.append(activity).expect("ledger append")
    }
}

pub(super) fn donation(id: &str, supporter_id: &str, candidate_id: Option<&str>, cents: u64) -> NewActivity {
    NewActivity {
        activity_id: ActivityId(id.to_string()),
        supporter_id: SupporterId(supporter_id.to_string()),
        candidate_id: candidate_id.map(|id| CandidateId(id.to_string())),
        kind: ActivityKind::Donation {
            amount_cents: cents,
        },
        status: ActivityStatus::Cleared,
        occurred_at: start() - Duration::days(3),
        reverses: None,
    }
}

pub(super) fn refund(id: &str, supporter_id: &str, reverses: &str, cents: u64) -> NewActivity {
    NewActivity {
        status: ActivityStatus::Refunded,
        reverses: Some(ActivityId(reverses.to_string())),
        ..donation(id, supporter_id, None, cents)
    }
}

pub(super) fn volunteer(id: &str, supporter_id: &str, candidate_id: &str, minutes: u32) -> NewActivity {
    NewActivity {
        kind: ActivityKind::Volunteer { minutes },
        ..donation(id, supporter_id, Some(candidate_id), 1)
    }
}

pub(super) fn modifier(id: &str, tag: &str, candidate_id: Option<&str>, delta: i8) -> PriorityModifier {
    PriorityModifier {
        id: id.to_string(),
        tag: tag.to_string(),
        candidate_id: candidate_id.map(|id| CandidateId(id.to_string())),
        delta,
        active: true,
        expires_at: None,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store whose slot counter always moves between read and reserve.
pub(super) struct ContendedStore {
    pub(super) inner: InMemoryProfileStore,
}

impl ContendedStore {
    pub(super) fn new() -> Self {
        Self {
            inner: InMemoryProfileStore::new(),
        }
    }
}

impl ProfileStore for ContendedStore {
    fn supporter(&self, id: &SupporterId) -> Result<Option<Supporter>, StoreError> {
        self.inner.supporter(id)
    }

    fn supporters_page(
        &self,
        after: Option<&SupporterId>,
        limit: usize,
    ) -> Result<Vec<Supporter>, StoreError> {
        self.inner.supporters_page(after, limit)
    }

    fn save_supporter(&self, supporter: Supporter) -> Result<Supporter, StoreError> {
        self.inner.save_supporter(supporter)
    }

    fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError> {
        self.inner.candidate(id)
    }

    fn candidates_page(
        &self,
        after: Option<&CandidateId>,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        self.inner.candidates_page(after, limit)
    }

    fn save_candidate(&self, candidate: Candidate) -> Result<Candidate, StoreError> {
        self.inner.save_candidate(candidate)
    }

    fn reserve_slot(
        &self,
        _id: &CandidateId,
        expected_assigned: u32,
    ) -> Result<SlotReservation, StoreError> {
        Ok(SlotReservation::Contended {
            assigned: expected_assigned + 1,
        })
    }

    fn release_slot(&self, id: &CandidateId) -> Result<(), StoreError> {
        self.inner.release_slot(id)
    }

    fn affinity(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<Option<AffinityScore>, StoreError> {
        self.inner.affinity(supporter_id, candidate_id)
    }

    fn record_affinity(&self, score: AffinityScore) -> Result<(), StoreError> {
        self.inner.record_affinity(score)
    }

    fn affinity_history(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<Vec<AffinityScore>, StoreError> {
        self.inner.affinity_history(supporter_id, candidate_id)
    }

    fn affinities_for_supporter(&self, id: &SupporterId) -> Result<Vec<AffinityScore>, StoreError> {
        self.inner.affinities_for_supporter(id)
    }

    fn affinities_for_candidate(&self, id: &CandidateId) -> Result<Vec<AffinityScore>, StoreError> {
        self.inner.affinities_for_candidate(id)
    }

    fn assignments_for_supporter(&self, id: &SupporterId) -> Result<Vec<Assignment>, StoreError> {
        self.inner.assignments_for_supporter(id)
    }

    fn assignments_for_candidate(&self, id: &CandidateId) -> Result<Vec<Assignment>, StoreError> {
        self.inner.assignments_for_candidate(id)
    }

    fn next_assignment_id(&self) -> Result<AssignmentId, StoreError> {
        self.inner.next_assignment_id()
    }

    fn insert_assignment(&self, assignment: Assignment) -> Result<Assignment, StoreError> {
        self.inner.insert_assignment(assignment)
    }

    fn swap_assignment(
        &self,
        assignment: Assignment,
        expected: AssignmentStatus,
    ) -> Result<bool, StoreError> {
        self.inner.swap_assignment(assignment, expected)
    }

    fn priority_modifiers(&self, id: &CandidateId) -> Result<Vec<PriorityModifier>, StoreError> {
        self.inner.priority_modifiers(id)
    }

    fn enqueue_recalc(&self, id: &SupporterId) -> Result<(), StoreError> {
        self.inner.enqueue_recalc(id)
    }

    fn take_recalc_batch(&self, limit: usize) -> Result<Vec<SupporterId>, StoreError> {
        self.inner.take_recalc_batch(limit)
    }
}

type Interleaved = Box<dyn FnOnce() + Send>;

/// Store that runs a hook once, right after the first candidate assignment listing
/// has been read and before the caller acts on it.
pub(super) struct InterleavingStore {
    pub(super) inner: Arc<InMemoryProfileStore>,
    hook: Mutex<Option<Interleaved>>,
}

impl InterleavingStore {
    pub(super) fn new(inner: Arc<InMemoryProfileStore>) -> Self {
        Self {
            inner,
            hook: Mutex::new(None),
        }
    }

    pub(super) fn interleave_once(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock().expect("hook mutex") = Some(Box::new(hook));
    }
}

impl ProfileStore for InterleavingStore {
    fn supporter(&self, id: &SupporterId) -> Result<Option<Supporter>, StoreError> {
        self.inner.supporter(id)
    }

    fn supporters_page(
        &self,
        after: Option<&SupporterId>,
        limit: usize,
    ) -> Result<Vec<Supporter>, StoreError> {
        self.inner.supporters_page(after, limit)
    }

    fn save_supporter(&self, supporter: Supporter) -> Result<Supporter, StoreError> {
        self.inner.save_supporter(supporter)
    }

    fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError> {
        self.inner.candidate(id)
    }

    fn candidates_page(
        &self,
        after: Option<&CandidateId>,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        self.inner.candidates_page(after, limit)
    }

    fn save_candidate(&self, candidate: Candidate) -> Result<Candidate, StoreError> {
        self.inner.save_candidate(candidate)
    }

    fn reserve_slot(
        &self,
        id: &CandidateId,
        expected_assigned: u32,
    ) -> Result<SlotReservation, StoreError> {
        self.inner.reserve_slot(id, expected_assigned)
    }

    fn release_slot(&self, id: &CandidateId) -> Result<(), StoreError> {
        self.inner.release_slot(id)
    }

    fn affinity(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<Option<AffinityScore>, StoreError> {
        self.inner.affinity(supporter_id, candidate_id)
    }

    fn record_affinity(&self, score: AffinityScore) -> Result<(), StoreError> {
        self.inner.record_affinity(score)
    }

    fn affinity_history(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
    ) -> Result<Vec<AffinityScore>, StoreError> {
        self.inner.affinity_history(supporter_id, candidate_id)
    }

    fn affinities_for_supporter(&self, id: &SupporterId) -> Result<Vec<AffinityScore>, StoreError> {
        self.inner.affinities_for_supporter(id)
    }

    fn affinities_for_candidate(&self, id: &CandidateId) -> Result<Vec<AffinityScore>, StoreError> {
        self.inner.affinities_for_candidate(id)
    }

    fn assignments_for_supporter(&self, id: &SupporterId) -> Result<Vec<Assignment>, StoreError> {
        self.inner.assignments_for_supporter(id)
    }

    fn assignments_for_candidate(&self, id: &CandidateId) -> Result<Vec<Assignment>, StoreError> {
        let listing = self.inner.assignments_for_candidate(id)?;
        let hook = self.hook.lock().expect("hook mutex").take();
        if let Some(hook) = hook {
            hook();
        }
        Ok(listing)
    }

    fn next_assignment_id(&self) -> Result<AssignmentId, StoreError> {
        self.inner.next_assignment_id()
    }

    fn insert_assignment(&self, assignment: Assignment) -> Result<Assignment, StoreError> {
        self.inner.insert_assignment(assignment)
    }

    fn swap_assignment(
        &self,
        assignment: Assignment,
        expected: AssignmentStatus,
    ) -> Result<bool, StoreError> {
        self.inner.swap_assignment(assignment, expected)
    }

    fn priority_modifiers(&self, id: &CandidateId) -> Result<Vec<PriorityModifier>, StoreError> {
        self.inner.priority_modifiers(id)
    }

    fn enqueue_recalc(&self, id: &SupporterId) -> Result<(), StoreError> {
        self.inner.enqueue_recalc(id)
    }

    fn take_recalc_batch(&self, limit: usize) -> Result<Vec<SupporterId>, StoreError> {
        self.inner.take_recalc_batch(limit)
    }
}
