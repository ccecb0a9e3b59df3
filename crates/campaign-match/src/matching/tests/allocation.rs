use std::sync::Arc;

use super::common::*;
use crate::matching::allocation::{
    AllocationRequest, Assignment, AssignmentRole, AssignmentSource, AssignmentStatus, AssignmentType,
    JobControl, SkipReason,
};
use crate::matching::config::EngineConfig;
use crate::matching::domain::{CandidateId, EntityRef, SupporterId};
use crate::matching::error::{EngineError, ValidationError};
use crate::matching::memory::InMemoryLedger;
use crate::matching::repository::{ProfileStore, StoreError};
use crate::matching::service::{ManualAssignmentOutcome, MatchingService};

fn cand(id: &str) -> CandidateId {
    CandidateId(id.to_string())
}

fn sup(id: &str) -> SupporterId {
    SupporterId(id.to_string())
}

fn request(max_to_assign: u32) -> AllocationRequest {
    AllocationRequest {
        max_to_assign,
        min_score: 0.0,
    }
}

/// Three Travis supporters pinned at 90, 75 and 60 against one Travis candidate.
fn three_way(cap: Option<u32>) -> Harness {
    let harness = harness();
    harness.seed_supporters([
        supporter("sup-a", "Travis"),
        supporter("sup-b", "Travis"),
        supporter("sup-c", "Travis"),
    ]);
    harness.seed_candidate(candidate("cand-1", "Travis", cap));
    pin_three(&harness);
    harness
}

fn pin_three(harness: &Harness) {
    harness.pin_affinity("sup-a", "cand-1", 90.0);
    harness.pin_affinity("sup-b", "cand-1", 75.0);
    harness.pin_affinity("sup-c", "cand-1", 60.0);
}

#[test]
fn cap_of_two_assigns_the_top_two_and_skips_the_rest() {
    let harness = three_way(Some(2));

    let summary = harness
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("batch runs");

    let assigned: Vec<&str> = summary
        .assigned
        .iter()
        .map(|entry| entry.supporter_id.0.as_str())
        .collect();
    assert_eq!(assigned, vec!["sup-a", "sup-b"]);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].supporter_id, sup("sup-c"));
    assert_eq!(summary.skipped[0].reason, SkipReason::AtCapacity);
    assert_eq!(summary.skipped[0].reason.label(), "AT CAPACITY");
    assert!(summary.failed.is_empty());

    assert_eq!(summary.assigned[0].assignment_type, AssignmentType::Primary);
    assert_eq!(summary.assigned[0].base_priority, 2);
    assert_eq!(summary.assigned[0].role, AssignmentRole::GeneralSupporter);
    assert_eq!(harness.stored_candidate("cand-1").capacity.assigned, 2);
    assert_eq!(harness.live_assignments("cand-1").len(), 2);
}

#[test]
fn slot_count_never_exceeds_the_cap() {
    let harness = harness();
    harness.seed_supporters((0..12).map(|index| supporter(&format!("sup-{index:02}"), "Travis")));
    harness.seed_candidate(candidate("cand-1", "Travis", Some(3)));

    let summary = harness
        .service
        .allocate_batch(&cand("cand-1"), request(50))
        .expect("batch runs");

    assert_eq!(summary.assigned_count(), 3);
    assert_eq!(summary.skipped_for(SkipReason::AtCapacity), 9);
    assert_eq!(harness.live_assignments("cand-1").len(), 3);
    assert_eq!(harness.stored_candidate("cand-1").capacity.assigned, 3);
}

#[test]
fn ties_break_on_supporter_id() {
    let harness = harness();
    harness.seed_supporters([
        supporter("sup-z", "Travis"),
        supporter("sup-m", "Travis"),
        supporter("sup-a", "Travis"),
    ]);
    harness.seed_candidate(candidate("cand-1", "Travis", None));

    let summary = harness
        .service
        .allocate_batch(&cand("cand-1"), request(2))
        .expect("batch runs");

    let assigned: Vec<&str> = summary
        .assigned
        .iter()
        .map(|entry| entry.supporter_id.0.as_str())
        .collect();
    assert_eq!(assigned, vec!["sup-a", "sup-m"]);
    assert!(summary.skipped.is_empty());
}

#[test]
fn identical_inputs_allocate_identically() {
    let left = three_way(Some(2));
    let right = three_way(Some(2));

    let a = left
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("left batch");
    let b = right
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("right batch");

    let order = |summary: &crate::matching::allocation::AllocationSummary| {
        summary
            .assigned
            .iter()
            .map(|entry| (entry.supporter_id.clone(), entry.score))
            .collect::<Vec<_>>()
    };
    assert_eq!(order(&a), order(&b));
    assert_eq!(a.skipped, b.skipped);
}

#[test]
fn rerun_supersedes_automatic_but_preserves_manual() {
    let harness = three_way(Some(2));
    let manual = harness
        .service
        .create_manual_assignment(&sup("sup-c"), &cand("cand-1"), Some(AssignmentRole::EventHost))
        .expect("manual assignment");
    let ManualAssignmentOutcome::Created { assignment: manual } = manual else {
        panic!("expected manual assignment to be created");
    };
    assert_eq!(manual.source, AssignmentSource::Manual);
    assert_eq!(manual.status, AssignmentStatus::Accepted);
    pin_three(&harness);

    let first = harness
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("first batch");

    assert_eq!(first.preserved_manual, 1);
    assert_eq!(first.assigned.len(), 1);
    assert_eq!(first.assigned[0].supporter_id, sup("sup-a"));
    assert_eq!(first.skipped_for(SkipReason::AtCapacity), 1);
    assert_eq!(first.skipped_for(SkipReason::AlreadyAssigned), 1);

    let second = harness
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("second batch");

    assert_eq!(second.cleared_automatic, 1);
    assert_eq!(second.preserved_manual, 1);
    let live = harness.live_assignments("cand-1");
    assert_eq!(live.len(), 2);
    assert!(live
        .iter()
        .any(|assignment| assignment.id == manual.id && assignment.role == AssignmentRole::EventHost));
    let superseded = harness
        .store
        .assignments_for_candidate(&cand("cand-1"))
        .expect("store readable")
        .into_iter()
        .filter(|assignment| assignment.status == AssignmentStatus::Superseded)
        .count();
    assert_eq!(superseded, 1);
    assert_eq!(harness.stored_candidate("cand-1").capacity.assigned, 2);
}

#[test]
fn max_to_assign_stops_the_batch_early() {
    let harness = three_way(None);

    let summary = harness
        .service
        .allocate_batch(&cand("cand-1"), request(1))
        .expect("batch runs");

    assert_eq!(summary.assigned_count(), 1);
    assert!(summary.skipped.is_empty());
}

#[test]
fn min_score_and_eligibility_filter_the_pool() {
    let harness = three_way(None);
    let mut opted_out = supporter("sup-d", "Travis");
    opted_out.contact.opted_out = true;
    harness.seed_supporters([opted_out, supporter("sup-e", "Harris")]);

    let summary = harness
        .service
        .allocate_batch(
            &cand("cand-1"),
            AllocationRequest {
                max_to_assign: 10,
                min_score: 70.0,
            },
        )
        .expect("batch runs");

    assert_eq!(summary.assigned_count(), 2);
    assert_eq!(summary.below_min_score, 1);
    assert_eq!(summary.ineligible, 2);
}

#[test]
fn empty_batch_is_rejected() {
    let harness = three_way(Some(2));

    let error = harness
        .service
        .allocate_batch(&cand("cand-1"), request(0))
        .expect_err("max_to_assign of zero");

    assert!(matches!(
        error,
        EngineError::Validation(ValidationError::EmptyBatch)
    ));
}

#[test]
fn lowering_the_cap_supersedes_the_lowest_scores() {
    let harness = three_way(Some(3));
    harness
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("batch runs");
    let lowest = harness
        .live_assignments("cand-1")
        .into_iter()
        .find(|assignment| assignment.supporter_id == sup("sup-c"))
        .expect("sup-c assigned");

    let change = harness
        .service
        .set_capacity(&cand("cand-1"), Some(2))
        .expect("cap lowered");

    assert_eq!(change.previous_cap, Some(3));
    assert_eq!(change.cap, Some(2));
    assert_eq!(change.assigned, 2);
    assert_eq!(change.superseded, vec![lowest.id]);
    assert_eq!(harness.live_assignments("cand-1").len(), 2);
}

#[test]
fn cap_cannot_drop_below_manual_assignments() {
    let harness = three_way(Some(3));
    for id in ["sup-a", "sup-b"] {
        harness
            .service
            .create_manual_assignment(&sup(id), &cand("cand-1"), None)
            .expect("manual assignment");
    }

    let error = harness
        .service
        .set_capacity(&cand("cand-1"), Some(1))
        .expect_err("manual assignments exceed the cap");

    match error {
        EngineError::Validation(ValidationError::CapBelowManual {
            requested, manual, ..
        }) => {
            assert_eq!(requested, 1);
            assert_eq!(manual, 2);
        }
        other => panic!("expected cap validation error, got {other:?}"),
    }
    assert_eq!(harness.stored_candidate("cand-1").capacity.cap, Some(3));
}

#[test]
fn raising_the_cap_to_unlimited_keeps_assignments() {
    let harness = three_way(Some(1));
    harness
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("batch runs");

    let change = harness
        .service
        .set_capacity(&cand("cand-1"), None)
        .expect("cap removed");

    assert!(change.superseded.is_empty());
    assert_eq!(change.assigned, 1);
    assert_eq!(change.cap, None);
}

#[test]
fn manual_assignment_reports_capacity_and_duplicates() {
    let harness = three_way(Some(1));

    let first = harness
        .service
        .create_manual_assignment(&sup("sup-a"), &cand("cand-1"), None)
        .expect("manual assignment");
    assert!(matches!(first, ManualAssignmentOutcome::Created { .. }));

    let duplicate = harness
        .service
        .create_manual_assignment(&sup("sup-a"), &cand("cand-1"), None)
        .expect("duplicate handled");
    assert_eq!(
        duplicate,
        ManualAssignmentOutcome::Skipped {
            reason: SkipReason::AlreadyAssigned
        }
    );

    let full = harness
        .service
        .create_manual_assignment(&sup("sup-b"), &cand("cand-1"), None)
        .expect("full candidate handled");
    assert_eq!(
        full,
        ManualAssignmentOutcome::Skipped {
            reason: SkipReason::AtCapacity
        }
    );
}

#[test]
fn losing_the_slot_race_twice_is_a_concurrency_conflict() {
    let store = Arc::new(ContendedStore::new());
    store
        .inner
        .seed_supporter(supporter("sup-a", "Travis"))
        .expect("seed supporter");
    store
        .inner
        .seed_candidate(candidate("cand-1", "Travis", Some(5)))
        .expect("seed candidate");
    let service = MatchingService::new(store.clone(), Arc::new(InMemoryLedger::new()), EngineConfig::default())
        .expect("valid config");

    let error = service
        .create_manual_assignment(&sup("sup-a"), &cand("cand-1"), None)
        .expect_err("reservation lost twice");

    match error {
        EngineError::ConcurrencyConflict(EntityRef::Candidate(id)) => assert_eq!(id, cand("cand-1")),
        other => panic!("expected concurrency conflict, got {other:?}"),
    }
    assert!(store
        .assignments_for_candidate(&cand("cand-1"))
        .expect("store readable")
        .is_empty());
}

#[test]
fn status_changes_follow_the_lifecycle_and_free_slots() {
    let harness = three_way(Some(2));
    harness
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("batch runs");

    let accepted = harness
        .service
        .update_assignment_status(&sup("sup-a"), &cand("cand-1"), AssignmentStatus::Accepted)
        .expect("proposed to accepted");
    assert_eq!(accepted.status, AssignmentStatus::Accepted);

    let error = harness
        .service
        .update_assignment_status(&sup("sup-a"), &cand("cand-1"), AssignmentStatus::Completed)
        .expect_err("accepted cannot complete directly");
    assert!(matches!(
        error,
        EngineError::Validation(ValidationError::StatusTransition { .. })
    ));

    harness
        .service
        .update_assignment_status(&sup("sup-b"), &cand("cand-1"), AssignmentStatus::Declined)
        .expect("proposed to declined");
    assert_eq!(harness.stored_candidate("cand-1").capacity.assigned, 1);

    let missing = harness
        .service
        .update_assignment_status(&sup("sup-b"), &cand("cand-1"), AssignmentStatus::Accepted)
        .expect_err("declined assignment no longer live");
    assert_eq!(missing.code(), "store");
}

#[test]
fn single_match_picks_the_best_candidate_with_room() {
    let harness = harness();
    harness.seed_supporters([supporter("sup-a", "Travis")]);
    harness.seed_candidate(candidate("cand-a", "Travis", Some(5)));
    harness.seed_candidate(candidate("cand-b", "Travis", Some(5)));
    harness.seed_candidate(candidate("cand-full", "Travis", Some(0)));
    harness.pin_affinity("sup-a", "cand-a", 70.0);
    harness.pin_affinity("sup-a", "cand-b", 85.0);
    harness.pin_affinity("sup-a", "cand-full", 99.0);

    let best = harness
        .service
        .allocate_for_supporter(&sup("sup-a"))
        .expect("single match runs")
        .expect("a candidate qualifies");
    assert_eq!(best.candidate_id, cand("cand-b"));
    assert_eq!(best.assignment_type, AssignmentType::Primary);

    let next = harness
        .service
        .allocate_for_supporter(&sup("sup-a"))
        .expect("single match runs")
        .expect("second candidate qualifies");
    assert_eq!(next.candidate_id, cand("cand-a"));
    assert_eq!(next.assignment_type, AssignmentType::Secondary);

    let none = harness
        .service
        .allocate_for_supporter(&sup("sup-a"))
        .expect("single match runs");
    assert!(none.is_none());
}

#[test]
fn bulk_allocation_honours_cancellation() {
    let harness = three_way(Some(2));
    harness.seed_candidate(candidate("cand-2", "Travis", Some(1)));

    let control = JobControl::new();
    let report = harness
        .service
        .allocate_all(request(10), &control)
        .expect("bulk run");
    assert!(!report.cancelled);
    assert_eq!(report.summaries.len(), 2);
    assert_eq!(report.assigned_total(), 3);

    control.cancel();
    let cancelled = harness
        .service
        .allocate_all(request(10), &control)
        .expect("cancelled run");
    assert!(cancelled.cancelled);
    assert!(cancelled.summaries.is_empty());
}

#[test]
fn overlapping_runs_on_one_candidate_never_exceed_the_cap() {
    let harness = three_way(Some(2));
    harness
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("first run");

    let store = Arc::new(InterleavingStore::new(harness.store.clone()));
    let racing = harness.service.clone();
    store.interleave_once(move || {
        racing
            .allocate_batch(&cand("cand-1"), request(10))
            .expect("overlapping run");
    });
    let service = MatchingService::new(store, harness.ledger.clone(), EngineConfig::default())
        .expect("valid config")
        .with_clock(harness.clock.clone());

    let summary = service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("outer run");

    assert_eq!(summary.cleared_automatic, 0);
    assert!(summary.assigned.is_empty());
    assert_eq!(summary.skipped_for(SkipReason::AtCapacity), 3);
    assert_eq!(harness.live_assignments("cand-1").len(), 2);
    assert_eq!(harness.stored_candidate("cand-1").capacity.assigned, 2);
}

#[test]
fn swapping_a_row_that_already_moved_on_changes_nothing() {
    let harness = three_way(Some(2));
    harness
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("batch runs");
    let mut row = harness
        .live_assignments("cand-1")
        .into_iter()
        .next()
        .expect("live row");
    row.status = AssignmentStatus::Superseded;

    let first = harness
        .store
        .swap_assignment(row.clone(), AssignmentStatus::Proposed)
        .expect("store writable");
    let second = harness
        .store
        .swap_assignment(row, AssignmentStatus::Proposed)
        .expect("store writable");

    assert!(first);
    assert!(!second);
    assert_eq!(harness.stored_candidate("cand-1").capacity.assigned, 1);
    assert_eq!(harness.live_assignments("cand-1").len(), 1);
}

#[test]
fn assignment_ids_never_reuse_rows_already_stored() {
    let earlier = three_way(Some(2));
    earlier
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("earlier run");
    let persisted: Vec<Assignment> = earlier.live_assignments("cand-1");

    let restarted = three_way(Some(2));
    for mut row in persisted.clone() {
        row.status = AssignmentStatus::Completed;
        restarted
            .store
            .insert_assignment(row)
            .expect("persisted row loads");
    }

    let summary = restarted
        .service
        .allocate_batch(&cand("cand-1"), request(10))
        .expect("batch after restart");

    assert_eq!(summary.assigned.len(), 2);
    assert_eq!(summary.skipped_for(SkipReason::AlreadyAssigned), 0);
    assert!(summary
        .assigned
        .iter()
        .all(|entry| persisted.iter().all(|row| row.id != entry.assignment_id)));

    let taken = persisted[0].clone();
    let error = restarted
        .store
        .insert_assignment(taken.clone())
        .expect_err("id already stored");
    assert_eq!(error, StoreError::DuplicateId(taken.id));
}
