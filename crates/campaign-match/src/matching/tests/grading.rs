use super::common::*;
use crate::matching::domain::{ActivityStatus, Grade, LeadScore, SupporterId};
use crate::matching::error::EngineError;
use crate::matching::grading::GradeOutcome;

fn id(raw: &str) -> SupporterId {
    SupporterId(raw.to_string())
}

#[test]
fn twelve_thousand_dollars_reaches_the_top_grade() {
    let harness = harness();
    harness.seed_supporters([supporter("sup-1", "Travis")]);
    harness.record(donation("act-1", "sup-1", None, 1_200_000));

    let outcome = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("grade computed");

    assert_eq!(
        outcome,
        GradeOutcome::Updated {
            grade: Grade::APlusPlus,
            lead_score: LeadScore::new(1_000).expect("valid score"),
            previous_grade: Grade::UMinus,
            previous_lead_score: LeadScore::default(),
        }
    );
    let stored = harness.stored_supporter("sup-1");
    assert_eq!(stored.totals.sum_cents, 1_200_000);
    assert_eq!(stored.totals.count, 1);
}

#[test]
fn partial_refund_reduces_totals_without_dropping_the_grade() {
    let harness = harness();
    harness.seed_supporters([supporter("sup-1", "Travis")]);
    harness.record(donation("act-1", "sup-1", None, 1_200_000));
    harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("initial grade");

    harness.record(refund("act-2", "sup-1", "act-1", 5_000));
    let outcome = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("grade recomputed");

    assert_eq!(outcome.grade(), Grade::APlusPlus);
    assert_eq!(outcome.lead_score().value(), 1_000);
    assert_eq!(harness.stored_supporter("sup-1").totals.sum_cents, 1_195_000);
}

#[test]
fn refund_larger_than_donation_floors_at_zero() {
    let harness = harness();
    harness.seed_supporters([supporter("sup-1", "Travis")]);
    harness.record(donation("act-1", "sup-1", None, 5_000));
    harness.record(refund("act-2", "sup-1", "act-1", 9_000));

    let outcome = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("grade computed");

    assert_eq!(outcome.grade(), Grade::UMinus);
    assert_eq!(outcome.lead_score().value(), 0);
    assert_eq!(harness.stored_supporter("sup-1").totals.sum_cents, 0);
}

#[test]
fn recompute_is_idempotent_and_skips_redundant_saves() {
    let harness = harness();
    harness.seed_supporters([supporter("sup-1", "Travis")]);
    harness.record(donation("act-1", "sup-1", None, 30_000));

    let first = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("first pass");
    let version_after_first = harness.stored_supporter("sup-1").version;
    let second = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("second pass");

    assert_eq!(first.grade(), Grade::D);
    assert_eq!(first.lead_score().value(), 450);
    assert_eq!(
        second,
        GradeOutcome::Unchanged {
            grade: Grade::D,
            lead_score: first.lead_score(),
        }
    );
    assert_eq!(harness.stored_supporter("sup-1").version, version_after_first);
}

#[test]
fn pending_and_bounced_activity_is_ignored() {
    let harness = harness();
    harness.seed_supporters([supporter("sup-1", "Travis")]);
    let mut pending = donation("act-1", "sup-1", None, 500_000);
    pending.status = ActivityStatus::Pending;
    let mut bounced = donation("act-2", "sup-1", None, 500_000);
    bounced.status = ActivityStatus::Bounced;
    harness.record(pending);
    harness.record(bounced);
    harness.record(donation("act-3", "sup-1", None, 5_000));

    let outcome = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("grade computed");

    assert_eq!(outcome.grade(), Grade::F);
    assert_eq!(harness.stored_supporter("sup-1").totals.count, 1);
}

#[test]
fn later_delivery_of_the_same_activity_wins() {
    let harness = harness();
    harness.seed_supporters([supporter("sup-1", "Travis")]);
    harness.record(donation("act-1", "sup-1", None, 100_000));
    let mut bounced = donation("act-1", "sup-1", None, 100_000);
    bounced.status = ActivityStatus::Bounced;
    harness.record(bounced);

    let outcome = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("grade computed");

    assert_eq!(outcome.grade(), Grade::UMinus);
}

#[test]
fn volunteer_minutes_are_valued_at_the_hourly_rate() {
    let harness = harness();
    harness.seed_supporters([supporter("sup-1", "Travis")]);
    harness.seed_candidate(candidate("cand-1", "Travis", None));
    harness.record(volunteer("act-1", "sup-1", "cand-1", 120));

    let outcome = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("grade computed");

    assert_eq!(outcome.grade(), Grade::F);
    assert_eq!(outcome.lead_score().value(), 150);
    assert_eq!(harness.stored_supporter("sup-1").totals.sum_cents, 5_000);
}

#[test]
fn ledger_outage_keeps_prior_grade_and_queues_recalc() {
    let harness = harness();
    let mut graded = supporter("sup-1", "Travis");
    graded.grade = Grade::B;
    graded.lead_score = LeadScore::new(750).expect("valid score");
    harness.seed_supporters([graded]);
    harness.record(donation("act-1", "sup-1", None, 30_000));

    harness.ledger.set_offline(true);
    let outcome = harness
        .service
        .recompute_grade(&id("sup-1"))
        .expect("outage is not an error");

    assert!(outcome.is_deferred());
    assert_eq!(outcome.grade(), Grade::B);
    let stored = harness.stored_supporter("sup-1");
    assert!(stored.needs_recalc);
    assert_eq!(stored.grade, Grade::B);

    let still_down = harness
        .service
        .process_deferred_recalcs(10)
        .expect("queue drains");
    assert_eq!(still_down.deferred, 1);

    harness.ledger.set_offline(false);
    let report = harness
        .service
        .process_deferred_recalcs(10)
        .expect("queue drains");

    assert_eq!(report.processed, 1);
    assert_eq!(report.updated, 1);
    let stored = harness.stored_supporter("sup-1");
    assert!(!stored.needs_recalc);
    assert_eq!(stored.grade, Grade::D);
}

#[test]
fn unknown_supporter_is_not_found() {
    let harness = harness();

    let error = harness
        .service
        .recompute_grade(&id("ghost"))
        .expect_err("missing supporter");

    assert!(matches!(error, EngineError::NotFound(_)));
    assert_eq!(error.code(), "not_found");
}

#[test]
fn recompute_all_grades_covers_every_supporter() {
    let harness = harness();
    harness.seed_supporters([
        supporter("sup-1", "Travis"),
        supporter("sup-2", "Hays"),
        supporter("sup-3", "Travis"),
    ]);
    harness.record(donation("act-1", "sup-1", None, 250_000));
    harness.record(donation("act-2", "sup-3", None, 10_000));

    let report = harness
        .service
        .recompute_all_grades()
        .expect("bulk regrade");

    assert_eq!(report.processed, 3);
    assert_eq!(report.updated, 2);
    assert_eq!(report.unchanged, 1);
    assert!(report.failed.is_empty());
    assert_eq!(harness.stored_supporter("sup-1").grade, Grade::BPlus);
}
