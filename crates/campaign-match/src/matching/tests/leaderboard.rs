use chrono::Duration;

use super::common::*;
use crate::matching::allocation::{AllocationRequest, AssignmentStatus};
use crate::matching::domain::{CandidateId, EntityRef, Grade};
use crate::matching::error::EngineError;
use crate::matching::leaderboard::{Leaderboard, LeaderboardScope};

/// Two $2,500 donors tie at the top; Travis also holds a $300 and a $50 donor.
fn graded_harness() -> Harness {
    let harness = harness();
    let mut vip = supporter("sup-a", "Travis");
    vip.tags.insert("vip".to_string());
    harness.seed_supporters([
        vip,
        supporter("sup-b", "Harris"),
        supporter("sup-c", "Travis"),
        supporter("sup-d", " travis "),
    ]);
    harness.record(donation("act-1", "sup-a", None, 250_000));
    harness.record(donation("act-2", "sup-b", None, 250_000));
    harness.record(donation("act-3", "sup-c", None, 30_000));
    harness.record(donation("act-4", "sup-d", None, 5_000));
    harness
        .service
        .recompute_all_grades()
        .expect("grades computed");
    harness
}

fn ids(board: &Leaderboard) -> Vec<&str> {
    board
        .entries
        .iter()
        .map(|entry| entry.supporter_id.0.as_str())
        .collect()
}

#[test]
fn state_ranks_share_ties_and_skip_ahead() {
    let harness = graded_harness();

    let board = harness
        .service
        .build_leaderboard(&LeaderboardScope::State)
        .expect("leaderboard");

    assert_eq!(ids(&board), vec!["sup-a", "sup-b", "sup-c", "sup-d"]);
    let state: Vec<u32> = board.entries.iter().map(|entry| entry.state_rank).collect();
    assert_eq!(state, vec![1, 1, 3, 4]);
    let county: Vec<u32> = board.entries.iter().map(|entry| entry.county_rank).collect();
    assert_eq!(county, vec![1, 1, 2, 3]);
    assert_eq!(board.entries[0].grade, Grade::BPlus);
    assert_eq!(board.entries[2].lead_score.value(), 450);
    assert!(board.entries.iter().all(|entry| entry.candidate_rank.is_none()));
}

#[test]
fn county_rollups_order_by_total_raised() {
    let harness = graded_harness();

    let board = harness
        .service
        .build_leaderboard(&LeaderboardScope::State)
        .expect("leaderboard");

    assert_eq!(board.counties.len(), 2);
    let travis = &board.counties[0];
    assert_eq!(travis.county, "Travis");
    assert_eq!(travis.supporters, 3);
    assert_eq!(travis.total_cents, 285_000);
    assert!((travis.average_lead_score - 466.67).abs() < 0.01);
    assert_eq!(board.counties[1].county, "Harris");
    assert_eq!(board.counties[1].total_cents, 250_000);
}

#[test]
fn county_scope_matches_case_and_whitespace_insensitively() {
    let harness = graded_harness();

    let board = harness
        .service
        .build_leaderboard(&LeaderboardScope::County(" TRAVIS".to_string()))
        .expect("leaderboard");

    assert_eq!(ids(&board), vec!["sup-a", "sup-c", "sup-d"]);
    let state: Vec<u32> = board.entries.iter().map(|entry| entry.state_rank).collect();
    assert_eq!(state, vec![1, 3, 4]);
    assert_eq!(board.counties.len(), 1);
}

#[test]
fn unknown_county_yields_an_empty_board() {
    let harness = graded_harness();

    let board = harness
        .service
        .build_leaderboard(&LeaderboardScope::County("Loving".to_string()))
        .expect("leaderboard");

    assert!(board.entries.is_empty());
    assert!(board.counties.is_empty());
}

#[test]
fn candidate_scope_ranks_by_affinity_and_applies_live_modifiers() {
    let harness = graded_harness();
    harness.seed_candidate(candidate("cand-1", "Travis", None));
    harness.pin_affinity("sup-a", "cand-1", 90.0);
    harness.pin_affinity("sup-c", "cand-1", 90.0);
    harness.pin_affinity("sup-d", "cand-1", 70.0);
    harness
        .store
        .add_modifier(modifier("mod-vip", "vip", Some("cand-1"), 2))
        .expect("modifier stored");
    let mut expired = modifier("mod-old", "vip", None, 3);
    expired.expires_at = Some(start() - Duration::hours(1));
    harness.store.add_modifier(expired).expect("modifier stored");
    harness
        .service
        .allocate_batch(
            &CandidateId("cand-1".to_string()),
            AllocationRequest {
                max_to_assign: 10,
                min_score: 0.0,
            },
        )
        .expect("batch runs");

    let board = harness
        .service
        .build_leaderboard(&LeaderboardScope::Candidate(CandidateId(
            "cand-1".to_string(),
        )))
        .expect("leaderboard");

    assert_eq!(ids(&board), vec!["sup-a", "sup-c", "sup-d"]);
    let ranks: Vec<Option<u32>> = board.entries.iter().map(|entry| entry.candidate_rank).collect();
    assert_eq!(ranks, vec![Some(1), Some(1), Some(3)]);

    let vip = &board.entries[0];
    assert_eq!(vip.assignment_status, Some(AssignmentStatus::Proposed));
    assert_eq!(vip.base_priority, Some(2));
    assert_eq!(vip.effective_priority, Some(4));
    assert_eq!(board.entries[1].effective_priority, Some(2));
    assert_eq!(board.entries[2].base_priority, Some(5));
    assert_eq!(board.entries[2].effective_priority, Some(5));
}

#[test]
fn candidate_scope_requires_a_known_candidate() {
    let harness = graded_harness();

    let error = harness
        .service
        .build_leaderboard(&LeaderboardScope::Candidate(CandidateId("nope".to_string())))
        .expect_err("unknown candidate");

    assert!(matches!(error, EngineError::NotFound(EntityRef::Candidate(_))));
}
