//! Read-side ranked views over a store snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::affinity::AffinityScore;
use super::allocation::{
    effective_priority, Assignment, AssignmentStatus, ModifierClamps, PriorityModifier,
};
use super::domain::{county_key, CandidateId, Grade, LeadScore, Supporter, SupporterId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "value", rename_all = "snake_case")]
pub enum LeaderboardScope {
    State,
    County(String),
    Candidate(CandidateId),
}

/// Everything a leaderboard is computed from. Candidate scopes carry only that
/// candidate's affinity rows, assignments and modifiers.
#[derive(Debug, Clone, Default)]
pub struct LeaderboardSnapshot {
    pub supporters: Vec<Supporter>,
    pub affinities: Vec<AffinityScore>,
    pub assignments: Vec<Assignment>,
    pub modifiers: Vec<PriorityModifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub supporter_id: SupporterId,
    pub display_name: String,
    pub county: String,
    pub grade: Grade,
    pub lead_score: LeadScore,
    pub total_cents: u64,
    pub state_rank: u32,
    pub county_rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_rank: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_status: Option<AssignmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_priority: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyRollup {
    pub county: String,
    pub supporters: u32,
    pub total_cents: u64,
    pub average_lead_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub scope: LeaderboardScope,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<LeaderboardEntry>,
    pub counties: Vec<CountyRollup>,
}

/// SQL `RANK()` over an already sorted sequence: ties share a rank and the next
/// distinct value skips ahead.
fn sql_rank<T, K: PartialEq>(sorted: &[T], key: impl Fn(&T) -> K) -> Vec<u32> {
    let mut ranks = Vec::with_capacity(sorted.len());
    for (index, item) in sorted.iter().enumerate() {
        let rank = match index {
            0 => 1,
            _ if key(&sorted[index - 1]) == key(item) => ranks[index - 1],
            _ => index as u32 + 1,
        };
        ranks.push(rank);
    }
    ranks
}

fn by_lead_score(left: &&Supporter, right: &&Supporter) -> std::cmp::Ordering {
    right
        .lead_score
        .cmp(&left.lead_score)
        .then_with(|| left.id.cmp(&right.id))
}

/// Builds the ranked view for `scope`. State and county ranks are computed over the
/// whole snapshot independently of the requested scope.
pub fn build_leaderboard(
    snapshot: &LeaderboardSnapshot,
    scope: &LeaderboardScope,
    now: DateTime<Utc>,
    clamps: &ModifierClamps,
) -> Leaderboard {
    let mut ordered: Vec<&Supporter> = snapshot.supporters.iter().collect();
    ordered.sort_by(by_lead_score);

    let mut state_ranks: BTreeMap<&SupporterId, u32> = BTreeMap::new();
    for (supporter, rank) in ordered
        .iter()
        .zip(sql_rank(&ordered, |supporter| supporter.lead_score))
    {
        state_ranks.insert(&supporter.id, rank);
    }

    let mut by_county: BTreeMap<String, Vec<&Supporter>> = BTreeMap::new();
    for supporter in &ordered {
        by_county
            .entry(county_key(&supporter.county))
            .or_default()
            .push(*supporter);
    }
    let mut county_ranks: BTreeMap<&SupporterId, u32> = BTreeMap::new();
    for members in by_county.values() {
        for (supporter, rank) in members
            .iter()
            .zip(sql_rank(members, |supporter| supporter.lead_score))
        {
            county_ranks.insert(&supporter.id, rank);
        }
    }

    let base_entry = |supporter: &Supporter| LeaderboardEntry {
        supporter_id: supporter.id.clone(),
        display_name: supporter.display_name.clone(),
        county: supporter.county.clone(),
        grade: supporter.grade,
        lead_score: supporter.lead_score,
        total_cents: supporter.totals.sum_cents,
        state_rank: state_ranks.get(&supporter.id).copied().unwrap_or(0),
        county_rank: county_ranks.get(&supporter.id).copied().unwrap_or(0),
        candidate_rank: None,
        affinity_score: None,
        assignment_status: None,
        base_priority: None,
        effective_priority: None,
    };

    let (entries, counties) = match scope {
        LeaderboardScope::State => (
            ordered.iter().map(|supporter| base_entry(*supporter)).collect(),
            rollups(by_county.iter()),
        ),
        LeaderboardScope::County(name) => {
            let key = county_key(name);
            let members = by_county.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            (
                members.iter().map(|supporter| base_entry(*supporter)).collect(),
                rollups(by_county.iter().filter(|(county, _)| **county == key)),
            )
        }
        LeaderboardScope::Candidate(candidate_id) => (
            candidate_entries(snapshot, candidate_id, now, clamps, &base_entry),
            rollups(by_county.iter()),
        ),
    };

    Leaderboard {
        scope: scope.clone(),
        generated_at: now,
        entries,
        counties,
    }
}

fn candidate_entries(
    snapshot: &LeaderboardSnapshot,
    candidate_id: &CandidateId,
    now: DateTime<Utc>,
    clamps: &ModifierClamps,
    base_entry: &dyn Fn(&Supporter) -> LeaderboardEntry,
) -> Vec<LeaderboardEntry> {
    let supporters: BTreeMap<&SupporterId, &Supporter> = snapshot
        .supporters
        .iter()
        .map(|supporter| (&supporter.id, supporter))
        .collect();
    let live: BTreeMap<&SupporterId, &Assignment> = snapshot
        .assignments
        .iter()
        .filter(|assignment| &assignment.candidate_id == candidate_id && assignment.holds_slot())
        .map(|assignment| (&assignment.supporter_id, assignment))
        .collect();

    let mut scored: Vec<(&Supporter, f32)> = snapshot
        .affinities
        .iter()
        .filter(|score| &score.candidate_id == candidate_id)
        .filter_map(|score| {
            supporters
                .get(&score.supporter_id)
                .map(|supporter| (*supporter, score.total_score))
        })
        .collect();
    scored.sort_by(|left, right| {
        right
            .1
            .total_cmp(&left.1)
            .then_with(|| left.0.id.cmp(&right.0.id))
    });

    let ranks = sql_rank(&scored, |(_, score)| *score);
    scored
        .into_iter()
        .zip(ranks)
        .map(|((supporter, score), rank)| {
            let mut entry = base_entry(supporter);
            entry.candidate_rank = Some(rank);
            entry.affinity_score = Some(score);
            if let Some(assignment) = live.get(&supporter.id) {
                entry.assignment_status = Some(assignment.status);
                entry.base_priority = Some(assignment.base_priority);
                entry.effective_priority = Some(effective_priority(
                    assignment.base_priority,
                    &snapshot.modifiers,
                    &supporter.tags,
                    now,
                    clamps,
                ));
            }
            entry
        })
        .collect()
}

fn rollups<'a>(
    groups: impl Iterator<Item = (&'a String, &'a Vec<&'a Supporter>)>,
) -> Vec<CountyRollup> {
    let mut rollups: Vec<CountyRollup> = groups
        .map(|(_, members)| {
            let supporters = members.len() as u32;
            let total_cents = members.iter().map(|member| member.totals.sum_cents).sum();
            let lead_total: u64 = members
                .iter()
                .map(|member| u64::from(member.lead_score.value()))
                .sum();
            let average_lead_score = if supporters == 0 {
                0.0
            } else {
                ((lead_total as f64 / f64::from(supporters)) * 100.0).round() as f32 / 100.0
            };
            CountyRollup {
                county: members
                    .first()
                    .map(|member| member.county.trim().to_string())
                    .unwrap_or_default(),
                supporters,
                total_cents,
                average_lead_score,
            }
        })
        .collect();
    rollups.sort_by(|left, right| {
        right
            .total_cents
            .cmp(&left.total_cents)
            .then_with(|| left.county.cmp(&right.county))
    });
    rollups
}
