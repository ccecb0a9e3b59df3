use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{
    ActivityId, ActivityKind, ActivityRecord, ActivityStatus, ActivityTotals, CandidateId,
};

/// Validated interaction history between one supporter and one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateHistory {
    pub interactions: u32,
    pub total_cents: u64,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

/// Ledger state folded into validated totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub totals: ActivityTotals,
    pub per_candidate: BTreeMap<CandidateId, CandidateHistory>,
}

pub(crate) fn activity_value_cents(kind: ActivityKind, volunteer_hour_value_cents: u64) -> u64 {
    match kind {
        ActivityKind::Donation { amount_cents } => amount_cents,
        ActivityKind::Volunteer { minutes } => {
            u64::from(minutes) * volunteer_hour_value_cents / 60
        }
    }
}

/// Folds the full ledger for one supporter.
///
/// The highest sequence per activity id wins, so retried or reordered deliveries
/// converge on the same state. Refund entries reduce their target activity and never
/// take it below zero.
pub(crate) fn summarize(entries: &[ActivityRecord], volunteer_hour_value_cents: u64) -> LedgerSummary {
    let mut latest: BTreeMap<&ActivityId, &ActivityRecord> = BTreeMap::new();
    for entry in entries {
        match latest.get(&entry.activity_id) {
            Some(current) if current.sequence > entry.sequence => {}
            _ => {
                latest.insert(&entry.activity_id, entry);
            }
        }
    }

    let mut refunds: BTreeMap<&ActivityId, u64> = BTreeMap::new();
    let mut validated: Vec<&ActivityRecord> = Vec::new();
    for entry in latest.values().copied() {
        match (&entry.reverses, entry.status) {
            (Some(target), ActivityStatus::Refunded) => {
                *refunds.entry(target).or_default() +=
                    activity_value_cents(entry.kind, volunteer_hour_value_cents);
            }
            (None, status) if status.counts_toward_totals() => validated.push(entry),
            _ => {}
        }
    }

    let mut summary = LedgerSummary::default();
    for entry in validated {
        let gross = activity_value_cents(entry.kind, volunteer_hour_value_cents);
        let refunded = refunds.get(&entry.activity_id).copied().unwrap_or(0);
        let net = gross.saturating_sub(refunded);
        if net == 0 {
            continue;
        }

        let totals = &mut summary.totals;
        totals.count += 1;
        totals.sum_cents += net;
        totals.max_cents = totals.max_cents.max(net);
        totals.last_activity_at = totals.last_activity_at.max(Some(entry.occurred_at));

        if let Some(candidate_id) = &entry.candidate_id {
            let history = summary.per_candidate.entry(candidate_id.clone()).or_default();
            history.interactions += 1;
            history.total_cents += net;
            history.last_interaction_at = history.last_interaction_at.max(Some(entry.occurred_at));
        }
    }

    if summary.totals.count > 0 {
        summary.totals.average_cents = summary.totals.sum_cents / u64::from(summary.totals.count);
    }

    summary
}
