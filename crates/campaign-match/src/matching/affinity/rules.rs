use super::super::domain::{Candidate, Dimension, GeographicMatch, LeadScore, Supporter};
use super::super::grading::CandidateHistory;
use super::config::AffinityConfig;
use super::{AffinityComponent, AffinityFactor};

pub(crate) fn score_components(
    supporter: &Supporter,
    candidate: &Candidate,
    history: Option<&CandidateHistory>,
    config: &AffinityConfig,
) -> Vec<AffinityComponent> {
    vec![
        ideology_component(supporter, candidate, config),
        geography_component(supporter, candidate, config),
        history_component(supporter.lead_score, history, config),
        capacity_component(candidate, config),
    ]
}

fn ideology_component(
    supporter: &Supporter,
    candidate: &Candidate,
    config: &AffinityConfig,
) -> AffinityComponent {
    let distance = supporter
        .profile
        .ideology
        .mean_absolute_difference(&candidate.profile.ideology);
    let score = (100.0 - distance).clamp(0.0, 100.0);

    AffinityComponent {
        factor: AffinityFactor::Ideology,
        score,
        weight: config.weights.ideology,
        notes: format!(
            "mean ideology distance {distance:.2}; supporter leans {}, candidate leans {}",
            supporter.profile.primary.label(),
            candidate.profile.primary.label()
        ),
    }
}

fn geography_component(
    supporter: &Supporter,
    candidate: &Candidate,
    config: &AffinityConfig,
) -> AffinityComponent {
    let tiers = config.geography;
    let (score, notes) = match candidate.geographic_match(&supporter.county) {
        GeographicMatch::ExactCounty => (
            tiers.exact_county,
            format!("supporter county {} matches home county", supporter.county),
        ),
        GeographicMatch::CoverageArea => (
            tiers.coverage_area,
            format!("supporter county {} inside coverage area", supporter.county),
        ),
        GeographicMatch::NoMatch => (
            tiers.no_match,
            format!("supporter county {} outside coverage", supporter.county),
        ),
    };

    AffinityComponent {
        factor: AffinityFactor::Geography,
        score,
        weight: config.weights.geography,
        notes,
    }
}

fn history_component(
    lead_score: LeadScore,
    history: Option<&CandidateHistory>,
    config: &AffinityConfig,
) -> AffinityComponent {
    let scoring = config.history;
    let (score, notes) = match history {
        Some(history) if history.interactions > 0 => {
            let raw = scoring.prior_base + scoring.prior_step * history.interactions as f32;
            (
                raw.min(100.0),
                format!(
                    "{} prior interaction(s) worth {} cents",
                    history.interactions, history.total_cents
                ),
            )
        }
        _ => {
            let credited =
                scoring.cold_start_max * f32::from(lead_score.value()) / f32::from(LeadScore::MAX);
            (
                credited,
                format!("cold pair; credited {credited:.2} from lead score {}", lead_score.value()),
            )
        }
    };

    AffinityComponent {
        factor: AffinityFactor::History,
        score,
        weight: config.weights.history,
        notes,
    }
}

fn capacity_component(candidate: &Candidate, config: &AffinityConfig) -> AffinityComponent {
    let policy = candidate.capacity;
    let threshold = config.capacity_fit.full_fit_utilization;

    let (score, notes) = match policy.cap {
        None => (100.0, "uncapped candidate".to_string()),
        Some(cap) => {
            let utilization = policy.utilization();
            let score = if utilization <= threshold {
                100.0
            } else {
                (100.0 * (1.0 - utilization) / (1.0 - threshold)).clamp(0.0, 100.0)
            };
            (
                score,
                format!("{} of {cap} slot(s) in use", policy.assigned.min(cap)),
            )
        }
    };

    AffinityComponent {
        factor: AffinityFactor::CapacityFit,
        score,
        weight: config.weights.capacity_fit,
        notes,
    }
}
