use crate::infra::{build_engine, seed_engine, EngineService, SeedSource};
use campaign_match::config::AppConfig;
use campaign_match::error::AppError;
use campaign_match::matching::{
    AllocationRequest, AllocationSummary, CandidateId, EngineError, JobControl, Leaderboard,
    LeaderboardScope, ManualAssignmentOutcome, ProfileStore, SeedReport, SupporterId,
};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct SeedArgs {
    /// Directory holding supporters.csv, candidates.csv and optionally activity.csv.
    /// Falls back to MATCH_SEED_DIR, then to the bundled demo data.
    #[arg(long)]
    pub(crate) seed_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AllocateArgs {
    #[command(flatten)]
    pub(crate) seed: SeedArgs,
    /// Allocate a single candidate instead of every candidate
    #[arg(long)]
    pub(crate) candidate: Option<String>,
    /// Maximum supporters assigned per candidate
    #[arg(long, default_value_t = 25)]
    pub(crate) max: u32,
    /// Minimum affinity score (defaults to MATCH_MIN_SCORE)
    #[arg(long)]
    pub(crate) min_score: Option<f32>,
    /// Print the JSON summary instead of the table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct LeaderboardArgs {
    #[command(flatten)]
    pub(crate) seed: SeedArgs,
    /// Restrict the board to one county
    #[arg(long, conflicts_with = "candidate")]
    pub(crate) county: Option<String>,
    /// Rank supporters by affinity for one candidate
    #[arg(long)]
    pub(crate) candidate: Option<String>,
    /// Number of rows to print
    #[arg(long, default_value_t = 10)]
    pub(crate) limit: usize,
    /// Print the JSON leaderboard instead of the table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    #[command(flatten)]
    pub(crate) seed: SeedArgs,
    /// Rows shown for each leaderboard in the walkthrough
    #[arg(long, default_value_t = 5)]
    pub(crate) top: usize,
}

pub(crate) fn run_allocate(args: AllocateArgs) -> Result<(), AppError> {
    let (engine, _, _) = load_engine(&args.seed)?;
    let request = AllocationRequest {
        max_to_assign: args.max,
        min_score: args
            .min_score
            .unwrap_or(engine.config().allocation.default_min_score),
    };

    let summaries = match args.candidate {
        Some(candidate) => vec![engine.allocate_batch(&CandidateId(candidate), request)?],
        None => {
            let report = engine.allocate_all(request, &JobControl::new())?;
            for failure in &report.failures {
                println!(
                    "! {} failed ({:?}): {}",
                    failure.candidate_id, failure.reason, failure.message
                );
            }
            report.summaries
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&summaries).map_err(std::io::Error::from)?;
        println!("{json}");
    } else {
        for summary in &summaries {
            render_summary(summary);
        }
    }
    Ok(())
}

pub(crate) fn run_leaderboard(args: LeaderboardArgs) -> Result<(), AppError> {
    let (engine, _, _) = load_engine(&args.seed)?;
    let scope = match (args.candidate, args.county) {
        (Some(candidate), _) => LeaderboardScope::Candidate(CandidateId(candidate)),
        (None, Some(county)) => LeaderboardScope::County(county),
        (None, None) => LeaderboardScope::State,
    };
    let board = engine.build_leaderboard(&scope)?;

    if args.json {
        let json = serde_json::to_string_pretty(&board).map_err(std::io::Error::from)?;
        println!("{json}");
    } else {
        render_leaderboard(&board, args.limit);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let (engine, report, source) = load_engine(&args.seed)?;

    println!("Campaign match demo");
    println!(
        "Seeded from {}: {} supporters | {} candidates | {} ledger entries",
        source.describe(),
        report.supporters,
        report.candidates,
        report.activities
    );

    println!("\nStatewide engagement");
    render_leaderboard(&engine.build_leaderboard(&LeaderboardScope::State)?, args.top);

    let first_candidate = engine
        .store()
        .candidates_page(None, 1)
        .map_err(EngineError::from)?
        .into_iter()
        .next()
        .map(|candidate| candidate.id);
    let Some(candidate_id) = first_candidate else {
        println!("\nNo candidates seeded; skipping allocation.");
        return Ok(());
    };

    if let Some(top) = engine
        .build_leaderboard(&LeaderboardScope::State)?
        .entries
        .first()
    {
        let score = engine.compute_affinity(&top.supporter_id, &candidate_id)?;
        println!(
            "\nAffinity {} -> {}: {:.2} ({})",
            top.supporter_id,
            candidate_id,
            score.total_score,
            score.category.label()
        );
        for component in &score.components {
            println!(
                "  - {}: {:.1} x {}% ({})",
                component.factor.label(),
                component.score,
                component.weight,
                component.notes
            );
        }
    }

    let request = AllocationRequest {
        max_to_assign: 25,
        min_score: engine.config().allocation.default_min_score,
    };
    let allocation = engine.allocate_all(request, &JobControl::new())?;
    println!(
        "\nBatch allocation: {} assigned across {} candidates",
        allocation.assigned_total(),
        allocation.summaries.len()
    );
    for summary in &allocation.summaries {
        render_summary(summary);
    }

    let rerun = engine.allocate_batch(&candidate_id, request)?;
    println!(
        "\nRe-running {}: {} automatic assignments superseded, {} manual preserved, {} assigned",
        candidate_id,
        rerun.cleared_automatic,
        rerun.preserved_manual,
        rerun.assigned_count()
    );

    let unassigned = engine
        .build_leaderboard(&LeaderboardScope::State)?
        .entries
        .into_iter()
        .map(|entry| entry.supporter_id)
        .find(|supporter_id| !rerun.assigned.iter().any(|entry| &entry.supporter_id == supporter_id));
    if let Some(supporter_id) = unassigned {
        describe_manual_assignment(&engine, &supporter_id, &candidate_id)?;
    }

    println!("\nCandidate view for {}", candidate_id);
    render_leaderboard(
        &engine.build_leaderboard(&LeaderboardScope::Candidate(candidate_id))?,
        args.top,
    );
    Ok(())
}

fn describe_manual_assignment(
    engine: &EngineService,
    supporter_id: &SupporterId,
    candidate_id: &CandidateId,
) -> Result<(), AppError> {
    match engine.create_manual_assignment(supporter_id, candidate_id, None)? {
        ManualAssignmentOutcome::Created { assignment } => println!(
            "Manual assignment {} -> {} recorded as {} ({})",
            supporter_id,
            candidate_id,
            assignment.role.label(),
            assignment.status.label()
        ),
        ManualAssignmentOutcome::Skipped { reason } => println!(
            "Manual assignment {} -> {} skipped: {}",
            supporter_id,
            candidate_id,
            reason.label()
        ),
    }
    Ok(())
}

fn load_engine(seed: &SeedArgs) -> Result<(Arc<EngineService>, SeedReport, SeedSource), AppError> {
    let config = AppConfig::load()?;
    let engine = build_engine(config.engine)?;
    let seed_dir = seed.seed_dir.clone().or(config.seed_dir);
    let (report, source) = seed_engine(&engine, seed_dir.as_deref())?;
    Ok((engine, report, source))
}

fn render_summary(summary: &AllocationSummary) {
    let cap = summary
        .cap
        .map(|cap| cap.to_string())
        .unwrap_or_else(|| "unlimited".to_string());
    println!(
        "\n{} (cap {}): {} assigned | {} skipped | {} failed | {} below minimum | {} ineligible",
        summary.candidate_id,
        cap,
        summary.assigned_count(),
        summary.skipped.len(),
        summary.failed.len(),
        summary.below_min_score,
        summary.ineligible
    );
    for entry in &summary.assigned {
        println!(
            "  + {:<10} {:>6.2}  {:<9} {:<18} priority {}",
            entry.supporter_id,
            entry.score,
            entry.assignment_type.label(),
            entry.role.label(),
            entry.base_priority
        );
    }
    for entry in &summary.skipped {
        println!(
            "  - {:<10} {:>6.2}  {}",
            entry.supporter_id,
            entry.score,
            entry.reason.label()
        );
    }
    for entry in &summary.failed {
        println!("  ! {:<10} {:?}: {}", entry.supporter_id, entry.reason, entry.message);
    }
}

fn render_leaderboard(board: &Leaderboard, limit: usize) {
    for entry in board.entries.iter().take(limit) {
        let rank = entry.candidate_rank.unwrap_or(entry.state_rank);
        let affinity = entry
            .affinity_score
            .map(|score| format!(" | affinity {score:.2}"))
            .unwrap_or_default();
        let priority = entry
            .effective_priority
            .map(|priority| format!(" | priority {priority}"))
            .unwrap_or_default();
        println!(
            "  {:>3}. {:<18} {:<11} {:<3} {:>4}  {:>12}  county #{}{}{}",
            rank,
            entry.display_name,
            entry.county,
            entry.grade.label(),
            entry.lead_score.value(),
            dollars(entry.total_cents),
            entry.county_rank,
            affinity,
            priority
        );
    }
    if board.entries.is_empty() {
        println!("  (no supporters)");
    }
    if !board.counties.is_empty() {
        println!("  Counties:");
        for rollup in &board.counties {
            println!(
                "    - {}: {} supporters | {} raised | avg lead {:.1}",
                rollup.county,
                rollup.supporters,
                dollars(rollup.total_cents),
                rollup.average_lead_score
            );
        }
    }
}

fn dollars(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
