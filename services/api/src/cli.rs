use crate::demo::{run_allocate, run_demo, run_leaderboard, AllocateArgs, DemoArgs, LeaderboardArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use campaign_match::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Campaign Match",
    about = "Grade supporters, score candidate affinity and allocate supporters from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run batch allocation over seed data and print the summary
    Allocate(AllocateArgs),
    /// Print the ranked supporter leaderboard for seed data
    Leaderboard(LeaderboardArgs),
    /// Walk through grading, affinity and allocation on the bundled demo data
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Directory of CSV exports to seed the engine with (defaults to MATCH_SEED_DIR)
    #[arg(long)]
    pub(crate) seed_dir: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Allocate(args) => run_allocate(args),
        Command::Leaderboard(args) => run_leaderboard(args),
        Command::Demo(args) => run_demo(args),
    }
}
