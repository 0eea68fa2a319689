mod app;
mod cmd;
mod output;
mod providers;
mod root;

use clap::{Parser, Subcommand};
use cmd::{action::ActionSubcommand, config::ConfigSubcommand, place::PlaceSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "arrival",
    about = "Drive a single trip: track an action and complete it on arrival at its destination",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .arrival/)
    #[arg(long, global = true, env = "ARRIVAL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current trip
    Status,

    /// Manage the current action
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Manage the destination
    Place {
        #[command(subcommand)]
        subcommand: PlaceSubcommand,
    },

    /// Show the geofence for the current destination
    Geofence,

    /// Arm the destination geofence
    Start,

    /// Deliver the arrival trigger
    Trigger {
        /// Keep the trip after completing it
        #[arg(long)]
        keep: bool,
    },

    /// Complete the current action without a trigger
    Complete,

    /// Drop the current trip and its geofence
    Clear,

    /// Inspect and validate configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Status => cmd::status::run(&root, cli.json).await,
        Commands::Action { subcommand } => cmd::action::run(&root, subcommand, cli.json).await,
        Commands::Place { subcommand } => cmd::place::run(&root, subcommand, cli.json).await,
        Commands::Geofence => cmd::geofence::run(&root, cli.json).await,
        Commands::Start => cmd::start::run(&root, cli.json).await,
        Commands::Trigger { keep } => cmd::trigger::run(&root, keep, cli.json).await,
        Commands::Complete => cmd::complete::run(&root, cli.json).await,
        Commands::Clear => cmd::clear::run(&root, cli.json).await,
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
