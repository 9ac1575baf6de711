mod cmd;
mod output;
mod source;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use source::Source;

#[derive(Parser)]
#[command(
    name = "haio-agent",
    about = "Revenue agent: swap, burn and distribute protocol revenue on a schedule",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML configuration file; environment variables override its values
    #[arg(long, global = true, env = "HAIO_CONFIG")]
    config: Option<PathBuf>,

    /// Status database path (overrides DB_PATH)
    #[arg(long, global = true, env = "HAIO_DB")]
    db: Option<PathBuf>,

    /// Run against an in-process demo ledger instead of the RPC gateway
    #[arg(long, global = true)]
    simulate: bool,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled worker and the status API
    Serve {
        /// Port to listen on (default: PORT from configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single cycle and exit
    RunOnce,

    /// Move revenue from the admin account into the operating account
    Fund {
        /// Amount in revenue tokens, e.g. `1.5`
        amount: String,
        /// Run a cycle after the transfer confirms
        #[arg(long)]
        run: bool,
    },

    /// Show the persisted agent status
    Status,

    /// Show recent activity log entries, newest first
    Logs {
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,
    },

    /// Show the distribution engine's pools, ratios and reward counters
    Engine,

    /// Compute a holder's claimable reward from engine counters
    Claimable {
        /// Cumulative reward per staked unit, scaled by 10^12
        #[arg(long)]
        cumulative: u128,
        /// Holder's reward checkpoint, scaled by 10^12
        #[arg(long, default_value_t = 0)]
        debt: u128,
        /// Holder's staked units
        #[arg(long)]
        staked: u64,
        /// Reward token decimals used for display
        #[arg(long, default_value_t = 9)]
        decimals: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let source = Source {
        config: cli.config.as_deref(),
        db: cli.db.as_deref(),
        simulate: cli.simulate,
    };

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&source, port),
        Commands::RunOnce => cmd::run_once::run(&source, cli.json),
        Commands::Fund { amount, run } => cmd::fund::run(&source, &amount, run, cli.json),
        Commands::Status => cmd::status::run(&source, cli.json),
        Commands::Logs { limit } => cmd::logs::run(&source, limit, cli.json),
        Commands::Engine => cmd::engine::run(&source, cli.json),
        Commands::Claimable {
            cumulative,
            debt,
            staked,
            decimals,
        } => cmd::claimable::run(cumulative, debt, staked, decimals, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
