//! Morpho Blue liquidation pipeline for Arbitrum.
//!
//! Stages run as subcommands and hand off through files in `DATA_DIR`:
//! - `simulate`: price every watched candidate into `opportunities.csv`
//! - `plan`: build orders for the best executable rows into `tx_plan.json`
//! - `preflight`: check chain, quoter and artifact freshness
//! - `exec`: simulate and send at most one liquidation
//! - `cycle`: all of the above in order

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_core::{BotConfig, ChainEnv};

const DEFAULT_LOG_FILTER: &str = "info,liquidator_core=debug,liquidator_chain=debug,liquidator_api=debug";

#[derive(Parser, Debug)]
#[command(name = "morpho-liquidator")]
#[command(about = "Morpho Blue liquidation pipeline")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Override DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Evaluate candidates from hot_queue.json into opportunities.csv
    Simulate,
    /// Build tx_plan.json from opportunities.csv
    Plan,
    /// Send at most one liquidation from tx_plan.json (requires EXEC_ENABLED=1)
    Exec,
    /// Readiness check; exits non-zero when not ok
    Preflight,
    /// simulate, plan, preflight, exec
    Cycle,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let bot_config = BotConfig::load()?;
    bot_config.log_config();

    let mut env = ChainEnv::from_env()?;
    if let Some(dir) = args.data_dir {
        env.data_dir = dir.into();
    }
    info!(
        chain_id = env.chain_id,
        data_dir = %env.data_dir.display(),
        command = ?args.command,
        "Starting Morpho liquidator"
    );

    let ctx = commands::Context::new(env, bot_config);
    let result = match args.command {
        Command::Simulate => commands::simulate(&ctx).await.map(|_| ()),
        Command::Plan => commands::plan(&ctx).await.map(|_| ()),
        Command::Exec => commands::exec(&ctx).await.map(|_| ()),
        Command::Preflight => commands::preflight(&ctx).await.map(|_| ()),
        Command::Cycle => commands::cycle(&ctx).await,
    };

    if let Err(e) = &result {
        error!(error = %e, command = ?args.command, "Command failed");
    }
    result
}
