//! CLI entry point for the tranche rebalancer.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use tranche_rebalancer::config::Config;
use tranche_rebalancer::execution::{self, RunOptions};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Cash-in portfolio rebalancer: reconcile, plan and buy toward target weights")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile open orders, then buy toward the target weights
    Run {
        /// Report deltas without placing orders
        #[arg(long)]
        dry_run: bool,

        /// Ask before placing orders
        #[arg(long)]
        confirm: bool,
    },

    /// Show buy-only and with-sales deltas without trading
    Plan,

    /// Close records whose broker orders have finished
    Reconcile,

    /// Show current broker positions
    Positions,

    /// Check broker connectivity
    Status,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run { dry_run, confirm } => {
            execution::run(&config, &RunOptions { dry_run, confirm })
        }
        Command::Plan => execution::show_plan(&config),
        Command::Reconcile => execution::run_reconcile(&config),
        Command::Positions => execution::show_positions(&config),
        Command::Status => execution::check_status(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}
