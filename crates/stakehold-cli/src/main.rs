//! stakehold CLI
//!
//! Command-line driver for the prover staking ledger: scenario simulation, randomized invariant
//! fuzzing and configuration inspection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// stakehold: prover staking ledger
///
/// Nested exchange-rate vaults, escrowed unstakes, delayed slashing and rate-limited dispense.
#[derive(Parser)]
#[command(name = "stakehold")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (JSON); defaults to STAKEHOLD_* environment variables
    #[arg(short, long, global = true, env = "STAKEHOLD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file against a fresh ledger
    Simulate {
        /// Scenario file (JSON)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Output format (human, json)
        #[arg(short, long, default_value = "human")]
        format: String,
    },

    /// Generate random traces and report a minimized invariant counterexample (if any)
    FuzzInvariants {
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Steps per generated trace
        #[arg(long, default_value_t = 200)]
        steps: u32,

        /// Number of traces
        #[arg(long, default_value_t = 100)]
        iters: u32,

        #[arg(long, default_value_t = 3)]
        provers: u32,

        #[arg(long, default_value_t = 5)]
        stakers: u32,
    },

    /// Show the effective configuration
    Config {
        /// Print the built-in defaults instead of the effective configuration
        #[arg(long)]
        print_default: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("Invalid log level: {level}"))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json_output {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Simulate { scenario, format } => {
            commands::simulate::run(scenario, format, config)
        }
        Commands::FuzzInvariants {
            seed,
            steps,
            iters,
            provers,
            stakers,
        } => commands::fuzz::run(seed, steps, iters, provers, stakers, config),
        Commands::Config { print_default } => commands::config::run(print_default, &config),
    }
}
