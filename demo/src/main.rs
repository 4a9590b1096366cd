//! landledger — Demo CLI
//!
//! Runs scripted property-mutation scenarios end to end: every event goes
//! through risk scoring and the hash chain of an in-memory audit store, and
//! each scenario finishes by verifying the chains it wrote.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- price-spike
//!   cargo run -p demo -- burst-updates
//!   cargo run -p demo -- suspicious-terms
//!   cargo run -p demo -- tamper
//!   cargo run -p demo -- --config demo/config/risk.toml run-all

mod scenarios;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use landledger_contracts::error::LedgerResult;
use landledger_risk::RiskConfig;

// ── CLI definition ────────────────────────────────────────────────────────────

/// landledger — tamper-evident property audit log with fraud scoring.
#[derive(Parser)]
#[command(
    name = "landledger-demo",
    about = "landledger property audit and risk scoring demo",
    long_about = "Runs landledger demo scenarios showing rule-based risk scoring,\n\
                  the anomaly model, and hash-chain tamper detection."
)]
struct Cli {
    /// Risk configuration TOML.  Defaults to built-in thresholds with inline
    /// model training.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// A 60% price jump with no market context.
    PriceSpike,
    /// Three updates to one property, 30 seconds apart.
    BurstUpdates,
    /// Payment-only terms and a listing missing its buyer intent.
    SuspiciousTerms,
    /// Rewrite a stored entry and catch it with chain verification.
    Tamper,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for per-check output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = load_config(cli.config).and_then(|config| match cli.command {
        Command::RunAll => scenarios::run_all(&config),
        Command::PriceSpike => scenarios::price_spike(&config).map(drop),
        Command::BurstUpdates => scenarios::burst_updates(&config).map(drop),
        Command::SuspiciousTerms => scenarios::suspicious_terms(&config).map(drop),
        Command::Tamper => scenarios::tamper(&config).map(drop),
    });

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<PathBuf>) -> LedgerResult<RiskConfig> {
    match path {
        Some(path) => RiskConfig::from_file(&path),
        None => Ok(scenarios::demo_config()),
    }
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("landledger — Property Audit Log & Risk Engine");
    println!("=============================================");
    println!();
    println!("Pipeline per property mutation:");
    println!("  [1] Read the property's latest audit entry (under a per-property lock)");
    println!("  [2] Score: price, frequency, patterns, consistency, behavior + anomaly model");
    println!("  [3] Weighted aggregate → fraud flag (flagged, never blocked)");
    println!("  [4] SHA-256 over canonical changes + previous hash");
    println!("  [5] Persist entry and risk assessment");
    println!();
}
