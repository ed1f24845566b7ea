//! # custody CLI entry point
//!
//! Parses command-line arguments, layers configuration (defaults, JSON
//! file, deployment record, environment) and dispatches to the subcommand
//! handlers in [`commands`]. Results are printed to stdout as JSON; logs go
//! to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use custody::{CustodyConfig, MetricsRegistry};

mod commands;

use commands::{
    ExportArgs, GatewayArgs, IngestArgs, ListArgs, ReconcileArgs, ResumeArgs, RetrieveArgs,
    VerifyArgs,
};

/// Chain-of-custody evidence manager.
///
/// Stores evidence in a content-addressed store, anchors its fingerprint on
/// a ledger, and lets authorized reviewers check that stored bytes still
/// match what was anchored.
#[derive(Parser, Debug)]
#[command(name = "custody", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Contract deployment record providing `contractAddress`.
    #[arg(long, global = true)]
    deployment: Option<PathBuf>,

    /// Write Prometheus metrics to this textfile after the command runs.
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fingerprint, store and anchor an evidence file.
    Ingest(IngestArgs),

    /// Anchor content that a failed ingest already stored.
    Resume(ResumeArgs),

    /// Catalogue a record the ledger accepted but the catalog did not.
    Reconcile(ReconcileArgs),

    /// Check stored evidence against its ledger commitment.
    Verify(VerifyArgs),

    /// Download evidence bytes (requires a reviewer or auditor role).
    Retrieve(RetrieveArgs),

    /// List evidence submitted by an identity, newest first.
    List(ListArgs),

    /// Export catalog metadata as JSON.
    Export(ExportArgs),

    /// Print the public gateway URL for a CID.
    GatewayUrl(GatewayArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags.
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    let cfg = load_config(&cli)?;

    let metrics_out = cli.metrics_out.clone().or_else(|| {
        cfg.metrics
            .enabled
            .then(|| cfg.metrics.textfile.clone())
            .flatten()
    });
    let metrics = match &metrics_out {
        Some(_) => Some(Arc::new(
            MetricsRegistry::new().context("failed to initialise metrics registry")?,
        )),
        None => None,
    };

    let ctx = commands::Context {
        config: cfg,
        metrics: metrics.clone(),
    };

    let code = match cli.command {
        Commands::Ingest(args) => commands::run_ingest(&ctx, &args),
        Commands::Resume(args) => commands::run_resume(&ctx, &args),
        Commands::Reconcile(args) => commands::run_reconcile(&ctx, &args),
        Commands::Verify(args) => commands::run_verify(&ctx, &args),
        Commands::Retrieve(args) => commands::run_retrieve(&ctx, &args),
        Commands::List(args) => commands::run_list(&ctx, &args),
        Commands::Export(args) => commands::run_export(&ctx, &args),
        Commands::GatewayUrl(args) => commands::run_gateway_url(&ctx, &args),
    };

    // Metrics are written even when the command failed.
    if let (Some(path), Some(registry)) = (&metrics_out, &metrics) {
        if let Err(e) = std::fs::write(path, registry.gather_text()) {
            tracing::warn!(path = %path.display(), "failed to write metrics textfile: {e}");
        }
    }

    code
}

/// Defaults, then `--config`, then `--deployment`, then environment.
fn load_config(cli: &Cli) -> anyhow::Result<CustodyConfig> {
    let mut cfg = match &cli.config {
        Some(path) => CustodyConfig::from_json_file(path)?,
        None => CustodyConfig::default(),
    };
    if let Some(path) = &cli.deployment {
        cfg.apply_deployment(path)?;
    }
    cfg.apply_env();
    tracing::debug!(?cfg, "resolved configuration");
    Ok(cfg)
}
