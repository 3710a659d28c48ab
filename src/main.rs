//! # Triage Harness CLI (`triage`)
//!
//! The `triage` binary runs the issue-solution correlation pipeline over a
//! project's issue tracker and a public Q&A knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage init` | Create the checkpoint store |
//! | `triage run` | Run or resume a batch run and write artifacts |
//! | `triage analyze <number>` | Analyze a single issue and print its JSON |
//! | `triage stats <run.json>` | Summarize a stored run |
//!
//! ## Examples
//!
//! ```bash
//! # Plan a run without calling the knowledge base
//! triage run --dry-run --config ./config/triage.toml
//!
//! # Analyze the first 50 targets, resumable after Ctrl-C
//! triage run --limit 50 --config ./config/triage.toml
//!
//! # Start over, ignoring any checkpoint
//! triage run --fresh --config ./config/triage.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use triage_harness::batch::BatchOrchestrator;
use triage_harness::checkpoint;
use triage_harness::config;
use triage_harness::export;
use triage_harness::progress::{format_number, ProgressMode};
use triage_harness::stats;

/// Triage Harness CLI: correlate open issues with community answers and
/// resolved precedents.
///
/// All commands except `stats` read a TOML configuration file given by
/// `--config`. See `config/triage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Triage Harness — correlate tracker issues with known solutions",
    version,
    long_about = "Triage Harness fetches a repository's issues, extracts diagnostic signals, \
    searches a Q&A knowledge base with several strategies, finds resolved precedents in the same \
    tracker, and scores each issue for complexity, solvability and effort. Runs are batched and \
    checkpointed so they can be resumed."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Progress output on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the checkpoint store.
    ///
    /// Creates the checkpoint directory, or the SQLite database and its
    /// `run_checkpoints` table. Idempotent.
    Init,

    /// Run or resume a batch run.
    ///
    /// Fetches the issue corpus, analyzes the targets in batches, and
    /// writes `run.json` and `analyses.json` to the output directory. A
    /// checkpointed run with the same parameters is resumed. Ctrl-C stops
    /// after the current issue; the last checkpoint is kept.
    Run {
        /// Discard any checkpoint and start over.
        #[arg(long)]
        fresh: bool,

        /// Analyze at most this many target issues.
        #[arg(long)]
        limit: Option<usize>,

        /// Fetch and filter the corpus and print the planned batches,
        /// without knowledge-base calls or checkpoints.
        #[arg(long)]
        dry_run: bool,
    },

    /// Analyze a single issue and print the result as JSON.
    Analyze {
        /// Issue number.
        number: u64,
    },

    /// Print a summary of a stored run.
    Stats {
        /// Path to a `run.json` written by `triage run`.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Commands that don't require config
    if let Commands::Stats { path } = &cli.command {
        return stats::run_stats(path);
    }

    let cfg = config::load_config(&cli.config)?;
    let progress_mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            let store = checkpoint::open_store(&cfg.checkpoint).await?;
            println!("Checkpoint store ready: {}", store.describe());
        }
        Commands::Run {
            fresh,
            limit,
            dry_run,
        } => {
            let orchestrator = BatchOrchestrator::from_config(&cfg, limit)
                .await?
                .with_progress(Arc::from(progress_mode.reporter()));

            if dry_run {
                let plan = orchestrator.plan().await?;
                println!("run {} (dry-run)", orchestrator.settings().repo);
                println!("  run key:        {}", plan.run_key);
                println!("  issues fetched: {}", format_number(plan.fetched as u64));
                println!("  pull requests:  {}", format_number(plan.pull_requests as u64));
                println!("  targeted:       {}", format_number(plan.targeted as u64));
                println!(
                    "  batches:        {} ({} already checkpointed)",
                    plan.batches, plan.checkpointed_batches
                );
                if plan.truncated {
                    println!("  warning:        corpus truncated by a failed page");
                }
                return Ok(());
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current issue");
                    on_signal.cancel();
                }
            });

            let run = orchestrator.with_cancellation(cancel).run(fresh).await?;
            let artifacts = export::write_artifacts(&run, &cfg.output.dir)?;
            info!(run = %artifacts.run.display(), analyses = %artifacts.analyses.display(), "artifacts written");

            println!(
                "run {}: {} analyzed, {} skipped, {} / {} issues ({})",
                run.run_id,
                run.analyses().count(),
                run.gaps().count(),
                run.next_offset,
                run.issue_order.len(),
                run.phase.as_str()
            );
            println!("  {}", artifacts.run.display());
            println!("  {}", artifacts.analyses.display());
        }
        Commands::Analyze { number } => {
            let orchestrator = BatchOrchestrator::from_config(&cfg, None).await?;
            let analysis = orchestrator.analyze_single(number).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Stats { path } => stats::run_stats(&path)?,
    }

    Ok(())
}
