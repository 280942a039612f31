use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nextday_core::chart::ChartOptions;
use nextday_core::ingest::{DirectorySnapshotSource, SnapshotSource};
use nextday_core::metrics::ScoringPolicy;
use nextday_core::service::HistoryService;
use nextday_core::storage::{HistoryStore, MemoryHistoryStore};

#[derive(Debug, Parser)]
#[command(name = "nextday_worker")]
struct Args {
    /// Compute and log, but do not write the stored history.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse pasted report text (file or stdin) and merge it into the history.
    Ingest {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Bulk-load a directory of *.json snapshot files. Defaults to SNAPSHOT_DIR.
    LoadDir {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Re-run the metrics over the stored history.
    Recompute,
    /// Write the history as pretty JSON (stdout when --out is omitted).
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Empty the stored history.
    Clear,
    /// Print chart rows as JSON.
    Chart {
        #[arg(long)]
        normalize: bool,
    },
    /// Start the external prediction pipeline and return immediately.
    TriggerPipeline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = nextday_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = run(&settings, args).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }
    result
}

async fn run(settings: &nextday_core::config::Settings, args: Args) -> anyhow::Result<()> {
    let policy = ScoringPolicy::from_env()?;
    let stored = nextday_core::storage::open_store(settings).await;

    // Dry runs work on an in-memory copy of the stored history.
    let store: Arc<dyn HistoryStore> = if args.dry_run {
        let history = stored.load().await.unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{e:#}"), "history load failed; dry run starts empty");
            Vec::new()
        });
        Arc::new(MemoryHistoryStore::with_history(history))
    } else {
        stored
    };

    let service = HistoryService::new(store, policy);
    service.load().await;

    match args.command {
        Command::Ingest { file } => {
            let text = match &file {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?,
            };
            let outcome = service
                .add_text(&text)
                .await
                .context("no dated snapshot found in input")?;
            tracing::info!(added = outcome.added, total = outcome.total, dry_run = args.dry_run, "ingest complete");
        }
        Command::LoadDir { dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => PathBuf::from(settings.require_snapshot_dir()?),
            };
            let source = DirectorySnapshotSource::new(dir);
            let incoming = source.fetch_snapshots().await?;
            let outcome = service.add_snapshots(&incoming).await;
            tracing::info!(
                source = source.source_name(),
                fetched = incoming.len(),
                added = outcome.added,
                total = outcome.total,
                dry_run = args.dry_run,
                "directory load complete"
            );
        }
        Command::Recompute => {
            let total = service.recompute().await;
            if let Some(totals) = service.latest_totals() {
                tracing::info!(
                    total,
                    trades = totals.trade_count,
                    success_rate = totals.success_rate,
                    total_pnl = totals.total_pnl,
                    dry_run = args.dry_run,
                    "metrics recomputed"
                );
            }
        }
        Command::Export { out } => {
            let body = service.export_json()?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, body)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!(path = %path.display(), entries = service.history().len(), "history exported");
                }
                None => println!("{body}"),
            }
        }
        Command::Clear => {
            service.clear().await;
        }
        Command::Chart { normalize } => {
            let rows = service.chart(&ChartOptions {
                normalize,
                ..ChartOptions::default()
            });
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::TriggerPipeline => {
            let trigger = nextday_core::pipeline::PipelineTrigger::new(
                settings.require_pipeline_command()?,
                settings.pipeline_log_dir(),
            );
            let run_id = trigger.trigger()?;
            println!("{run_id} {}", trigger.log_path(run_id).display());
        }
    }

    Ok(())
}

fn init_sentry(settings: &nextday_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
