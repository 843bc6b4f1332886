//! vouch: command-line front end for the Vouch credit-scoring pipeline.
//!
//! Activity, staking and price data come from a JSON fixture file; scores,
//! history and the scheduler checkpoint live in RocksDB under the data
//! directory. On-chain writes are dry runs that log the update and print a
//! receipt hash.

mod fixtures;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use vouch_core::traits::{HistoryLog, ModelLoader};
use vouch_core::types::normalize_address;
use vouch_engine::{
    Collaborators, EngineConfig, RecalcReport, RecalcStatus, Scheduler, ScoringService,
};
use vouch_scoring::FileModelLoader;
use vouch_store::RocksStore;

use crate::fixtures::{DryRunWriter, Fixtures};

/// Explainable wallet credit scores from on-chain activity.
#[derive(Parser, Debug)]
#[command(name = "vouch", version, about = "Wallet credit scoring")]
struct Cli {
    /// Configuration file (TOML). `VOUCH__*` environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the score database and model artifacts.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json").
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score an address without touching stored scores.
    Score(ScoreArgs),
    /// Recalculate one address through the gate and write path.
    Recalc(RecalcArgs),
    /// Recalculate several addresses concurrently.
    Batch(BatchArgs),
    /// Show the score history of an address.
    History(HistoryArgs),
    /// Periodically recalculate every known address until Ctrl+C.
    Schedule(ScheduleArgs),
}

#[derive(Args, Debug)]
struct FixtureArgs {
    /// JSON fixture file with activity, staking and price data.
    #[arg(short, long)]
    fixtures: PathBuf,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    address: String,
    #[command(flatten)]
    source: FixtureArgs,
}

#[derive(Args, Debug)]
struct RecalcArgs {
    address: String,
    /// Recompute and write even if the stored score is fresh.
    #[arg(long)]
    force: bool,
    #[command(flatten)]
    source: FixtureArgs,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Addresses to recalculate. Defaults to every address in the fixtures.
    addresses: Vec<String>,
    #[arg(long)]
    force: bool,
    #[command(flatten)]
    source: FixtureArgs,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    address: String,
    /// Number of most recent entries to show.
    #[arg(short, long, default_value_t = 10)]
    limit: usize,
}

#[derive(Args, Debug)]
struct ScheduleArgs {
    /// Run a single pass and exit.
    #[arg(long)]
    once: bool,
    /// Seconds between passes (overrides the configured interval).
    #[arg(long)]
    interval: Option<u64>,
    #[command(flatten)]
    source: FixtureArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level, &cli.log_format);

    match cli.command {
        Commands::Score(args) => score(config, args).await,
        Commands::Recalc(args) => recalc(config, args).await,
        Commands::Batch(args) => batch(config, args).await,
        Commands::History(args) => history(config, args),
        Commands::Schedule(args) => schedule(config, args).await,
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn open_store(config: &EngineConfig) -> Result<Arc<RocksStore>> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data_dir: {}", config.data_dir.display()))?;
    let path = config.db_path();
    let store = RocksStore::open(&path)
        .with_context(|| format!("failed to open database: {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_service(
    config: EngineConfig,
    fixtures: Arc<Fixtures>,
    store: Arc<RocksStore>,
) -> Arc<ScoringService> {
    let loader: Option<Arc<dyn ModelLoader>> = config
        .model_version
        .as_ref()
        .map(|_| Arc::new(FileModelLoader::new(config.model_dir())) as Arc<dyn ModelLoader>);
    let collaborators = Collaborators {
        feed: fixtures.clone(),
        staking: fixtures.clone(),
        oracle: fixtures,
        writer: Arc::new(DryRunWriter),
        features: Some(store.clone()),
        scores: store.clone(),
        history: store,
    };
    Arc::new(ScoringService::new(config, collaborators, loader))
}

fn load_fixtures(args: &FixtureArgs) -> Result<Arc<Fixtures>> {
    Ok(Arc::new(Fixtures::load(&args.fixtures)?))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn score(config: EngineConfig, args: ScoreArgs) -> Result<()> {
    let fixtures = load_fixtures(&args.source)?;
    let store = open_store(&config)?;
    let service = build_service(config, fixtures, store);
    let result = service.score(&args.address).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn recalc(config: EngineConfig, args: RecalcArgs) -> Result<()> {
    let fixtures = load_fixtures(&args.source)?;
    let store = open_store(&config)?;
    let service = build_service(config, fixtures, store);
    let report = service.recalculate(&args.address, args.force).await?;
    print_report(&report);
    println!("{}", serde_json::to_string_pretty(&report.result)?);
    Ok(())
}

async fn batch(config: EngineConfig, args: BatchArgs) -> Result<()> {
    let fixtures = load_fixtures(&args.source)?;
    let addresses = if args.addresses.is_empty() {
        fixtures.addresses()
    } else {
        args.addresses
    };
    if addresses.is_empty() {
        bail!("no addresses given and none found in the fixtures");
    }

    let store = open_store(&config)?;
    let service = build_service(config, fixtures, store);
    let mut failed = 0usize;
    for (address, outcome) in service.recalculate_batch(&addresses, args.force).await {
        match outcome {
            Ok(report) => print_report(&report),
            Err(e) => {
                failed += 1;
                println!("{address}: error: {e}");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} addresses failed", addresses.len());
    }
    Ok(())
}

fn history(config: EngineConfig, args: HistoryArgs) -> Result<()> {
    let address = normalize_address(&args.address)?;
    let store = open_store(&config)?;
    let entries = store.history(&address, args.limit)?;
    if entries.is_empty() {
        println!("no history for {address}");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

async fn schedule(config: EngineConfig, args: ScheduleArgs) -> Result<()> {
    let fixtures = load_fixtures(&args.source)?;
    let watchlist = fixtures.addresses();
    let store = open_store(&config)?;
    let service = build_service(config, fixtures, store.clone());

    let mut scheduler = Scheduler::new(service, store).with_watchlist(&watchlist);
    if let Some(secs) = args.interval {
        scheduler = scheduler.with_interval(std::time::Duration::from_secs(secs));
    }
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if args.once {
        let summary = scheduler.run_pass(&shutdown_rx).await?;
        println!(
            "processed {} of {} (recomputed {}, fresh {}, written {}, failed {})",
            summary.processed,
            summary.total,
            summary.recomputed,
            summary.fresh,
            summary.written,
            summary.failed
        );
        return Ok(());
    }

    info!(addresses = watchlist.len(), "vouch: scheduler running (Ctrl+C to stop)");
    let mut run = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::select! {
        joined = &mut run => {
            joined.context("scheduler task failed")??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("vouch: failed to listen for Ctrl+C: {e}");
            }
            info!("vouch: shutdown requested, finishing in-flight work");
        }
    }

    // Ignore a closed channel: the scheduler has already stopped.
    let _ = shutdown_tx.send(true);
    run.await.context("scheduler task failed")??;
    info!("vouch: shutdown complete");
    Ok(())
}

fn print_report(report: &RecalcReport) {
    match report.status {
        RecalcStatus::Fresh => println!(
            "{}: fresh, score {} (band {})",
            report.address,
            report.result.score,
            report.result.risk_band.as_u8()
        ),
        RecalcStatus::Defaulted => println!(
            "{}: scoring failed, default score {} reported, nothing recorded",
            report.address, report.result.score
        ),
        RecalcStatus::Recomputed => {
            let old = report
                .old_score
                .map_or_else(|| "none".to_string(), |s| s.to_string());
            let write = report
                .write
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string);
            println!(
                "{}: {} -> {} (band {}, {}), write {}",
                report.address,
                old,
                report.result.score,
                report.result.risk_band.as_u8(),
                report.freshness,
                write
            );
        }
    }
}

/// Initialize tracing on stderr with the given level and output format.
///
/// `format = "json"` emits structured JSON; anything else is human-readable
/// text. `RUST_LOG` takes precedence over `level_str`.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_recalc_with_global_flags() {
        let cli = Cli::try_parse_from([
            "vouch",
            "recalc",
            "0xab00000000000000000000000000000000000001",
            "--force",
            "--fixtures",
            "f.json",
            "--data-dir",
            "/tmp/vouch",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/vouch")));
        match cli.command {
            Commands::Recalc(args) => {
                assert!(args.force);
                assert_eq!(args.source.fixtures, PathBuf::from("f.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn recalc_then_history_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fixtures_path = dir.path().join("fixtures.json");
        std::fs::write(
            &fixtures_path,
            r#"{"activity": {"0xab00000000000000000000000000000000000001": [
                {"hash": "h1", "timestamp": 1780000000, "from": "0xpeer",
                 "to": "0xab00000000000000000000000000000000000001", "value": 50.0,
                 "token": "USDC", "kind": "token_transfer"}]}}"#,
        )
        .unwrap();
        let config = EngineConfig {
            data_dir: dir.path().join("data"),
            ..EngineConfig::default()
        };

        let store = open_store(&config).unwrap();
        let fixtures = Arc::new(Fixtures::load(&fixtures_path).unwrap());
        let service = build_service(config.clone(), fixtures, store.clone());
        let report = service
            .recalculate("0xab00000000000000000000000000000000000001", false)
            .await
            .unwrap();
        assert_eq!(report.status, RecalcStatus::Recomputed);

        let entries = store
            .history("0xab00000000000000000000000000000000000001", 10)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].new_score, report.result.score);
    }
}
