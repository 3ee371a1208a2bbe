//! Bridge Scan: lottery pattern backtesting and registry maintenance
//!
//! Usage:
//!   bridge-scan import draws.json         : Load draw history into the database
//!   bridge-scan scan --import             : Find streaking patterns, queue them as pending
//!   bridge-scan backtest LO_STL_FIXED_01  : Backtest one pattern over the stored history
//!   bridge-scan backtest-all --limit 20   : Rank every pattern by win rate
//!   bridge-scan list --enabled            : Show the patterns currently in use
//!   bridge-scan prune --watch             : Run the retention worker until Ctrl+C

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use engine::store::draw_to_row;
use engine::{
    approve_pattern, import_candidates, run_retention_once, run_retention_worker,
    scan_from_store, BacktestConfig, BacktestEngine, DrawHistory, DrawRecord, EngineConfig,
    PatternRegistry, RetentionProgress, RetentionReport, SqliteStore,
};
use persistence::repository::DrawRepository;
use rust_decimal::Decimal;
use tracing::{error, info};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "bridge-scan")]
#[command(about = "Backtest, discover and prune lottery prediction patterns", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration (JSON); defaults apply to anything omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load draws from a JSON array into the database (existing periods are replaced)
    Import {
        file: PathBuf,
    },
    /// Scan all patterns over the recent window for new candidates
    Scan {
        /// Store new candidates as pending patterns
        #[arg(long)]
        import: bool,
    },
    /// Backtest a single pattern by id
    Backtest {
        id: String,
        /// First period (inclusive)
        #[arg(long)]
        start: Option<u32>,
        /// Last period (inclusive)
        #[arg(long)]
        end: Option<u32>,
        /// Print every simulated step
        #[arg(long)]
        trace: bool,
    },
    /// Backtest every pattern, best win rate first
    BacktestAll {
        #[arg(long, default_value = "0")]
        min_win_rate: Decimal,
        /// Rows to print
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Approve a pending pattern
    Approve {
        name: String,
    },
    /// Rescore patterns and apply the retention policy
    Prune {
        /// Keep running on the configured interval until Ctrl+C
        #[arg(long)]
        watch: bool,
    },
    /// List managed patterns
    List {
        /// Only patterns currently enabled
        #[arg(long)]
        enabled: bool,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,bridge_scan=debug,sqlx=warn")
    } else {
        EnvFilter::new("info,engine=info,bridge_scan=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Cannot read config {}: {}", path.display(), e))?;
            serde_json::from_str::<EngineConfig>(&raw)
                .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?
        }
        None => EngineConfig::default(),
    };

    config.validate().map_err(engine::EngineError::Config)?;
    Ok(config)
}

async fn open_database() -> anyhow::Result<persistence::Database> {
    let db_path =
        std::env::var("BRIDGE_SCAN_DB_PATH").unwrap_or_else(|_| "data/bridges.db".to_string());
    let db = persistence::Database::new(&db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    info!(path = %db_path, "Database opened");
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let config = load_config(cli.config.as_deref())?;
    let db = open_database().await?;
    let store = SqliteStore::new(db.pool_clone());

    match cli.command {
        Commands::Import { file } => cmd_import(&db, &file).await?,
        Commands::Scan { import } => cmd_scan(&store, &config, import).await?,
        Commands::Backtest {
            id,
            start,
            end,
            trace,
        } => cmd_backtest(&store, &config, &id, start, end, trace).await?,
        Commands::BacktestAll {
            min_win_rate,
            limit,
        } => cmd_backtest_all(&store, &config, min_win_rate, limit).await?,
        Commands::Approve { name } => {
            let approved = approve_pattern(&store, &name, Utc::now()).await?;
            println!("Approved: {} ({})", approved.name, approved.pattern_id);
        }
        Commands::Prune { watch } => cmd_prune(store, config, watch).await?,
        Commands::List { enabled } => cmd_list(&store, enabled).await?,
    }

    Ok(())
}

async fn cmd_import(db: &persistence::Database, file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", file.display(), e))?;
    let draws: Vec<DrawRecord> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Invalid draw file {}: {}", file.display(), e))?;

    let rows: Vec<_> = draws.iter().map(draw_to_row).collect();
    let repo = DrawRepository::new(db.pool());
    let written = repo.upsert_many(&rows).await?;
    let total = repo.count().await?;

    info!(written, total, "Draws imported");
    println!("Imported {} draws ({} in database)", written, total);
    Ok(())
}

async fn cmd_scan(store: &SqliteStore, config: &EngineConfig, import: bool) -> anyhow::Result<()> {
    println!("\n=== Bridge Scan v{} ===", APP_VERSION);
    let families: Vec<&str> = config.scanner.families.iter().map(|f| f.as_str()).collect();
    println!(
        "Lookback: {} draws | Min streak: {} | Families: {}",
        config.scanner.lookback_depth,
        config.scanner.min_streak,
        families.join(",")
    );

    let outcome = scan_from_store(store, config).await?;

    println!(
        "\nScanned {} draws: {} streaking, {} already registered, {} duplicates, {} new\n",
        outcome.scan_depth,
        outcome.found_total,
        outcome.excluded_existing,
        outcome.duplicates_in_batch,
        outcome.new_candidates.len()
    );

    for c in &outcome.new_candidates {
        println!(
            "  {:<10} {:<32} {:<36} streak {:>3}  rate {:>6}%  wins10 {:>2}  next {}",
            c.family.as_str(),
            c.pattern_id,
            c.name,
            c.metrics.streak,
            c.metrics.win_rate,
            c.metrics.wins10,
            c.next_prediction.joined()
        );
    }

    if import {
        let inserted = import_candidates(store, &outcome.new_candidates, Utc::now()).await?;
        println!("\nQueued {} candidates as pending", inserted);
    }

    Ok(())
}

async fn cmd_backtest(
    store: &SqliteStore,
    config: &EngineConfig,
    id: &str,
    start: Option<u32>,
    end: Option<u32>,
    trace: bool,
) -> anyhow::Result<()> {
    let history = store.draws_in_range(start, end).await?;
    let backtest = BacktestConfig {
        start_period: start,
        end_period: end,
        trace,
        rates: config.rates.clone(),
    };

    let result = BacktestEngine::backtest_pattern(id, &history, &backtest);

    println!("\n=== Backtest {} ===", result.pattern_id);
    if !result.pattern_name.is_empty() {
        println!("{}", result.pattern_name);
    }
    println!(
        "Tests: {} | Wins: {} | Losses: {} | Win rate: {}%",
        result.total_tests, result.wins, result.losses, result.win_rate
    );
    println!(
        "Current streak: {} | Max win streak: {} | Max lose streak: {} | Malformed: {}",
        result.current_streak, result.max_win_streak, result.max_lose_streak, result.malformed
    );
    println!(
        "Recent: streak {} | wins10 {} | K1N lo {}% de {}% | K2N lo {}% de {}%",
        result.metrics.streak,
        result.metrics.wins10,
        result.rates.real_lo,
        result.rates.real_de,
        result.rates.adjusted_lo,
        result.rates.adjusted_de
    );

    if let Some(steps) = &result.trace {
        println!();
        for step in steps {
            println!(
                "  {:>6} -> {:>6}  {:<8} {:?}",
                step.from_period,
                step.to_period,
                step.predicted.join(","),
                step.classification
            );
        }
    }

    Ok(())
}

async fn cmd_backtest_all(
    store: &SqliteStore,
    config: &EngineConfig,
    min_win_rate: Decimal,
    limit: usize,
) -> anyhow::Result<()> {
    let history = store.draws_in_range(None, None).await?;
    let results = BacktestEngine::backtest_all(&history, min_win_rate, &config.backtest());

    println!(
        "\n=== Backtest all ({} draws, min {}%, {} patterns qualify) ===\n",
        history.len(),
        min_win_rate,
        results.len()
    );
    for r in results.iter().take(limit) {
        println!(
            "  {:<32} {:<36} {:>6}%  {:>4}/{:<4} streak {:>4}",
            r.pattern_id, r.pattern_name, r.win_rate, r.wins, r.total_tests, r.current_streak
        );
    }
    if results.is_empty() {
        println!("  (no pattern meets the minimum win rate)");
    } else if results.len() > limit {
        println!("  ... {} more", results.len() - limit);
    }

    Ok(())
}

async fn cmd_prune(store: SqliteStore, config: EngineConfig, watch: bool) -> anyhow::Result<()> {
    if !watch {
        let report = run_retention_once(&store, &config, Utc::now()).await?;
        print_report(&report);
        return Ok(());
    }

    println!(
        "Retention worker every {}s. Press Ctrl+C to stop",
        config.retention.interval_secs
    );

    let progress = Arc::new(RetentionProgress::new());

    // Set up Ctrl+C handler
    let progress_for_ctrlc = progress.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl+C received, stopping retention worker...");
        progress_for_ctrlc.cancel();
    });

    let worker = tokio::spawn(run_retention_worker(
        Arc::new(store),
        config,
        progress.clone(),
    ));
    worker.await?;

    if let Some(report) = progress
        .last_report
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .as_ref()
    {
        print_report(report);
    }

    Ok(())
}

fn print_report(report: &RetentionReport) {
    println!(
        "Processed {} | disabled {} | deleted {} | re-enabled {} | skipped {} | failed {}",
        report.processed,
        report.disabled,
        report.deleted,
        report.reenabled,
        report.skipped,
        report.failed
    );
    if report.large_change {
        println!("WARNING: an unusually large share of patterns changed state");
    }
}

async fn cmd_list(store: &SqliteStore, enabled_only: bool) -> anyhow::Result<()> {
    let patterns = if enabled_only {
        store.enabled_patterns().await?
    } else {
        store.all_patterns().await?
    };

    let scope = if enabled_only { "Enabled" } else { "Managed" };
    println!("\n=== {} patterns ({}) ===\n", scope, patterns.len());
    for p in &patterns {
        println!(
            "  {:<9} {:<36} K1N {:>6}%  streak {:>4}  wins10 {:>2}  next {:<7} added {}",
            p.state,
            p.name,
            p.rates.primary(),
            p.current_streak,
            p.wins10,
            p.next_prediction,
            p.date_added.format("%Y-%m-%d")
        );
    }

    Ok(())
}
