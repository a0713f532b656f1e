// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Compass Analytics command line
//!
//! Runs the analytics engine against a SQLite database and prints the
//! results for one student as JSON. `--demo` seeds synthetic data first.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use compass_analytics::config::ConfigSource;
use compass_analytics::core::{AnalyticsOptions, Engine};
use compass_analytics::tracking::demo::DemoDataGenerator;
use compass_analytics::{build_info, Config, ConfigHandle, Database, NAME, VERSION};

/// Compass Analytics - student tracking analytics engine
#[derive(Parser, Debug)]
#[command(name = "compass-analytics")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Pattern, correlation, prediction and anomaly analytics for student tracking data")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides the configuration)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Student to analyze
    #[arg(short, long, default_value = "demo-student")]
    student: String,

    /// Seed the database with synthetic entries and goals for the student
    #[arg(long)]
    demo: bool,

    /// Days of synthetic data to generate
    #[arg(long, default_value = "30")]
    days: u32,

    /// Refresh every stored student and print the status report instead
    #[arg(long)]
    all: bool,

    /// Route the analysis through the AI collaborator
    #[arg(long)]
    ai: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let build = build_info();
    info!("{} v{} (schema {}, features {:?})", NAME, build.version, build.schema_version, build.features);

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }
    if args.ai {
        config.features.ai_enabled = true;
    }
    info!("Configuration loaded from {:?}", config_path);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args, config))
}

async fn run(args: Args, config: Config) -> Result<()> {
    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&config.database).context("opening database")?;
    info!("Database opened at {:?}", config.database.path);

    if args.demo {
        let mut generator = DemoDataGenerator::new(&args.student).with_stress_drift(0.02);
        let entries = generator.generate_entries(args.days, 2);
        let stored = db.store_entries_batch(&entries)?;
        let end = entries.last().map(|e| e.timestamp).unwrap_or_else(chrono::Utc::now);
        for goal in generator.generate_goals(end, (args.days / 7).max(1)) {
            db.store_goal(&goal)?;
        }
        info!("Seeded {} demo entries for {}", stored, args.student);
    }

    let ai = ai_analyzer(&config);
    let source: Arc<dyn ConfigSource> = Arc::new(ConfigHandle::new(config));
    let mut builder = Engine::builder()
        .config(source)
        .storage(Arc::new(db.clone()))
        .signal_store(Arc::new(db.clone()));
    if let Some(ai) = ai {
        builder = builder.ai(ai);
    }
    let engine = builder.build().await?;

    if args.all {
        let summary = engine.refresh_all().await?;
        for failure in &summary.failed {
            warn!("Analytics failed for {}: {}", failure.student_id, failure.error);
        }
        println!("{}", serde_json::to_string_pretty(&engine.status().await?)?);
    } else {
        let results = engine
            .student_analytics(&args.student, AnalyticsOptions::default())
            .await;
        if let Some(error) = &results.error {
            warn!("Analytics degraded: {}", error);
        }
        if let Some(profile) = engine.profile(&args.student) {
            info!("Health score for {}: {}", args.student, profile.health_score);
        }
        println!("{}", serde_json::to_string_pretty(results.as_ref())?);
    }

    let stats = engine.stats();
    info!(
        "Cache: {} entries, {} hits, {} misses, {} computations",
        stats.cache.entries, stats.cache.hits, stats.cache.misses, stats.cache.computations
    );
    if let Ok(db_stats) = db.get_stats() {
        info!(
            "Database: {} entries, {} goals, {} students",
            db_stats.entry_count, db_stats.goal_count, db_stats.student_count
        );
    }

    engine.shutdown().await;
    Ok(())
}

#[cfg(feature = "http-ai")]
fn ai_analyzer(config: &Config) -> Option<Arc<dyn compass_analytics::analysis::AiAnalyzer>> {
    use compass_analytics::analysis::ai::HttpAiAnalyzer;

    match HttpAiAnalyzer::from_config(&config.ai) {
        Ok(Some(analyzer)) => Some(Arc::new(analyzer)),
        Ok(None) => None,
        Err(e) => {
            warn!("AI analyzer unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "http-ai"))]
fn ai_analyzer(_config: &Config) -> Option<Arc<dyn compass_analytics::analysis::AiAnalyzer>> {
    None
}
