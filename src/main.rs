use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use medallion_etl::config::Config;
use medallion_etl::domain::RunStatus;
use medallion_etl::ledger::{RunLedger, SqliteRunLedger};
use medallion_etl::logging;
use medallion_etl::pipeline::{BatchOrchestrator, BatchReport};

#[derive(Parser)]
#[command(name = "medallion_etl")]
#[command(about = "Bronze/silver medallion ETL with a run ledger")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every source extract into bronze
    Bronze {
        /// Directory holding source_crm/ and source_erp/
        #[arg(long)]
        base_path: Option<PathBuf>,
        /// Load tables concurrently
        #[arg(long)]
        parallel: bool,
    },
    /// Rebuild silver from bronze
    Silver,
    /// Bronze followed by silver
    Run {
        #[arg(long)]
        base_path: Option<PathBuf>,
        #[arg(long)]
        parallel: bool,
    },
    /// Show recent batches and their table runs
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show quality findings recorded for a batch
    Findings {
        batch_id: i64,
        /// Include passing checks
        #[arg(long)]
        all: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(p) => Config::from_path(p)?.with_env_overrides()?,
        None => Config::load()?,
    };
    Ok(config)
}

fn apply_overrides(config: &mut Config, base_path: Option<PathBuf>, parallel: bool) {
    if let Some(base) = base_path {
        config.pipeline.base_path = base;
    }
    if parallel {
        config.pipeline.parallel_loads = true;
    }
}

fn print_report(report: &BatchReport) {
    let icon = match report.status {
        RunStatus::Success if report.failed_tables().count() == 0 => "✅",
        RunStatus::Success => "⚠️ ",
        _ => "❌",
    };
    println!(
        "{} {} batch {} finished {} ({} rows)",
        icon,
        report.stage,
        report.batch_id,
        report.status,
        report.total_rows()
    );
    for table in &report.tables {
        match table.outcome.row_count() {
            Some(rows) => println!("   - {:<28} {:>8} rows", table.table_name, rows),
            None => println!("   - {:<28} FAILED", table.table_name),
        }
    }
    if let Some(error) = &report.error {
        println!("   error: {}", error);
    }
}

fn print_history(ledger: &dyn RunLedger, limit: usize) -> anyhow::Result<()> {
    let batches = ledger.recent_batches(limit)?;
    if batches.is_empty() {
        println!("No batches recorded yet");
        return Ok(());
    }
    for batch in batches {
        println!(
            "📦 batch {} [{}] {} started {} ({}s)",
            batch.batch_id,
            batch.stage,
            batch.status,
            batch.start_time.format("%Y-%m-%d %H:%M:%S"),
            batch.duration_secs.map_or_else(|| "-".to_string(), |d| d.to_string())
        );
        if let Some(error) = &batch.error_message {
            println!("   error: {}", error);
        }
        for run in ledger.table_runs(batch.batch_id)? {
            println!(
                "   - {:<28} {:<8} {:>8} rows {:>4}s{}",
                run.table_name,
                run.status.as_str(),
                run.row_count.map_or_else(|| "-".to_string(), |c| c.to_string()),
                run.duration_secs.unwrap_or(0),
                run.error_message
                    .as_deref()
                    .map(|e| format!("  ({})", e))
                    .unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn print_findings(ledger: &dyn RunLedger, batch_id: i64, all: bool) -> anyhow::Result<()> {
    let findings = ledger.findings(batch_id)?;
    let shown: Vec<_> = findings.iter().filter(|f| all || !f.passed).collect();
    println!(
        "🔍 batch {}: {} checks, {} failed",
        batch_id,
        findings.len(),
        findings.iter().filter(|f| !f.passed).count()
    );
    for finding in shown {
        println!(
            "   {} {:<18} {:<6} {:<36} expected {}, observed {}{}",
            if finding.passed { "✓" } else { "✗" },
            finding.entity,
            finding.gate_stage,
            finding.check_name,
            finding.expectation,
            finding.observed,
            if finding.samples.is_empty() {
                String::new()
            } else {
                format!(" e.g. {}", finding.samples.join(", "))
            }
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    let mut config = load_config(cli.config.as_ref())?;
    logging::init_logging(&config.pipeline.log_dir);

    match cli.command {
        Commands::Bronze { base_path, parallel } => {
            apply_overrides(&mut config, base_path, parallel);
            info!(base_path = %config.pipeline.base_path.display(), "Starting bronze load");
            let orchestrator = BatchOrchestrator::from_config(&config, Utc::now().date_naive())?;
            print_report(&orchestrator.run_bronze().await?);
        }
        Commands::Silver => {
            let orchestrator = BatchOrchestrator::from_config(&config, Utc::now().date_naive())?;
            print_report(&orchestrator.run_silver().await?);
        }
        Commands::Run { base_path, parallel } => {
            apply_overrides(&mut config, base_path, parallel);
            info!(base_path = %config.pipeline.base_path.display(), "Starting full medallion run");
            let orchestrator = BatchOrchestrator::from_config(&config, Utc::now().date_naive())?;
            for report in orchestrator.run_full().await? {
                print_report(&report);
            }
        }
        Commands::History { limit } => {
            let ledger = SqliteRunLedger::open(&config.pipeline.database_path)
                .context("Failed to open run ledger")?;
            print_history(&ledger, limit)?;
        }
        Commands::Findings { batch_id, all } => {
            let ledger = SqliteRunLedger::open(&config.pipeline.database_path)
                .context("Failed to open run ledger")?;
            if ledger.batch(batch_id)?.is_none() {
                anyhow::bail!("No batch with id {}", batch_id);
            }
            print_findings(&ledger, batch_id, all)?;
        }
    }

    Ok(())
}
