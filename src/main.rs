use clap::Parser;
use colored::*;
use repo_harvester::cli::Cli;
use repo_harvester::config::HarvestConfig;
use repo_harvester::driver::{plan_tasks, RunHalted, ShardDriver};
use repo_harvester::error::{HarvestError, Result};
use repo_harvester::github::GitHubClient;
use repo_harvester::models::{RunReport, ShardState, ShardTask};
use repo_harvester::pool::create_pool;
use repo_harvester::sink::{MemorySink, SurrealSink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn store_error(e: anyhow::Error) -> HarvestError {
    HarvestError::StoreError(format!("{:#}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let config = HarvestConfig::from_cli(Cli::parse())?;

    println!("{}", "GitHub Repository Harvester".bold().green());
    println!("{}\n", "=".repeat(50).dimmed());
    println!("📦 {} shards, {} at a time", config.shards.len(), config.driver.concurrency);

    let fetcher = Arc::new(GitHubClient::with_endpoint(config.token.clone(), config.endpoint.clone())?);

    // Ctrl+C stops new fetches; writes already under way still finish
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n🛑 Stopping after in-flight writes...");
            ctrl_c_token.cancel();
        }
    });

    if config.dry_run {
        println!("{}", "Dry run: results stay in memory".yellow());

        let sink = Arc::new(MemorySink::new());
        let driver = ShardDriver::new(fetcher, sink.clone(), config.driver.clone());
        let tasks = config.shards.iter().cloned().map(ShardTask::fresh).collect();

        let report = driver.run(tasks, cancel).await?;
        print_summary(&report);
        println!("🗂  {} distinct repositories collected", sink.len());
        return Ok(());
    }

    let db_pool = Arc::new(create_pool(config.store.clone(), config.pool.clone())?);
    let db_conn = db_pool
        .get().await
        .map_err(|e| HarvestError::StoreError(format!("Failed to get connection from pool: {}", e)))?;

    db_conn.ensure_schema().await.map_err(store_error)?;
    println!("✅ Connected to SurrealDB at {}", config.store.url);

    let checkpoints = if config.resume {
        db_conn.load_checkpoints().await.map_err(store_error)?
    } else {
        Vec::new()
    };
    drop(db_conn);

    let tasks = plan_tasks(config.shards.clone(), &checkpoints);
    if config.resume {
        println!(
            "♻️  Resuming: {} of {} shards left to harvest",
            tasks.len(),
            config.shards.len()
        );
    }

    let sink = Arc::new(SurrealSink::new(db_pool.clone()));
    let driver = ShardDriver::new(fetcher, sink, config.driver.clone());
    let (report, fatal) = match driver.run(tasks, cancel).await {
        Ok(report) => (report, None),
        Err(RunHalted { error, report }) => (report, Some(error)),
    };

    print_summary(&report);

    let db_conn = db_pool
        .get().await
        .map_err(|e| HarvestError::StoreError(format!("Failed to get connection from pool: {}", e)))?;

    if let Err(e) = db_conn.save_checkpoints(&report).await {
        warn!("Failed to save shard checkpoints: {:#}", e);
    }

    match db_conn.count_repositories().await {
        Ok(count) => println!("🗄  {} repositories in the store", count),
        Err(e) => warn!("Failed to count repositories: {:#}", e),
    }

    if let Some(e) = fatal {
        println!("{}", format!("❌ Harvest halted: {}", e).red());
        return Err(e);
    }

    info!("Harvest finished");
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("\n📊 Harvest summary:");

    for shard in &report.shards {
        let state = match shard.state {
            ShardState::Done => format!("{:<10}", "done").green(),
            ShardState::Failed => format!("{:<10}", "failed").red(),
            ShardState::Cancelled => format!("{:<10}", "cancelled").yellow(),
            other => format!("{:<10}", format!("{:?}", other)).normal(),
        };

        println!(
            "  {} {:<36} {:>6} records {:>4} pages",
            state,
            shard.shard.label(),
            shard.records_fetched,
            shard.pages_fetched
        );

        if shard.state != ShardState::Done {
            if let Some(cursor) = &shard.last_cursor {
                println!("  {:<10} resume after {}", "", cursor.dimmed());
            }
            if let Some(error) = &shard.error {
                println!("  {:<10} {}", "", error.red());
            }
        }
    }

    println!(
        "\nTotal: {} records; {} done, {} failed, {} cancelled",
        report.total_records(),
        report.count_in(ShardState::Done),
        report.count_in(ShardState::Failed),
        report.count_in(ShardState::Cancelled)
    );
}
