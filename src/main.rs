mod cli;

use clap::Parser;
use cli::{Cli, Commands, RollbackFlags};
use mintbridge::config::Config;
use mintbridge::engine::Engine;
use mintbridge::orchestrator::{JobReport, RunOptions};
use mintbridge::server;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let engine = Engine::open(config)?;

    match cli.command {
        Commands::Migrate(args) => {
            let cancel = cancel_on_ctrl_c();
            let report = engine
                .orchestrator()
                .migrate(args.name, args.contracts, &cancel, options(&args.rollback))
                .await;
            engine.persist()?;
            print_report(&report?)?;
        }
        Commands::Resume(args) => {
            let cancel = cancel_on_ctrl_c();
            let report = engine
                .orchestrator()
                .run_job(args.job, &cancel, options(&args.rollback))
                .await;
            engine.persist()?;
            print_report(&report?)?;
        }
        Commands::Rollback(args) => {
            let report = engine.orchestrator().rollback(args.job, &args.reason).await;
            engine.persist()?;
            let report = report?;
            println!("reverted {} records of job {}", report.reverted, report.job_id);
            for error in &report.errors {
                println!("  failed: {}", error);
            }
        }
        Commands::Health => {
            let health = engine.health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.is_available() {
                return Err("no usable endpoint on at least one chain".into());
            }
        }
        Commands::Server(args) => {
            let address = args.address.unwrap_or(engine.config().server.bind_addr);
            let engine = Arc::new(engine);
            server::run(engine.clone(), address).await?;
            engine.persist()?;
        }
    }

    Ok(())
}

fn options(flags: &RollbackFlags) -> RunOptions {
    RunOptions {
        rollback_on_cancel: flags.rollback_on_cancel,
        rollback_on_failure_rate: flags.rollback_on_failure_rate,
    }
}

/// First Ctrl+C cancels the job; in-flight items finish on their own timeouts
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested, finishing in-flight items");
            trigger.cancel();
        }
    });
    cancel
}

fn print_report(report: &JobReport) -> Result<(), AnyError> {
    println!("{}", serde_json::to_string_pretty(&report.job)?);
    if let Some(progress) = &report.progress {
        info!(
            batches = progress.batches_done,
            degraded = progress.batches_degraded,
            skipped = progress.skipped,
            "Batch summary"
        );
    }
    for warning in &report.validation.warnings {
        warn!(job_id = %report.job.id, "{}", warning);
    }
    if let Some(rollback) = &report.rollback {
        println!("rolled back {} records: {}", rollback.reverted, rollback.reason);
    }
    Ok(())
}
