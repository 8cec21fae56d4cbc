// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod fs;
pub mod lock;
pub mod logging;
pub mod server;
pub mod store;
pub mod ticket;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::Scheduler;
use crate::errors::OmwsError;
use crate::server::{JobService, Server};
use crate::store::TicketStore;
use crate::ticket::Ticket;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Serve {
            config,
            address,
            workers,
            dry_run,
        } => {
            let mut cfg = load_and_validate(&config)?;
            if let Some(address) = address {
                cfg.server.address = address;
            }
            if let Some(workers) = workers {
                if workers == 0 {
                    return Err(OmwsError::ConfigError("--workers must be >= 1".to_string()).into());
                }
                cfg.server.workers = workers;
            }

            if dry_run {
                print_dry_run(&cfg);
                return Ok(());
            }
            serve(cfg).await
        }
        Command::Complete {
            ticket,
            config,
            skip_request,
            create_done,
        } => {
            let cfg = load_and_validate(&config)?;
            let store = TicketStore::open(&cfg.store.ticket_directory)?;
            let scheduler = Scheduler::new(store)
                .with_skip_request(skip_request)
                .with_create_done(create_done);
            complete(scheduler, &ticket).await
        }
    }
}

async fn serve(cfg: ConfigFile) -> Result<()> {
    let service = Arc::new(JobService::from_config(&cfg)?);
    info!(
        directory = ?cfg.store.ticket_directory,
        status = ?cfg.server.status,
        "ticket store ready"
    );

    let server = Server::bind(&cfg.server.address, service, cfg.server.workers)
        .await?
        .with_max_request_bytes(cfg.server.max_request_bytes);

    // Ctrl-C → graceful shutdown.
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    };

    server.run_until(shutdown).await?;
    Ok(())
}

/// Run the dependency scheduler once for a finished job.
async fn complete(scheduler: Scheduler, raw: &str) -> Result<()> {
    let ticket = Ticket::parse(raw).map_err(OmwsError::InvalidRequest)?;

    let step = tokio::task::spawn_blocking(move || scheduler.on_job_completed(&ticket))
        .await
        .context("scheduler task failed")??;

    debug!(?step, "completion handled");
    for t in &step.newly_runnable {
        println!("runnable {t}");
    }
    if step.experiment_finished {
        println!("experiment finished");
    }
    if step.experiment_cancelled {
        println!("experiment cancelled ({} jobs)", step.cancelled.len());
    }
    Ok(())
}

/// Print the effective configuration without starting anything.
fn print_dry_run(cfg: &ConfigFile) {
    println!("omws dry-run");
    println!("  store.ticket_directory = {}", cfg.store.ticket_directory.display());
    println!("  store.ticket_attempts = {}", cfg.store.ticket_attempts);
    println!("  server.address = {}", cfg.server.address);
    println!("  server.workers = {}", cfg.server.workers);
    println!("  server.max_request_bytes = {}", cfg.server.max_request_bytes);
    println!("  server.status = {:?}", cfg.server.status);

    debug!("dry-run complete (no server started)");
}
