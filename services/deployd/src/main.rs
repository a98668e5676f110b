//! slipway deployd
//!
//! The deploy daemon: runs the release worker and the automator against
//! the configured cluster, registry, and manifest repository. The API
//! transport mounts on [`slipway_deployd::server::Server`] and is
//! deployed separately; in development mode the daemon wires the
//! in-memory ports so the control loops run end-to-end locally.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use slipway_deployd::automator::Automator;
use slipway_deployd::config::Config;
use slipway_deployd::db::Database;
use slipway_deployd::jobs::InMemoryJobStore;
use slipway_deployd::platform::MockPlatform;
use slipway_deployd::registry::MockRegistry;
use slipway_deployd::release::{ReleaseWorker, Releaser};
use slipway_deployd::repo::MockRepo;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting slipway deployd");

    // Load configuration
    let config = Config::from_env()?;
    info!(db_path = %config.db_path.display(), "Configuration loaded");

    // Open durable state
    let db = match Database::open(&config.db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!(error = %e, "Failed to open database");
            return Err(e.into());
        }
    };

    // Ports. The concrete cluster, registry, and git drivers are wired
    // in by the embedding distribution; dev mode runs on the in-memory
    // ones.
    if !config.dev_mode {
        bail!("no cluster driver configured; set DEPLOYD_DEV=1 to run with the in-memory platform");
    }
    let platform = Arc::new(MockPlatform::new());
    let registry = Arc::new(MockRegistry::new());
    let repo = Arc::new(MockRepo::new());
    info!("Running with in-memory platform, registry, and repository (dev mode)");

    let jobs = Arc::new(InMemoryJobStore::new());
    let releaser = Arc::new(Releaser::new(
        platform,
        registry,
        repo,
        db.clone(),
        config.repo_path.clone(),
    ));
    let worker = ReleaseWorker::new(jobs.clone(), releaser, config.worker_interval);
    let automator = Automator::new(db.clone(), jobs, db.clone(), config.automation_interval);

    // Run the control loops until ctrl-c; shutdown lands between jobs.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };
    let automator_handle = {
        let shutdown = shutdown_rx;
        tokio::spawn(async move { automator.run(shutdown).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    worker_handle.await?;
    automator_handle.await?;

    info!("slipway deployd stopped");
    Ok(())
}
