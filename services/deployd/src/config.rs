//! Configuration for the deploy daemon.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Deploy daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the manifest repository, e.g. `git@example.com:org/conf`.
    pub repo_url: String,

    /// SSH key file with commit rights to the manifest repository.
    pub repo_key: PathBuf,

    /// Path within the manifest repository to look for resource
    /// definition files.
    pub repo_path: PathBuf,

    /// Path of the SQLite database holding history and automation state.
    pub db_path: PathBuf,

    /// How often the release worker polls the job queue.
    pub worker_interval: Duration,

    /// How often the automator enqueues release-to-latest jobs.
    pub automation_interval: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Whether we're in development mode (in-memory cluster driver).
    pub dev_mode: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let repo_url = std::env::var("DEPLOYD_REPO_URL").unwrap_or_default();

        let repo_key = std::env::var("DEPLOYD_REPO_KEY")
            .unwrap_or_default()
            .into();

        let repo_path = std::env::var("DEPLOYD_REPO_PATH")
            .unwrap_or_else(|_| ".".to_string())
            .into();

        let db_path = std::env::var("DEPLOYD_DB_PATH")
            .unwrap_or_else(|_| "deployd.db".to_string())
            .into();

        let worker_interval = std::env::var("DEPLOYD_WORKER_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map(Duration::from_millis)
            .context("parsing DEPLOYD_WORKER_INTERVAL_MS")?;

        let automation_interval = std::env::var("DEPLOYD_AUTOMATION_INTERVAL_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse()
            .map(Duration::from_millis)
            .context("parsing DEPLOYD_AUTOMATION_INTERVAL_MS")?;

        let log_level = std::env::var("DEPLOYD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("DEPLOYD_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            repo_url,
            repo_key,
            repo_path,
            db_path,
            worker_interval,
            automation_interval,
            log_level,
            dev_mode,
        })
    }
}
