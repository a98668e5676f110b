//! Release jobs and the FIFO job store.
//!
//! A job is created at enqueue time and owned, after dequeue, by
//! exactly one worker; the store guarantees FIFO order and at-most-once
//! delivery. Durable queue backends live outside this repository; the
//! in-memory store here is the reference implementation.

mod mem;

pub use mem::InMemoryJobStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use slipway_id::{ImageSpec, ReleaseJobId, ServiceId, ServiceSpec};

use crate::release::ReleaseAction;

/// How aggressive a release is: plan only, or plan and execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseKind {
    Plan,
    Execute,
}

/// What a release job should do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseJobSpec {
    pub service_spec: ServiceSpec,
    pub image_spec: ImageSpec,
    pub kind: ReleaseKind,
    /// Services to leave alone even when the selector matches them.
    #[serde(default)]
    pub excludes: Vec<ServiceId>,
}

/// A queued, running, or finished release job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseJob {
    pub id: ReleaseJobId,
    pub spec: ReleaseJobSpec,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Short human-readable state, e.g. `Executing...`.
    pub status: String,
    /// Progress lines, oldest first.
    pub log: Vec<String>,
    /// Set when the job finishes.
    pub success: Option<bool>,
    /// The planned (and possibly executed) actions.
    pub actions: Vec<ReleaseAction>,
}

impl ReleaseJob {
    /// A fresh job for `spec`, submitted now.
    pub fn new(id: ReleaseJobId, spec: ReleaseJobSpec) -> Self {
        Self {
            id,
            spec,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            status: "Queued.".to_string(),
            log: Vec::new(),
            success: None,
            actions: Vec::new(),
        }
    }

    /// Whether the job has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Errors from the job store.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// The queue is empty; a worker tick with nothing to do.
    #[error("no release job available")]
    NoJobAvailable,

    #[error("unknown release job {0}")]
    UnknownJob(ReleaseJobId),

    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

/// The job queue's contract: multi-writer enqueue, single-reader
/// dequeue.
pub trait JobStore: Send + Sync {
    /// Enqueue a job for `spec`, returning its id.
    fn put(&self, spec: ReleaseJobSpec) -> Result<ReleaseJobId, JobStoreError>;

    /// Dequeue the oldest queued job, or fail with
    /// [`JobStoreError::NoJobAvailable`]. A job is dequeued at most
    /// once.
    fn next_job(&self) -> Result<ReleaseJob, JobStoreError>;

    /// Persist the current state of a job.
    fn update_job(&self, job: &ReleaseJob) -> Result<(), JobStoreError>;

    /// Look up a job by id.
    fn get_job(&self, id: &ReleaseJobId) -> Result<ReleaseJob, JobStoreError>;
}
