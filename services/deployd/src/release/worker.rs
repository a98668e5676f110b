//! Release background worker.
//!
//! Drains the job queue on a periodic tick, one job at a time. The
//! worker is the only writer of a job after dequeue; it persists the
//! job on every progress line and once more when the job finishes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::jobs::{JobStore, JobStoreError, ReleaseJob};

use super::engine::Releaser;

/// Worker that executes queued release jobs.
pub struct ReleaseWorker {
    jobs: Arc<dyn JobStore>,
    releaser: Arc<Releaser>,
    interval: Duration,
}

impl ReleaseWorker {
    /// Create a new release worker.
    pub fn new(jobs: Arc<dyn JobStore>, releaser: Arc<Releaser>, interval: Duration) -> Self {
        Self {
            jobs,
            releaser,
            interval,
        }
    }

    /// Run the worker until shutdown is signaled. Shutdown lands
    /// between jobs, never mid-job.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting release worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Release worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Dequeue and execute at most one job.
    pub async fn tick(&self) {
        let mut job = match self.jobs.next_job() {
            Ok(job) => job,
            Err(JobStoreError::NoJobAvailable) => return, // normal
            Err(err) => {
                error!(error = %err, "Failed to fetch release job");
                return;
            }
        };

        job.started_at = Some(Utc::now());
        job.status = "Executing...".to_string();
        self.persist(&job);

        let jobs = self.jobs.clone();
        let sink = move |job: &ReleaseJob| {
            if let Err(err) = jobs.update_job(job) {
                warn!(job = %job.id, error = %err, "Failed to persist release job");
            }
        };

        let result = self.releaser.release(&mut job, &sink).await;

        job.finished_at = Some(Utc::now());
        match result {
            Ok(()) => {
                job.success = Some(true);
                job.status = "Complete.".to_string();
                info!(job = %job.id, "Release job complete");
            }
            Err(err) => {
                job.success = Some(false);
                let status = format!("Failed: {err}");
                job.status = status.clone();
                job.log.push(status);
                error!(job = %job.id, error = %err, "Release job failed");
            }
        }
        self.persist(&job);
    }

    fn persist(&self, job: &ReleaseJob) {
        if let Err(err) = self.jobs.update_job(job) {
            warn!(job = %job.id, error = %err, "Failed to persist release job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::db::Database;
    use crate::jobs::{InMemoryJobStore, ReleaseJobSpec, ReleaseKind};
    use crate::platform::{Container, MockPlatform};
    use crate::registry::MockRegistry;
    use crate::repo::MockRepo;
    use slipway_id::{ImageSpec, ServiceId, ServiceSpec};

    fn worker_with_service(image: &str) -> (ReleaseWorker, Arc<InMemoryJobStore>) {
        let platform = Arc::new(MockPlatform::new());
        platform.add_service(
            ServiceId::new("default", "web"),
            "ready",
            vec![Container {
                name: "app".to_string(),
                image: image.to_string(),
            }],
        );
        let registry = Arc::new(MockRegistry::new());
        registry.add_images(
            "acme/web",
            &[("v2", chrono::Utc.timestamp_opt(2, 0).unwrap())],
        );
        let repo = Arc::new(MockRepo::new());
        let history = Arc::new(Database::open_in_memory().unwrap());
        let releaser = Arc::new(Releaser::new(platform, registry, repo, history, "."));
        let jobs = Arc::new(InMemoryJobStore::new());
        let worker = ReleaseWorker::new(jobs.clone(), releaser, Duration::from_millis(10));
        (worker, jobs)
    }

    fn spec() -> ReleaseJobSpec {
        ReleaseJobSpec {
            service_spec: ServiceSpec::Id(ServiceId::new("default", "web")),
            image_spec: ImageSpec::Latest,
            kind: ReleaseKind::Execute,
            excludes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_tick_with_empty_queue_is_a_noop() {
        let (worker, _jobs) = worker_with_service("acme/web:v2");
        worker.tick().await;
    }

    #[tokio::test]
    async fn test_tick_completes_a_job() {
        let (worker, jobs) = worker_with_service("acme/web:v2");
        let id = jobs.put(spec()).unwrap();

        worker.tick().await;

        let job = jobs.get_job(&id).unwrap();
        assert_eq!(job.status, "Complete.");
        assert_eq!(job.success, Some(true));
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_some());
        assert_eq!(job.log.first().map(String::as_str), Some("Calculating release actions."));
    }

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order() {
        let (worker, jobs) = worker_with_service("acme/web:v2");
        let a = jobs.put(spec()).unwrap();
        let b = jobs.put(spec()).unwrap();

        worker.tick().await;
        let job_a = jobs.get_job(&a).unwrap();
        let job_b = jobs.get_job(&b).unwrap();
        assert!(job_a.is_finished());
        assert!(!job_b.is_finished());

        worker.tick().await;
        assert!(jobs.get_job(&b).unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_failed_job_records_status() {
        let (worker, jobs) = worker_with_service("acme/missing:v1");
        let id = jobs.put(spec()).unwrap();

        worker.tick().await;

        let job = jobs.get_job(&id).unwrap();
        assert_eq!(job.success, Some(false));
        assert!(job.status.starts_with("Failed: "));
        assert!(job.log.last().unwrap().starts_with("Failed: "));
    }
}
