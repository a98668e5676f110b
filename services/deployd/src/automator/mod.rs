//! Automated releases.
//!
//! A service flagged as automated gets a "release to latest" job
//! enqueued on every automator tick. Enqueueing is deliberately
//! unconditional: a duplicate job lands on the engine's "nothing to do"
//! short-circuit, which keeps the loop idempotent at the cost of a
//! little queue noise.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use slipway_id::{ImageSpec, ServiceId, ServiceSpec};

use crate::history::EventWriter;
use crate::jobs::{JobStore, ReleaseJobSpec, ReleaseKind};

/// Errors from the automation flag store.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("automation store: {0}")]
    Storage(String),
}

/// The persistent set of services flagged as automated.
pub trait AutomationStore: Send + Sync {
    fn automate(&self, service: &ServiceId) -> Result<(), AutomationError>;
    fn deautomate(&self, service: &ServiceId) -> Result<(), AutomationError>;
    fn is_automated(&self, service: &ServiceId) -> Result<bool, AutomationError>;
    /// Every automated service, in a stable order.
    fn automated_services(&self) -> Result<Vec<ServiceId>, AutomationError>;
}

/// Flags services for automation and periodically enqueues
/// release-to-latest jobs for them.
pub struct Automator {
    store: Arc<dyn AutomationStore>,
    jobs: Arc<dyn JobStore>,
    history: Arc<dyn EventWriter>,
    interval: Duration,
}

impl Automator {
    pub fn new(
        store: Arc<dyn AutomationStore>,
        jobs: Arc<dyn JobStore>,
        history: Arc<dyn EventWriter>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            jobs,
            history,
            interval,
        }
    }

    /// Turn automation on for a service.
    pub fn automate(&self, service: &ServiceId) -> Result<(), AutomationError> {
        self.store.automate(service)?;
        self.log_history(service, "Automation enabled.");
        Ok(())
    }

    /// Turn automation off for a service.
    pub fn deautomate(&self, service: &ServiceId) -> Result<(), AutomationError> {
        self.store.deautomate(service)?;
        self.log_history(service, "Automation disabled.");
        Ok(())
    }

    /// Whether a service is currently automated.
    pub fn is_automated(&self, service: &ServiceId) -> Result<bool, AutomationError> {
        self.store.is_automated(service)
    }

    /// Run the automation loop until shutdown is signaled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting automator"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Automator shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Enqueue one release-to-latest job per automated service.
    pub fn tick(&self) {
        let services = match self.store.automated_services() {
            Ok(services) => services,
            Err(err) => {
                error!(error = %err, "Failed to list automated services");
                return;
            }
        };

        for service in services {
            let spec = ReleaseJobSpec {
                service_spec: ServiceSpec::Id(service.clone()),
                image_spec: ImageSpec::Latest,
                kind: ReleaseKind::Execute,
                excludes: Vec::new(),
            };
            match self.jobs.put(spec) {
                Ok(id) => debug!(service = %service, job = %id, "Enqueued automated release"),
                Err(err) => {
                    error!(service = %service, error = %err, "Failed to enqueue automated release")
                }
            }
        }
    }

    fn log_history(&self, service: &ServiceId, message: &str) {
        if let Err(err) = self.history.log_event(service, message) {
            warn!(service = %service, error = %err, "Failed to write history event");
        }
    }
}
