//! The cluster platform port.
//!
//! This is the contract the control plane relies on from whatever is
//! actually running the workloads: enumerate namespaces and services,
//! read the containers a service is running, and apply a batch of new
//! workload definitions as one transaction.
//!
//! A mock implementation is provided for testing and development; the
//! concrete cluster driver lives outside this repository.

mod mock;

pub use mock::MockPlatform;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use slipway_id::ServiceId;

/// A platform service: a stable addressable endpoint fronting a
/// workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Service name within its namespace.
    pub name: String,

    /// A status summary for display.
    pub status: String,

    /// A grab bag of goodies, likely platform-specific.
    pub metadata: HashMap<String, String>,
}

/// A container in a pod: the name identifies it within the pod, the
/// image says what it's configured to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
}

/// One entry in a batched regrade: replace the workload definition
/// backing `service` with `new_definition`.
#[derive(Debug, Clone)]
pub struct RegradeSpec {
    pub service: ServiceId,
    pub new_definition: Vec<u8>,
}

/// The per-service failure map returned by a partially or wholly failed
/// batch regrade. Services absent from the map succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegradeError {
    failures: BTreeMap<ServiceId, String>,
}

impl RegradeError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for one service.
    pub fn insert(&mut self, service: ServiceId, message: impl Into<String>) {
        self.failures.insert(service, message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// The failure message for one service, if it failed.
    pub fn get(&self, service: &ServiceId) -> Option<&str> {
        self.failures.get(service).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServiceId, &str)> {
        self.failures.iter().map(|(id, msg)| (id, msg.as_str()))
    }
}

impl std::fmt::Display for RegradeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (service, message) in &self.failures {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{service}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for RegradeError {}

/// Errors from platform operations other than batch regrades.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("no matching service {0}")]
    ServiceNotFound(ServiceId),

    #[error("service {id} has no containers: {reason}")]
    ContainersUnavailable { id: ServiceId, reason: String },

    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

/// The cluster's contract.
#[async_trait]
pub trait Platform: Send + Sync {
    /// All namespaces known to the cluster.
    async fn namespaces(&self) -> Result<Vec<String>, PlatformError>;

    /// The services in one namespace.
    async fn services(&self, namespace: &str) -> Result<Vec<Service>, PlatformError>;

    /// One service, by id.
    async fn service(&self, id: &ServiceId) -> Result<Service, PlatformError>;

    /// The containers the service's workload is currently running.
    async fn containers_for(&self, id: &ServiceId) -> Result<Vec<Container>, PlatformError>;

    /// Apply a batch of new workload definitions as one transaction.
    ///
    /// Either the whole batch is accepted, or the returned
    /// [`RegradeError`] names exactly the services that failed; services
    /// absent from it were applied.
    async fn regrade(&self, specs: Vec<RegradeSpec>) -> Result<(), RegradeError>;
}
