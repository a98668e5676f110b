//! Mock platform for testing and development.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use slipway_id::ServiceId;

use super::{Container, Platform, PlatformError, RegradeError, RegradeSpec, Service};

#[derive(Debug, Clone)]
struct MockService {
    status: String,
    containers: Vec<Container>,
    /// Failure message for regrades of this service, if configured.
    fail_regrade: Option<String>,
}

/// Mock platform holding an in-memory set of services.
#[derive(Default)]
pub struct MockPlatform {
    services: Mutex<BTreeMap<ServiceId, MockService>>,
    applied: Mutex<Vec<RegradeSpec>>,
    regrade_calls: AtomicUsize,
    read_calls: AtomicUsize,
    /// Artificial latency per read, for exercising concurrent callers.
    read_latency: Option<Duration>,
}

impl MockPlatform {
    /// Create an empty mock platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock platform that sleeps on every read.
    pub fn with_read_latency(latency: Duration) -> Self {
        Self {
            read_latency: Some(latency),
            ..Self::default()
        }
    }

    /// Add a service with the given running containers.
    pub fn add_service(&self, id: ServiceId, status: &str, containers: Vec<Container>) {
        let mut services = self.services.lock().unwrap();
        services.insert(
            id,
            MockService {
                status: status.to_string(),
                containers,
                fail_regrade: None,
            },
        );
    }

    /// Make regrades of the given service fail with `message`.
    pub fn fail_regrade(&self, id: &ServiceId, message: &str) {
        let mut services = self.services.lock().unwrap();
        if let Some(service) = services.get_mut(id) {
            service.fail_regrade = Some(message.to_string());
        }
    }

    /// Every definition applied by successful regrades, in order.
    pub fn applied(&self) -> Vec<RegradeSpec> {
        self.applied.lock().unwrap().clone()
    }

    /// How many times `regrade` was called.
    pub fn regrade_calls(&self) -> usize {
        self.regrade_calls.load(Ordering::SeqCst)
    }

    /// How many read operations have been served.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    async fn note_read(&self) {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.read_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn namespaces(&self) -> Result<Vec<String>, PlatformError> {
        self.note_read().await;
        let services = self.services.lock().unwrap();
        let mut namespaces: Vec<String> = services
            .keys()
            .map(|id| id.namespace().to_string())
            .collect();
        namespaces.dedup();
        Ok(namespaces)
    }

    async fn services(&self, namespace: &str) -> Result<Vec<Service>, PlatformError> {
        self.note_read().await;
        let services = self.services.lock().unwrap();
        Ok(services
            .iter()
            .filter(|(id, _)| id.namespace() == namespace)
            .map(|(id, service)| Service {
                name: id.name().to_string(),
                status: service.status.clone(),
                metadata: HashMap::new(),
            })
            .collect())
    }

    async fn service(&self, id: &ServiceId) -> Result<Service, PlatformError> {
        self.note_read().await;
        let services = self.services.lock().unwrap();
        let service = services
            .get(id)
            .ok_or_else(|| PlatformError::ServiceNotFound(id.clone()))?;
        Ok(Service {
            name: id.name().to_string(),
            status: service.status.clone(),
            metadata: HashMap::new(),
        })
    }

    async fn containers_for(&self, id: &ServiceId) -> Result<Vec<Container>, PlatformError> {
        self.note_read().await;
        let services = self.services.lock().unwrap();
        let service = services
            .get(id)
            .ok_or_else(|| PlatformError::ServiceNotFound(id.clone()))?;
        debug!(service = %id, "[MOCK] Listing containers");
        Ok(service.containers.clone())
    }

    async fn regrade(&self, specs: Vec<RegradeSpec>) -> Result<(), RegradeError> {
        self.regrade_calls.fetch_add(1, Ordering::SeqCst);

        let mut errors = RegradeError::new();
        let mut services = self.services.lock().unwrap();
        for spec in specs {
            match services.get(&spec.service) {
                None => errors.insert(spec.service.clone(), "no matching service"),
                Some(service) => {
                    if let Some(message) = &service.fail_regrade {
                        errors.insert(spec.service.clone(), message.clone());
                        continue;
                    }
                    info!(
                        service = %spec.service,
                        bytes = spec.new_definition.len(),
                        "[MOCK] Applying workload definition"
                    );
                    self.applied.lock().unwrap().push(spec);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
