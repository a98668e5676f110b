//! The server facade: the public operations of the control plane.
//!
//! List/history reads, automation toggles, and release submission all
//! live here. Reads that touch one platform call per service fan out
//! into concurrent tasks behind a fixed-capacity semaphore; per-service
//! failures are logged and omitted from the aggregate, never fatal to
//! the whole call. The transport that carries these operations is an
//! external collaborator.

mod error;

pub use error::{ErrorKind, ServerError};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, warn};

use slipway_id::{ImageId, ReleaseJobId, ServiceId, ServiceSpec};

use crate::automator::Automator;
use crate::history::EventReader;
use crate::jobs::{JobStore, JobStoreError, ReleaseJob, ReleaseJobSpec};
use crate::platform::Platform;
use crate::registry::Registry;

/// Cap on concurrent platform calls during fan-out; the cluster API is
/// rate-limited, so this is correctness-relevant, not just tuning.
const MAX_PLATFORM_CONCURRENCY: usize = 8;

/// One image, as reported to callers: the reference plus its creation
/// time when the registry knew about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescription {
    pub id: ImageId,
    pub created_at: Option<DateTime<Utc>>,
}

/// One container of a service, with what it runs now and what the
/// registry has available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub current: ImageDescription,
    pub available: Vec<ImageDescription>,
}

/// A service as reported by `ListServices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub id: ServiceId,
    pub containers: Vec<ContainerStatus>,
    pub status: String,
    pub automated: bool,
}

/// A service's images as reported by `ListImages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageStatus {
    pub id: ServiceId,
    pub containers: Vec<ContainerStatus>,
}

/// One history line as reported by `History`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stamp: DateTime<Utc>,
    pub data: String,
}

/// The server facade.
#[derive(Clone)]
pub struct Server {
    platform: Arc<dyn Platform>,
    registry: Arc<dyn Registry>,
    jobs: Arc<dyn JobStore>,
    automator: Arc<Automator>,
    history: Arc<dyn EventReader>,
    max_platform: Arc<Semaphore>,
}

impl Server {
    pub fn new(
        platform: Arc<dyn Platform>,
        registry: Arc<dyn Registry>,
        jobs: Arc<dyn JobStore>,
        automator: Arc<Automator>,
        history: Arc<dyn EventReader>,
    ) -> Self {
        Self {
            platform,
            registry,
            jobs,
            automator,
            history,
            max_platform: Arc::new(Semaphore::new(MAX_PLATFORM_CONCURRENCY)),
        }
    }

    /// Status of every service, or of the services in one namespace.
    /// Ordering is unspecified.
    pub async fn list_services(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ServiceStatus>, ServerError> {
        let ids = match namespace {
            Some(namespace) => self.namespace_service_ids(namespace).await?,
            None => self.all_service_ids().await?,
        };

        self.fan_out(ids, |server, id| async move {
            server.service_status(&id).await
        })
        .await
    }

    /// Current and available images for the selected service(s).
    /// Ordering is unspecified.
    pub async fn list_images(&self, spec: &ServiceSpec) -> Result<Vec<ImageStatus>, ServerError> {
        let ids = match spec {
            ServiceSpec::All => self.all_service_ids().await?,
            ServiceSpec::Id(id) => vec![id.clone()],
        };

        self.fan_out(ids, |server, id| async move {
            let containers = server.containers_for(&id).await?;
            Ok(ImageStatus { id, containers })
        })
        .await
    }

    /// History events for the selected service(s), rendered as display
    /// lines.
    pub async fn history(&self, spec: &ServiceSpec) -> Result<Vec<HistoryEntry>, ServerError> {
        let mut events = Vec::new();
        match spec {
            ServiceSpec::All => {
                let namespaces = self
                    .platform
                    .namespaces()
                    .await
                    .map_err(|e| ServerError::upstream(format!("fetching platform namespaces: {e}")))?;
                for namespace in namespaces {
                    let mut batch = self.history.all_events(&namespace).map_err(|e| {
                        ServerError::internal(format!(
                            "fetching history events for namespace {namespace}: {e}"
                        ))
                    })?;
                    events.append(&mut batch);
                }
            }
            ServiceSpec::Id(id) => {
                events = self.history.events_for_service(id).map_err(|e| {
                    ServerError::internal(format!("fetching history events for {id}: {e}"))
                })?;
            }
        }

        Ok(events
            .into_iter()
            .map(|event| HistoryEntry {
                stamp: event.stamp,
                data: format!("{}: {}", event.service.name(), event.message),
            })
            .collect())
    }

    /// Turn automation on for a service.
    pub fn automate(&self, id: &ServiceId) -> Result<(), ServerError> {
        self.automator
            .automate(id)
            .map_err(|e| ServerError::internal(e.to_string()))
    }

    /// Turn automation off for a service.
    pub fn deautomate(&self, id: &ServiceId) -> Result<(), ServerError> {
        self.automator
            .deautomate(id)
            .map_err(|e| ServerError::internal(e.to_string()))
    }

    /// Enqueue a release job; the id can be polled with
    /// [`Server::get_release`].
    pub fn post_release(&self, spec: ReleaseJobSpec) -> Result<ReleaseJobId, ServerError> {
        self.jobs
            .put(spec)
            .map_err(|e| ServerError::internal(e.to_string()))
    }

    /// Look up a release job by id.
    pub fn get_release(&self, id: &ReleaseJobId) -> Result<ReleaseJob, ServerError> {
        self.jobs.get_job(id).map_err(|e| match e {
            JobStoreError::UnknownJob(id) => {
                ServerError::not_found(format!("release job {id} not found"))
            }
            other => ServerError::internal(other.to_string()),
        })
    }

    // ------------------------------------------------------------------
    // Fan-out plumbing
    // ------------------------------------------------------------------

    /// Run one task per service, each behind the platform semaphore,
    /// and collect exactly one result or error per task. Errors are
    /// logged and dropped.
    async fn fan_out<T, F, Fut>(&self, ids: Vec<ServiceId>, work: F) -> Result<Vec<T>, ServerError>
    where
        T: Send + 'static,
        F: Fn(Server, ServiceId) -> Fut,
        Fut: std::future::Future<Output = Result<T, ServerError>> + Send + 'static,
    {
        let count = ids.len();
        let (result_tx, mut result_rx) = mpsc::channel::<T>(count.max(1));
        let (err_tx, mut err_rx) = mpsc::channel::<String>(count.max(1));

        for id in ids {
            let semaphore = self.max_platform.clone();
            let result_tx = result_tx.clone();
            let err_tx = err_tx.clone();
            let fut = work(self.clone(), id.clone());
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return, // semaphore closed; shutting down
                };
                match fut.await {
                    Ok(result) => {
                        let _ = result_tx.send(result).await;
                    }
                    Err(err) => {
                        let _ = err_tx.send(format!("{id}: {err}")).await;
                    }
                }
            });
        }
        drop(result_tx);
        drop(err_tx);

        let mut results = Vec::with_capacity(count);
        for _ in 0..count {
            tokio::select! {
                Some(result) = result_rx.recv() => results.push(result),
                Some(err) = err_rx.recv() => error!(error = %err, "Fan-out task failed"),
                else => break,
            }
        }
        Ok(results)
    }

    async fn all_service_ids(&self) -> Result<Vec<ServiceId>, ServerError> {
        let namespaces = self
            .platform
            .namespaces()
            .await
            .map_err(|e| ServerError::upstream(format!("fetching platform namespaces: {e}")))?;
        let mut ids = Vec::new();
        for namespace in namespaces {
            ids.extend(self.namespace_service_ids(&namespace).await?);
        }
        Ok(ids)
    }

    async fn namespace_service_ids(&self, namespace: &str) -> Result<Vec<ServiceId>, ServerError> {
        let services = self.platform.services(namespace).await.map_err(|e| {
            ServerError::upstream(format!(
                "fetching services for namespace {namespace} on the platform: {e}"
            ))
        })?;
        Ok(services
            .into_iter()
            .map(|service| ServiceId::new(namespace, service.name))
            .collect())
    }

    async fn service_status(&self, id: &ServiceId) -> Result<ServiceStatus, ServerError> {
        let containers = self.containers_for(id).await?;
        let service = self
            .platform
            .service(id)
            .await
            .map_err(|e| ServerError::upstream(format!("getting platform service {id}: {e}")))?;
        let automated = match self.automator.is_automated(id) {
            Ok(automated) => automated,
            Err(err) => {
                warn!(service = %id, error = %err, "Failed to read automation flag");
                false
            }
        };

        Ok(ServiceStatus {
            id: id.clone(),
            containers,
            status: service.status,
            automated,
        })
    }

    /// The containers a service runs, each with whatever the registry
    /// knows about its lineage. A registry failure degrades that
    /// container to "current image only".
    async fn containers_for(&self, id: &ServiceId) -> Result<Vec<ContainerStatus>, ServerError> {
        let containers = self
            .platform
            .containers_for(id)
            .await
            .map_err(|e| ServerError::upstream(format!("fetching containers for {id}: {e}")))?;

        let mut result = Vec::new();
        for container in containers {
            let image = ImageId::parse(&container.image).map_err(|e| {
                ServerError::upstream(format!(
                    "container {} of {id} runs unparseable image {}: {e}",
                    container.name, container.image
                ))
            })?;

            let mut current = ImageDescription {
                id: image.clone(),
                created_at: None,
            };
            let mut available = Vec::new();
            match self.registry.get_repository(&image.repository()).await {
                Ok(repository) => {
                    for known in repository.images {
                        let description = ImageDescription {
                            id: known.id.clone(),
                            created_at: Some(known.created_at),
                        };
                        if known.id == image {
                            current = description.clone();
                        }
                        available.push(description);
                    }
                }
                Err(err) => {
                    warn!(
                        service = %id,
                        container = %container.name,
                        error = %err,
                        "Failed to fetch image repository; returning current image only"
                    );
                }
            }

            result.push(ContainerStatus {
                name: container.name,
                current,
                available,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    use crate::db::Database;
    use crate::jobs::{InMemoryJobStore, ReleaseKind};
    use crate::platform::{Container, MockPlatform};
    use crate::registry::MockRegistry;
    use slipway_id::ImageSpec;

    fn web_id() -> ServiceId {
        ServiceId::new("default", "web")
    }

    fn server() -> (Server, Arc<MockPlatform>, Arc<Database>) {
        let platform = Arc::new(MockPlatform::new());
        platform.add_service(
            web_id(),
            "1 running",
            vec![Container {
                name: "app".to_string(),
                image: "acme/web:v1".to_string(),
            }],
        );

        let registry = Arc::new(MockRegistry::new());
        registry.add_images(
            "acme/web",
            &[
                ("v1", Utc.timestamp_opt(1, 0).unwrap()),
                ("v2", Utc.timestamp_opt(2, 0).unwrap()),
            ],
        );

        let db = Arc::new(Database::open_in_memory().unwrap());
        let jobs = Arc::new(InMemoryJobStore::new());
        let automator = Arc::new(Automator::new(
            db.clone(),
            jobs.clone(),
            db.clone(),
            Duration::from_secs(60),
        ));

        let server = Server::new(
            platform.clone(),
            registry,
            jobs,
            automator,
            db.clone(),
        );
        (server, platform, db)
    }

    #[tokio::test]
    async fn test_list_services_reports_status_and_automation() {
        let (server, _platform, _db) = server();
        server.automate(&web_id()).unwrap();

        let services = server.list_services(None).await.unwrap();
        assert_eq!(services.len(), 1);
        let status = &services[0];
        assert_eq!(status.id, web_id());
        assert_eq!(status.status, "1 running");
        assert!(status.automated);
        assert_eq!(status.containers.len(), 1);
        assert_eq!(status.containers[0].available.len(), 2);
    }

    #[tokio::test]
    async fn test_list_services_omits_failing_service() {
        let (server, platform, _db) = server();
        // A service the platform will fail to report containers for.
        platform.add_service(
            ServiceId::new("default", "ghost"),
            "?",
            vec![Container {
                name: "app".to_string(),
                image: "acme/ghost:v1".to_string(),
            }],
        );
        // No registry entry for acme/ghost: not fatal. But an
        // unparseable image is a per-service failure.
        platform.add_service(
            ServiceId::new("default", "bad"),
            "?",
            vec![Container {
                name: "app".to_string(),
                image: "".to_string(),
            }],
        );

        let services = server.list_services(None).await.unwrap();
        let names: Vec<&str> = services.iter().map(|s| s.id.name()).collect();
        assert!(names.contains(&"web"));
        assert!(names.contains(&"ghost"));
        assert!(!names.contains(&"bad"));
    }

    #[tokio::test]
    async fn test_list_images_degrades_on_unknown_repository() {
        let (server, platform, _db) = server();
        platform.add_service(
            ServiceId::new("default", "ghost"),
            "?",
            vec![Container {
                name: "app".to_string(),
                image: "acme/ghost:v1".to_string(),
            }],
        );

        let images = server
            .list_images(&ServiceSpec::Id(ServiceId::new("default", "ghost")))
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].containers[0].available.len(), 0);
        assert_eq!(
            images[0].containers[0].current.id,
            ImageId::parse("acme/ghost:v1").unwrap()
        );
    }

    #[tokio::test]
    async fn test_history_renders_events() {
        let (server, _platform, db) = server();
        use crate::history::EventWriter;
        db.log_event(&web_id(), "Regrade latest images: done").unwrap();

        let all = server.history(&ServiceSpec::All).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data, "web: Regrade latest images: done");

        let one = server
            .history(&ServiceSpec::Id(web_id()))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn test_post_and_get_release() {
        let (server, _platform, _db) = server();
        let id = server
            .post_release(ReleaseJobSpec {
                service_spec: ServiceSpec::Id(web_id()),
                image_spec: ImageSpec::Latest,
                kind: ReleaseKind::Plan,
                excludes: Vec::new(),
            })
            .unwrap();

        let job = server.get_release(&id).unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, "Queued.");
    }

    #[tokio::test]
    async fn test_get_release_unknown_id() {
        let (server, _platform, _db) = server();
        let err = server.get_release(&ReleaseJobId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
