//! The release engine.
//!
//! Planning walks the platform and registry to work out the minimal set
//! of per-container image changes, then emits an ordered plan: clone,
//! rewrite the affected resource definitions, commit and push, and one
//! batched regrade naming every affected workload. Execution interprets
//! the plan against a [`ReleaseContext`].
//!
//! A single-slot semaphore makes releases mutually exclusive; a second
//! concurrent release fails fast rather than queueing.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use slipway_id::{ImageId, ImageSpec, ServiceId, ServiceSpec};

use crate::history::EventWriter;
use crate::jobs::{ReleaseJob, ReleaseKind};
use crate::manifests::{self, ManifestError};
use crate::platform::{Platform, PlatformError, RegradeError, RegradeSpec};
use crate::registry::{Registry, RegistryError};
use crate::repo::{Repo, RepoError};

use super::context::ReleaseContext;
use super::plan::{ActionKind, ContainerRegrade, ReleaseAction};

const MAX_SIMULTANEOUS_RELEASES: usize = 1;

/// Callback invoked after every change to a job's status or log, so the
/// caller can persist progress as it happens.
pub type JobSink<'a> = &'a (dyn Fn(&ReleaseJob) + Send + Sync);

/// Errors from planning or executing a release.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("a release is already in progress; please try again later")]
    AlreadyInProgress,

    #[error("fetching from the platform: {0}")]
    Platform(#[from] PlatformError),

    #[error("fetching image repository {repository}: {source}")]
    Registry {
        repository: String,
        source: RegistryError,
    },

    #[error("getting latest image from {0}: repository has no images")]
    EmptyRepository(String),

    #[error("clone the config repo: {0}")]
    Clone(#[source] RepoError),

    #[error("pushing the config repo: {0}")]
    Push(#[source] RepoError),

    #[error("no checkout in release context")]
    NoCheckout,

    #[error("the resource path ({0}) is not valid")]
    InvalidResourcePath(PathBuf),

    #[error("the repo key ({0}) is not valid")]
    InvalidRepoKey(PathBuf),

    #[error("multiple resource definition files found for {service}: {files}")]
    MultipleDefinitions { service: ServiceId, files: String },

    #[error("updating resource definition for {service}: {source}")]
    Manifest {
        service: ServiceId,
        source: ManifestError,
    },

    #[error(transparent)]
    Regrade(#[from] RegradeError),
}

/// The release engine. Holds the ports it plans and executes against,
/// and the single release slot.
pub struct Releaser {
    platform: Arc<dyn Platform>,
    registry: Arc<dyn Registry>,
    repo: Arc<dyn Repo>,
    history: Arc<dyn EventWriter>,
    /// Path within the checkout to look for resource definition files.
    manifest_path: PathBuf,
    semaphore: Semaphore,
}

impl Releaser {
    pub fn new(
        platform: Arc<dyn Platform>,
        registry: Arc<dyn Registry>,
        repo: Arc<dyn Repo>,
        history: Arc<dyn EventWriter>,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            platform,
            registry,
            repo,
            history,
            manifest_path: manifest_path.into(),
            semaphore: Semaphore::new(MAX_SIMULTANEOUS_RELEASES),
        }
    }

    /// Plan the release described by `job` and, for execute jobs, run
    /// it. The job's log, status, and actions are updated as work
    /// proceeds; `sink` is called after every update.
    pub async fn release(
        &self,
        job: &mut ReleaseJob,
        sink: JobSink<'_>,
    ) -> Result<(), ReleaseError> {
        let _permit = self
            .semaphore
            .try_acquire()
            .map_err(|_| ReleaseError::AlreadyInProgress)?;

        let release_type = plan_name(&job.spec.service_spec, &job.spec.image_spec);
        info!(job = %job.id, release_type, kind = ?job.spec.kind, "Starting release");

        push_update(job, sink, "Calculating release actions.");

        let excludes: HashSet<ServiceId> = job.spec.excludes.iter().cloned().collect();
        let plan = match (job.spec.service_spec.clone(), job.spec.image_spec.clone()) {
            (ServiceSpec::All, ImageSpec::Latest) => self.plan_all_to_latest(&excludes).await,
            (ServiceSpec::All, ImageSpec::NoChange) => self.plan_all_without_update(&excludes).await,
            (ServiceSpec::All, ImageSpec::Id(target)) => {
                self.plan_all_for_image(&target, &excludes).await
            }
            (ServiceSpec::Id(id), ImageSpec::Latest) => self.plan_one_to_latest(&id, &excludes).await,
            (ServiceSpec::Id(id), ImageSpec::NoChange) => {
                self.plan_one_without_update(&id, &excludes).await
            }
            (ServiceSpec::Id(id), ImageSpec::Id(target)) => {
                self.plan_one(&id, &target, &excludes).await
            }
        }?;

        self.execute(job, plan, sink).await
    }

    // ------------------------------------------------------------------
    // Planning
    // ------------------------------------------------------------------

    /// Candidate services for the all-services plans: every service in
    /// every namespace, minus the excluded ones.
    async fn all_service_ids(
        &self,
        excludes: &HashSet<ServiceId>,
    ) -> Result<Vec<ServiceId>, ReleaseError> {
        let mut ids = Vec::new();
        for namespace in self.platform.namespaces().await? {
            for service in self.platform.services(&namespace).await? {
                let id = ServiceId::new(namespace.clone(), service.name);
                if !excludes.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// The newest image in `current`'s lineage.
    async fn latest_image(&self, current: &ImageId) -> Result<ImageId, ReleaseError> {
        let repository = current.repository();
        let repo = self
            .registry
            .get_repository(&repository)
            .await
            .map_err(|source| ReleaseError::Registry {
                repository: repository.clone(),
                source,
            })?;
        let latest = repo
            .latest_image()
            .ok_or(ReleaseError::EmptyRepository(repository))?;
        Ok(latest.id.clone())
    }

    async fn plan_all_to_latest(
        &self,
        excludes: &HashSet<ServiceId>,
    ) -> Result<Vec<ReleaseAction>, ReleaseError> {
        let mut plan = vec![ReleaseAction::notice(
            "I'm going to release all services to their latest images.",
        )];

        let services = self.all_service_ids(excludes).await?;

        // Each service is running multiple images. Each image may need
        // to be upgraded, and trigger a release.
        let mut regrade_map: BTreeMap<ServiceId, Vec<ContainerRegrade>> = BTreeMap::new();
        for service in &services {
            let containers = match self.platform.containers_for(service).await {
                Ok(containers) => containers,
                Err(err) => {
                    plan.push(ReleaseAction::notice(format!(
                        "service {service} does not have images associated: {err}"
                    )));
                    continue;
                }
            };
            for container in containers {
                let current = match ImageId::parse(&container.image) {
                    Ok(current) => current,
                    Err(err) => {
                        plan.push(ReleaseAction::notice(format!(
                            "service {service} container {} has an unparseable image {}: {err}",
                            container.name, container.image
                        )));
                        continue;
                    }
                };
                let latest = self.latest_image(&current).await?;
                if current == latest {
                    plan.push(ReleaseAction::notice(format!(
                        "Service image {current} is already the latest one; skipping."
                    )));
                    continue;
                }
                regrade_map
                    .entry(service.clone())
                    .or_default()
                    .push(ContainerRegrade {
                        container: container.name,
                        current,
                        target: latest,
                    });
            }
        }

        if regrade_map.is_empty() {
            plan.push(ReleaseAction::notice(
                "All services are running the latest images. Nothing to do.",
            ));
            return Ok(plan);
        }

        // At least one release needs to occur: clone the repo, change
        // the resource file(s), commit and push, then regrade.
        plan.push(ReleaseAction::clone_repo());
        for (service, regrades) in &regrade_map {
            plan.push(ReleaseAction::update_workload(
                service.clone(),
                regrades.clone(),
            ));
        }
        plan.push(ReleaseAction::commit_and_push(
            "Release latest images to all services",
        ));
        let to_regrade: Vec<ServiceId> = regrade_map.into_keys().collect();
        plan.push(ReleaseAction::regrade_services(
            to_regrade,
            "latest images (to all services)",
        ));
        Ok(plan)
    }

    async fn plan_all_for_image(
        &self,
        target: &ImageId,
        excludes: &HashSet<ServiceId>,
    ) -> Result<Vec<ReleaseAction>, ReleaseError> {
        let mut plan = vec![ReleaseAction::notice(format!(
            "I'm going to release image {target} to all services that would use it."
        ))];

        let services = self.all_service_ids(excludes).await?;

        let mut regrade_map: BTreeMap<ServiceId, Vec<ContainerRegrade>> = BTreeMap::new();
        for service in &services {
            let containers = match self.platform.containers_for(service).await {
                Ok(containers) => containers,
                Err(err) => {
                    plan.push(ReleaseAction::notice(format!(
                        "service {service} does not have images associated: {err}"
                    )));
                    continue;
                }
            };
            for container in containers {
                let Ok(candidate) = ImageId::parse(&container.image) else {
                    continue;
                };
                if candidate.repository() != target.repository() {
                    continue;
                }
                if candidate == *target {
                    plan.push(ReleaseAction::notice(format!(
                        "Service {service} image {candidate} matches the target image exactly. Skipping."
                    )));
                    continue;
                }
                regrade_map
                    .entry(service.clone())
                    .or_default()
                    .push(ContainerRegrade {
                        container: container.name,
                        current: candidate,
                        target: target.clone(),
                    });
            }
        }

        if regrade_map.is_empty() {
            plan.push(ReleaseAction::notice(format!(
                "All matching services are already running image {target}. Nothing to do."
            )));
            return Ok(plan);
        }

        plan.push(ReleaseAction::clone_repo());
        for (service, regrades) in &regrade_map {
            plan.push(ReleaseAction::update_workload(
                service.clone(),
                regrades.clone(),
            ));
        }
        plan.push(ReleaseAction::commit_and_push(format!(
            "Release {target} to all services"
        )));
        let to_regrade: Vec<ServiceId> = regrade_map.into_keys().collect();
        plan.push(ReleaseAction::regrade_services(
            to_regrade,
            format!("{target} (to all services)"),
        ));
        Ok(plan)
    }

    async fn plan_one_to_latest(
        &self,
        id: &ServiceId,
        excludes: &HashSet<ServiceId>,
    ) -> Result<Vec<ReleaseAction>, ReleaseError> {
        let mut plan = vec![ReleaseAction::notice(format!(
            "I'm going to release the latest images(s) for service {id}."
        ))];

        if excludes.contains(id) {
            plan.push(ReleaseAction::notice(format!(
                "Specified service {id} is excluded; ignoring."
            )));
            return Ok(plan);
        }

        let containers = self.platform.containers_for(id).await?;

        let mut regrades = Vec::new();
        for container in containers {
            let current = match ImageId::parse(&container.image) {
                Ok(current) => current,
                Err(err) => {
                    plan.push(ReleaseAction::notice(format!(
                        "service {id} container {} has an unparseable image {}: {err}",
                        container.name, container.image
                    )));
                    continue;
                }
            };
            let latest = self.latest_image(&current).await?;
            if current == latest {
                plan.push(ReleaseAction::notice(format!(
                    "Service image {current} is already the latest one; skipping."
                )));
                continue;
            }
            regrades.push(ContainerRegrade {
                container: container.name,
                current,
                target: latest,
            });
        }

        if regrades.is_empty() {
            plan.push(ReleaseAction::notice(
                "The service is already running the latest version of all its images. Nothing to do.",
            ));
            return Ok(plan);
        }

        plan.push(ReleaseAction::clone_repo());
        plan.push(ReleaseAction::update_workload(id.clone(), regrades));
        plan.push(ReleaseAction::commit_and_push(format!(
            "Release latest images to {id}"
        )));
        plan.push(ReleaseAction::regrade_services(
            vec![id.clone()],
            "latest images",
        ));
        Ok(plan)
    }

    async fn plan_one(
        &self,
        id: &ServiceId,
        target: &ImageId,
        excludes: &HashSet<ServiceId>,
    ) -> Result<Vec<ReleaseAction>, ReleaseError> {
        let mut plan = vec![ReleaseAction::notice(format!(
            "I'm going to release image {target} to service {id}."
        ))];

        if excludes.contains(id) {
            plan.push(ReleaseAction::notice(format!(
                "Specified service {id} is excluded; ignoring."
            )));
            return Ok(plan);
        }

        let containers = self.platform.containers_for(id).await?;

        let mut regrades = Vec::new();
        for container in containers {
            let Ok(candidate) = ImageId::parse(&container.image) else {
                continue;
            };
            if candidate.repository() != target.repository() {
                continue;
            }
            if candidate == *target {
                plan.push(ReleaseAction::notice(format!(
                    "Service {id} image {candidate} matches the target image exactly. Skipping."
                )));
                continue;
            }
            regrades.push(ContainerRegrade {
                container: container.name,
                current: candidate,
                target: target.clone(),
            });
        }

        if regrades.is_empty() {
            plan.push(ReleaseAction::notice(format!(
                "All matching services are already running image {target}. Nothing to do."
            )));
            return Ok(plan);
        }

        plan.push(ReleaseAction::clone_repo());
        plan.push(ReleaseAction::update_workload(id.clone(), regrades));
        plan.push(ReleaseAction::commit_and_push(format!(
            "Release {target} to {id}"
        )));
        plan.push(ReleaseAction::regrade_services(
            vec![id.clone()],
            target.to_string(),
        ));
        Ok(plan)
    }

    /// Release whatever is in the cloned configuration, without
    /// changing anything.
    async fn plan_one_without_update(
        &self,
        id: &ServiceId,
        excludes: &HashSet<ServiceId>,
    ) -> Result<Vec<ReleaseAction>, ReleaseError> {
        if excludes.contains(id) {
            return Ok(vec![ReleaseAction::notice(format!(
                "Specified service {id} is excluded; ignoring."
            ))]);
        }

        Ok(vec![
            ReleaseAction::notice(format!(
                "I'm going to release service {id} using the config from the git repo, without updating it"
            )),
            ReleaseAction::clone_repo(),
            ReleaseAction::find_workload(id.clone()),
            ReleaseAction::regrade_services(vec![id.clone()], "without update"),
        ])
    }

    /// Release whatever is in the cloned configuration, without
    /// changing anything.
    async fn plan_all_without_update(
        &self,
        excludes: &HashSet<ServiceId>,
    ) -> Result<Vec<ReleaseAction>, ReleaseError> {
        let services = self.all_service_ids(excludes).await?;

        let mut plan = vec![
            ReleaseAction::notice(
                "I'm going to release all services using the config from the git repo, without updating it.",
            ),
            ReleaseAction::clone_repo(),
        ];
        for service in &services {
            plan.push(ReleaseAction::find_workload(service.clone()));
        }
        plan.push(ReleaseAction::regrade_services(
            services,
            "without update (all services)",
        ));
        Ok(plan)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Record the plan on the job and, for execute jobs, run it in
    /// order. Stops at the first failing action; later actions never
    /// run. The context (and with it the checkout) is dropped on every
    /// path out of here.
    async fn execute(
        &self,
        job: &mut ReleaseJob,
        actions: Vec<ReleaseAction>,
        sink: JobSink<'_>,
    ) -> Result<(), ReleaseError> {
        job.actions = actions;
        let mut context = ReleaseContext::new();

        for i in 0..job.actions.len() {
            let description = job.actions[i].description.clone();
            push_update(job, sink, &description);
            info!(description = %description, "Release action");

            if job.spec.kind != ReleaseKind::Execute {
                continue;
            }

            let kind = job.actions[i].kind.clone();
            match self.run_action(&kind, &mut context).await {
                Ok(result) => {
                    if !result.is_empty() {
                        push_update(job, sink, &result);
                    }
                    job.actions[i].result = Some(result);
                }
                Err(err) => {
                    let message = err.to_string();
                    error!(error = %message, "Release action failed");
                    push_update(job, sink, &message);
                    job.actions[i].result = Some(format!("Failed: {message}"));
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    async fn run_action(
        &self,
        kind: &ActionKind,
        context: &mut ReleaseContext,
    ) -> Result<String, ReleaseError> {
        match kind {
            ActionKind::Notice => Ok(String::new()),

            ActionKind::CloneRepo => {
                let checkout = self.repo.clone_repo().await.map_err(ReleaseError::Clone)?;
                context.checkout = Some(checkout);
                Ok("Clone OK.".to_string())
            }

            ActionKind::FindWorkload { service } => {
                let Some(file) = self.workload_file(context, service)? else {
                    return Ok(format!(
                        "no resource definition file found for {service}; skipping"
                    ));
                };
                let def = std::fs::read(&file).map_err(|e| ReleaseError::Manifest {
                    service: service.clone(),
                    source: e.into(),
                })?;
                context.pod_controllers.insert(service.clone(), def);
                Ok("Found pod controller OK.".to_string())
            }

            ActionKind::UpdateWorkload { service, regrades } => {
                self.update_workload(context, service, regrades)
            }

            ActionKind::CommitAndPush { message } => {
                let checkout = context.checkout.as_ref().ok_or(ReleaseError::NoCheckout)?;
                if !checkout.workdir().is_dir() {
                    return Err(ReleaseError::InvalidResourcePath(
                        checkout.workdir().to_path_buf(),
                    ));
                }
                if !checkout.key_file().exists() {
                    return Err(ReleaseError::InvalidRepoKey(
                        checkout.key_file().to_path_buf(),
                    ));
                }
                let output = self
                    .repo
                    .commit_and_push(checkout, message)
                    .await
                    .map_err(ReleaseError::Push)?;
                if output.is_empty() {
                    Ok(format!("Pushed commit: {message}"))
                } else {
                    Ok(output)
                }
            }

            ActionKind::RegradeServices { services, cause } => {
                self.regrade_services(context, services, cause).await
            }
        }
    }

    /// The single resource definition file for `service`, or `None` to
    /// skip it. More than one file is an error.
    fn workload_file(
        &self,
        context: &ReleaseContext,
        service: &ServiceId,
    ) -> Result<Option<PathBuf>, ReleaseError> {
        let checkout = context.checkout.as_ref().ok_or(ReleaseError::NoCheckout)?;
        let resource_path = checkout.workdir().join(&self.manifest_path);
        if !resource_path.is_dir() {
            return Err(ReleaseError::InvalidResourcePath(resource_path));
        }

        let mut files =
            manifests::files_for(&resource_path, service).map_err(|e| ReleaseError::Manifest {
                service: service.clone(),
                source: e,
            })?;
        if files.len() > 1 {
            let files: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
            return Err(ReleaseError::MultipleDefinitions {
                service: service.clone(),
                files: files.join(", "),
            });
        }
        Ok(files.pop())
    }

    fn update_workload(
        &self,
        context: &mut ReleaseContext,
        service: &ServiceId,
        regrades: &[ContainerRegrade],
    ) -> Result<String, ReleaseError> {
        let Some(file) = self.workload_file(context, service)? else {
            return Ok(format!(
                "no resource definition file found for {service}; skipping"
            ));
        };

        let manifest_err = |source: ManifestError| ReleaseError::Manifest {
            service: service.clone(),
            source,
        };

        let mut def = std::fs::read(&file).map_err(|e| manifest_err(e.into()))?;
        let permissions = std::fs::metadata(&file)
            .map_err(|e| manifest_err(e.into()))?
            .permissions();

        // The rewriter keys on the target's lineage, so the same bytes
        // are rewritten once per regrade to handle several images in
        // one file.
        let mut warnings = Vec::new();
        for regrade in regrades {
            def = manifests::update_workload_image(&def, &regrade.target, &mut warnings)
                .map_err(manifest_err)?;
        }
        for warning in warnings {
            warn!(service = %service, warning = %warning, "Manifest rewrite warning");
        }

        // Write the file back, so commit/push works, keeping its
        // permission bits.
        std::fs::write(&file, &def).map_err(|e| manifest_err(e.into()))?;
        std::fs::set_permissions(&file, permissions).map_err(|e| manifest_err(e.into()))?;

        // Put the definition in the map, so the regrade works.
        context.pod_controllers.insert(service.clone(), def);
        Ok("Update pod controller OK.".to_string())
    }

    async fn regrade_services(
        &self,
        context: &mut ReleaseContext,
        services: &[ServiceId],
        cause: &str,
    ) -> Result<String, ReleaseError> {
        // Per-service outcomes; no entry means success.
        let mut results: BTreeMap<ServiceId, String> = BTreeMap::new();

        let mut specs = Vec::new();
        for service in services {
            match context.pod_controllers.get(service) {
                None => {
                    results.insert(
                        service.clone(),
                        "no pod controller in release context; skipping regrade".to_string(),
                    );
                }
                Some(def) => {
                    self.log_history(service, &format!("Starting regrade {cause}"));
                    specs.push(RegradeSpec {
                        service: service.clone(),
                        new_definition: def.clone(),
                    });
                }
            }
        }

        // One transaction; splat any per-service failures into the
        // results map.
        let outcome = self.platform.regrade(specs).await;
        if let Err(regrade_err) = &outcome {
            for (service, message) in regrade_err.iter() {
                results.insert(service.clone(), message.to_string());
            }
        }

        // Report individual service regrade results.
        for service in services {
            match results.get(service) {
                None => self.log_history(service, &format!("Regrade {cause}: done")),
                Some(message) => {
                    self.log_history(service, &format!("Regrade {cause}: failed: {message}"))
                }
            }
        }

        outcome.map(|()| String::new()).map_err(ReleaseError::from)
    }

    fn log_history(&self, service: &ServiceId, message: &str) {
        if let Err(err) = self.history.log_event(service, message) {
            warn!(service = %service, error = %err, "Failed to write history event");
        }
    }
}

fn push_update(job: &mut ReleaseJob, sink: JobSink<'_>, line: &str) {
    job.status = line.to_string();
    job.log.push(line.to_string());
    sink(job);
}

fn plan_name(service_spec: &ServiceSpec, image_spec: &ImageSpec) -> &'static str {
    match (service_spec, image_spec) {
        (ServiceSpec::All, ImageSpec::Latest) => "release_all_to_latest",
        (ServiceSpec::All, ImageSpec::NoChange) => "release_all_without_update",
        (ServiceSpec::All, ImageSpec::Id(_)) => "release_all_for_image",
        (ServiceSpec::Id(_), ImageSpec::Latest) => "release_one_to_latest",
        (ServiceSpec::Id(_), ImageSpec::NoChange) => "release_one_without_update",
        (ServiceSpec::Id(_), ImageSpec::Id(_)) => "release_one",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::db::Database;
    use crate::jobs::ReleaseJobSpec;
    use crate::platform::{Container, MockPlatform};
    use crate::registry::MockRegistry;
    use crate::repo::MockRepo;
    use slipway_id::ReleaseJobId;

    const WEB_MANIFEST: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: default
spec:
  template:
    spec:
      containers:
        - name: app
          image: acme/web:v1
";

    fn web_id() -> ServiceId {
        ServiceId::new("default", "web")
    }

    struct Harness {
        platform: Arc<MockPlatform>,
        repo: Arc<MockRepo>,
        releaser: Releaser,
    }

    fn harness(image: &str) -> Harness {
        let platform = Arc::new(MockPlatform::new());
        platform.add_service(
            web_id(),
            "ready",
            vec![Container {
                name: "app".to_string(),
                image: image.to_string(),
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

        let repo = Arc::new(MockRepo::new().add_file("web.yaml", WEB_MANIFEST.as_bytes().to_vec()));
        let history = Arc::new(Database::open_in_memory().unwrap());

        let releaser = Releaser::new(
            platform.clone(),
            registry.clone(),
            repo.clone(),
            history,
            ".",
        );
        Harness {
            platform,
            repo,
            releaser,
        }
    }

    fn job(kind: ReleaseKind) -> ReleaseJob {
        ReleaseJob::new(
            ReleaseJobId::new(),
            ReleaseJobSpec {
                service_spec: ServiceSpec::Id(web_id()),
                image_spec: ImageSpec::Latest,
                kind,
                excludes: Vec::new(),
            },
        )
    }

    fn descriptions(job: &ReleaseJob) -> Vec<&str> {
        job.actions.iter().map(|a| a.description.as_str()).collect()
    }

    #[tokio::test]
    async fn test_plan_kind_makes_no_writes() {
        let h = harness("acme/web:v1");
        let mut job = job(ReleaseKind::Plan);

        h.releaser.release(&mut job, &|_| {}).await.unwrap();

        assert_eq!(job.actions.len(), 5);
        assert!(h.repo.pushes().is_empty());
        assert_eq!(h.platform.regrade_calls(), 0);
        assert!(job.actions.iter().all(|a| a.result.is_none()));
    }

    #[tokio::test]
    async fn test_noop_release_to_latest() {
        let h = harness("acme/web:v2");
        let mut job = job(ReleaseKind::Execute);

        h.releaser.release(&mut job, &|_| {}).await.unwrap();

        assert_eq!(
            descriptions(&job),
            vec![
                "I'm going to release the latest images(s) for service default/web.",
                "Service image acme/web:v2 is already the latest one; skipping.",
                "The service is already running the latest version of all its images. Nothing to do.",
            ]
        );
        assert_eq!(h.platform.regrade_calls(), 0);
        assert!(h.repo.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_single_regrade_updates_file_and_platform() {
        let h = harness("acme/web:v1");
        let mut job = job(ReleaseKind::Execute);

        h.releaser.release(&mut job, &|_| {}).await.unwrap();

        let pushes = h.repo.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].message, "Release latest images to default/web");
        let committed =
            String::from_utf8(pushes[0].files[std::path::Path::new("web.yaml")].clone()).unwrap();
        assert!(committed.contains("image: acme/web:v2"));

        let applied = h.platform.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].service, web_id());

        assert_eq!(job.actions.last().unwrap().result.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_concurrent_release_is_rejected() {
        let platform = Arc::new(MockPlatform::with_read_latency(
            std::time::Duration::from_millis(200),
        ));
        platform.add_service(
            web_id(),
            "ready",
            vec![Container {
                name: "app".to_string(),
                image: "acme/web:v1".to_string(),
            }],
        );
        let registry = Arc::new(MockRegistry::new());
        registry.add_images("acme/web", &[("v1", Utc.timestamp_opt(1, 0).unwrap())]);
        let repo = Arc::new(MockRepo::new());
        let history = Arc::new(Database::open_in_memory().unwrap());
        let releaser = Arc::new(Releaser::new(
            platform.clone(),
            registry,
            repo,
            history,
            ".",
        ));

        let first = {
            let releaser = releaser.clone();
            tokio::spawn(async move {
                let mut job = job(ReleaseKind::Execute);
                releaser.release(&mut job, &|_| {}).await
            })
        };

        // Give the first release time to take the slot and block on the
        // platform read.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let reads_before = platform.read_calls();

        let started = std::time::Instant::now();
        let mut second_job = job(ReleaseKind::Execute);
        let second = releaser.release(&mut second_job, &|_| {}).await;

        assert!(matches!(second, Err(ReleaseError::AlreadyInProgress)));
        assert!(started.elapsed() < std::time::Duration::from_millis(10));
        assert_eq!(platform.read_calls(), reads_before);

        first.await.unwrap().unwrap();
    }
}
