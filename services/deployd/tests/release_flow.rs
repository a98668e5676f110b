//! End-to-end release flows over the in-memory ports.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use slipway_deployd::automator::Automator;
use slipway_deployd::db::Database;
use slipway_deployd::history::EventReader;
use slipway_deployd::jobs::{InMemoryJobStore, ReleaseJob, ReleaseJobSpec, ReleaseKind};
use slipway_deployd::platform::{Container, MockPlatform};
use slipway_deployd::registry::MockRegistry;
use slipway_deployd::release::{ReleaseWorker, Releaser};
use slipway_deployd::repo::MockRepo;
use slipway_deployd::server::Server;
use slipway_id::{ImageSpec, ServiceId, ServiceSpec};

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

struct Fixture {
    platform: Arc<MockPlatform>,
    registry: Arc<MockRegistry>,
    repo: Arc<MockRepo>,
    db: Arc<Database>,
    jobs: Arc<InMemoryJobStore>,
    automator: Arc<Automator>,
    worker: ReleaseWorker,
    server: Server,
}

fn fixture(repo: MockRepo) -> Fixture {
    let platform = Arc::new(MockPlatform::new());
    let registry = Arc::new(MockRegistry::new());
    let repo = Arc::new(repo);
    let db = Arc::new(Database::open_in_memory().unwrap());
    let jobs = Arc::new(InMemoryJobStore::new());

    let releaser = Arc::new(Releaser::new(
        platform.clone(),
        registry.clone(),
        repo.clone(),
        db.clone(),
        ".",
    ));
    let worker = ReleaseWorker::new(jobs.clone(), releaser, Duration::from_millis(10));
    let automator = Arc::new(Automator::new(
        db.clone(),
        jobs.clone(),
        db.clone(),
        Duration::from_millis(10),
    ));
    let server = Server::new(
        platform.clone(),
        registry.clone(),
        jobs.clone(),
        automator.clone(),
        db.clone(),
    );

    Fixture {
        platform,
        registry,
        repo,
        db,
        jobs,
        automator,
        worker,
        server,
    }
}

fn add_web_service(fixture: &Fixture, image: &str) {
    fixture.platform.add_service(
        web_id(),
        "1 running",
        vec![Container {
            name: "app".to_string(),
            image: image.to_string(),
        }],
    );
    fixture.registry.add_images(
        "acme/web",
        &[
            ("v1", Utc.timestamp_opt(1, 0).unwrap()),
            ("v2", Utc.timestamp_opt(2, 0).unwrap()),
        ],
    );
}

fn release_spec(service: ServiceSpec, image: ImageSpec) -> ReleaseJobSpec {
    ReleaseJobSpec {
        service_spec: service,
        image_spec: image,
        kind: ReleaseKind::Execute,
        excludes: Vec::new(),
    }
}

async fn run_release(fixture: &Fixture, spec: ReleaseJobSpec) -> ReleaseJob {
    let id = fixture.server.post_release(spec).unwrap();
    fixture.worker.tick().await;
    let job = fixture.server.get_release(&id).unwrap();
    assert!(job.is_finished(), "job should have finished");
    job
}

fn descriptions(job: &ReleaseJob) -> Vec<&str> {
    job.actions.iter().map(|a| a.description.as_str()).collect()
}

#[tokio::test]
async fn noop_release_to_latest() {
    let fixture = fixture(MockRepo::new().add_file("web.yaml", WEB_MANIFEST.as_bytes().to_vec()));
    add_web_service(&fixture, "acme/web:v2");

    let job = run_release(
        &fixture,
        release_spec(ServiceSpec::Id(web_id()), ImageSpec::Latest),
    )
    .await;

    assert_eq!(job.success, Some(true));
    assert_eq!(job.status, "Complete.");
    assert_eq!(
        descriptions(&job),
        vec![
            "I'm going to release the latest images(s) for service default/web.",
            "Service image acme/web:v2 is already the latest one; skipping.",
            "The service is already running the latest version of all its images. Nothing to do.",
        ]
    );
    assert_eq!(fixture.platform.regrade_calls(), 0);
    assert!(fixture.repo.pushes().is_empty());
}

#[tokio::test]
async fn happy_path_single_regrade() {
    let fixture = fixture(MockRepo::new().add_file("web.yaml", WEB_MANIFEST.as_bytes().to_vec()));
    add_web_service(&fixture, "acme/web:v1");

    let job = run_release(
        &fixture,
        release_spec(ServiceSpec::Id(web_id()), ImageSpec::Latest),
    )
    .await;

    assert_eq!(job.success, Some(true));
    assert_eq!(
        descriptions(&job),
        vec![
            "I'm going to release the latest images(s) for service default/web.",
            "Clone the config repo.",
            "Update 1 images(s) in the resource definition file for default/web: \
             app (acme/web:v1 -> acme/web:v2).",
            "Commit and push the config repo.",
            "Regrade 1 service(s): default/web.",
        ]
    );

    // The committed manifest carries the new image.
    let pushes = fixture.repo.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].message, "Release latest images to default/web");
    let committed = String::from_utf8(pushes[0].files[Path::new("web.yaml")].clone()).unwrap();
    assert!(committed.contains("image: acme/web:v2"));
    assert!(!committed.contains("image: acme/web:v1"));

    // The platform received exactly one spec, for this service.
    assert_eq!(fixture.platform.regrade_calls(), 1);
    let applied = fixture.platform.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].service, web_id());
    let applied_def = String::from_utf8(applied[0].new_definition.clone()).unwrap();
    assert!(applied_def.contains("image: acme/web:v2"));

    assert!(job
        .log
        .contains(&"Pushed commit: Release latest images to default/web".to_string()));

    // History saw the regrade start and finish.
    let events: Vec<String> = fixture
        .db
        .events_for_service(&web_id())
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(
        events,
        vec![
            "Starting regrade latest images".to_string(),
            "Regrade latest images: done".to_string(),
        ]
    );
}

#[tokio::test]
async fn image_selector_mismatch_is_a_noop() {
    let fixture = fixture(MockRepo::new().add_file("web.yaml", WEB_MANIFEST.as_bytes().to_vec()));
    add_web_service(&fixture, "acme/web:v1");

    let job = run_release(
        &fixture,
        release_spec(
            ServiceSpec::Id(web_id()),
            ImageSpec::Id("acme/other:v3".parse().unwrap()),
        ),
    )
    .await;

    assert_eq!(job.success, Some(true));
    assert_eq!(
        descriptions(&job),
        vec![
            "I'm going to release image acme/other:v3 to service default/web.",
            "All matching services are already running image acme/other:v3. Nothing to do.",
        ]
    );
    assert!(fixture.repo.pushes().is_empty());
    assert_eq!(fixture.platform.regrade_calls(), 0);
}

#[tokio::test]
async fn partial_batch_failure_marks_job_failed() {
    // Same shape as the web manifest, for services a and b.
    let manifest_a = WEB_MANIFEST.replace("web", "a");
    let manifest_b = WEB_MANIFEST.replace("web", "b");
    let fixture = fixture(
        MockRepo::new()
            .add_file("a.yaml", manifest_a.into_bytes())
            .add_file("b.yaml", manifest_b.into_bytes()),
    );

    let a = ServiceId::new("default", "a");
    let b = ServiceId::new("default", "b");
    for (id, image) in [(&a, "acme/a:v1"), (&b, "acme/b:v1")] {
        fixture.platform.add_service(
            id.clone(),
            "1 running",
            vec![Container {
                name: "app".to_string(),
                image: image.to_string(),
            }],
        );
    }
    for repo in ["acme/a", "acme/b"] {
        fixture.registry.add_images(
            repo,
            &[
                ("v1", Utc.timestamp_opt(1, 0).unwrap()),
                ("v2", Utc.timestamp_opt(2, 0).unwrap()),
            ],
        );
    }
    fixture.platform.fail_regrade(&a, "x");

    let job = run_release(&fixture, release_spec(ServiceSpec::All, ImageSpec::Latest)).await;

    assert_eq!(job.success, Some(false));
    assert!(job.status.starts_with("Failed: "));
    assert!(job.status.contains("default/a: x"));

    let cause = "latest images (to all services)";
    let events_a: Vec<String> = fixture
        .db
        .events_for_service(&a)
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(events_a.last().unwrap(), &format!("Regrade {cause}: failed: x"));

    let events_b: Vec<String> = fixture
        .db
        .events_for_service(&b)
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(events_b.last().unwrap(), &format!("Regrade {cause}: done"));
}

#[tokio::test]
async fn release_without_update_applies_checked_in_definition() {
    let fixture = fixture(MockRepo::new().add_file("web.yaml", WEB_MANIFEST.as_bytes().to_vec()));
    add_web_service(&fixture, "acme/web:v1");

    let job = run_release(
        &fixture,
        release_spec(ServiceSpec::Id(web_id()), ImageSpec::NoChange),
    )
    .await;

    assert_eq!(job.success, Some(true));
    assert_eq!(
        descriptions(&job),
        vec![
            "I'm going to release service default/web using the config from the git repo, \
             without updating it",
            "Clone the config repo.",
            "Load the resource definition file for service default/web",
            "Regrade 1 service(s): default/web.",
        ]
    );

    // No file mutation, no push; the checked-in definition is applied
    // as-is.
    assert!(fixture.repo.pushes().is_empty());
    let applied = fixture.platform.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].new_definition, WEB_MANIFEST.as_bytes());

    let events: Vec<String> = fixture
        .db
        .events_for_service(&web_id())
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(events.last().unwrap(), "Regrade without update: done");
}

#[tokio::test]
async fn excluded_service_is_ignored() {
    let fixture = fixture(MockRepo::new().add_file("web.yaml", WEB_MANIFEST.as_bytes().to_vec()));
    add_web_service(&fixture, "acme/web:v1");

    let mut spec = release_spec(ServiceSpec::Id(web_id()), ImageSpec::Latest);
    spec.excludes = vec![web_id()];
    let job = run_release(&fixture, spec).await;

    assert_eq!(job.success, Some(true));
    assert_eq!(
        descriptions(&job),
        vec![
            "I'm going to release the latest images(s) for service default/web.",
            "Specified service default/web is excluded; ignoring.",
        ]
    );
    assert_eq!(fixture.platform.regrade_calls(), 0);
}

#[tokio::test]
async fn missing_manifest_is_a_skip_not_an_error() {
    // No manifest files seeded at all.
    let fixture = fixture(MockRepo::new());
    add_web_service(&fixture, "acme/web:v1");

    let job = run_release(
        &fixture,
        release_spec(ServiceSpec::Id(web_id()), ImageSpec::NoChange),
    )
    .await;

    assert_eq!(job.success, Some(true));
    assert!(job
        .log
        .contains(&"no resource definition file found for default/web; skipping".to_string()));

    // The batch then has nothing for the service; history records the
    // miss.
    let events: Vec<String> = fixture
        .db
        .events_for_service(&web_id())
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(
        events.last().unwrap(),
        "Regrade without update: failed: no pod controller in release context; skipping regrade"
    );
}

#[tokio::test]
async fn automator_tick_is_idempotent_for_up_to_date_service() {
    let fixture = fixture(MockRepo::new().add_file("web.yaml", WEB_MANIFEST.as_bytes().to_vec()));
    add_web_service(&fixture, "acme/web:v2");

    fixture.server.automate(&web_id()).unwrap();

    fixture.automator.tick();
    assert_eq!(fixture.jobs.queued(), 1);

    fixture.worker.tick().await;
    assert_eq!(fixture.jobs.queued(), 0);

    // The job completed as a no-op: zero platform writes.
    assert_eq!(fixture.platform.regrade_calls(), 0);
    assert!(fixture.repo.pushes().is_empty());

    // Another round behaves identically.
    fixture.automator.tick();
    fixture.worker.tick().await;
    assert_eq!(fixture.platform.regrade_calls(), 0);
}

#[tokio::test]
async fn list_services_reflects_automation_flag() {
    let fixture = fixture(MockRepo::new());
    add_web_service(&fixture, "acme/web:v1");
    fixture.server.automate(&web_id()).unwrap();

    let services = fixture.server.list_services(Some("default")).await.unwrap();
    assert_eq!(services.len(), 1);
    assert!(services[0].automated);

    fixture.server.deautomate(&web_id()).unwrap();
    let services = fixture.server.list_services(Some("default")).await.unwrap();
    assert!(!services[0].automated);
}
