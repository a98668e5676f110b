//! Release plans: printable, inspectable sequences of actions.

use serde::{Deserialize, Serialize};

use slipway_id::{ImageId, ServiceId};

/// One container image change within a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRegrade {
    pub container: String,
    pub current: ImageId,
    pub target: ImageId,
}

/// What an action does when executed. `Notice` actions carry their
/// whole meaning in the description and execute as no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Notice,
    CloneRepo,
    FindWorkload {
        service: ServiceId,
    },
    UpdateWorkload {
        service: ServiceId,
        regrades: Vec<ContainerRegrade>,
    },
    CommitAndPush {
        message: String,
    },
    RegradeServices {
        services: Vec<ServiceId>,
        cause: String,
    },
}

/// One step of a release plan. The description is written at planning
/// time; the result is filled in by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAction {
    pub description: String,
    pub kind: ActionKind,
    pub result: Option<String>,
}

impl ReleaseAction {
    fn new(description: String, kind: ActionKind) -> Self {
        Self {
            description,
            kind,
            result: None,
        }
    }

    /// An informational entry; executes as a no-op.
    pub fn notice(description: impl Into<String>) -> Self {
        Self::new(description.into(), ActionKind::Notice)
    }

    /// Clone the manifest repository into fresh scratch space.
    pub fn clone_repo() -> Self {
        Self::new("Clone the config repo.".to_string(), ActionKind::CloneRepo)
    }

    /// Load a service's resource definition into the release context
    /// without changing it.
    pub fn find_workload(service: ServiceId) -> Self {
        Self::new(
            format!("Load the resource definition file for service {service}"),
            ActionKind::FindWorkload { service },
        )
    }

    /// Rewrite a service's resource definition for the given regrades.
    pub fn update_workload(service: ServiceId, regrades: Vec<ContainerRegrade>) -> Self {
        let changes: Vec<String> = regrades
            .iter()
            .map(|r| format!("{} ({} -> {})", r.container, r.current, r.target))
            .collect();
        Self::new(
            format!(
                "Update {} images(s) in the resource definition file for {}: {}.",
                regrades.len(),
                service,
                changes.join(", ")
            ),
            ActionKind::UpdateWorkload { service, regrades },
        )
    }

    /// Commit the working copy and push it.
    pub fn commit_and_push(message: impl Into<String>) -> Self {
        Self::new(
            "Commit and push the config repo.".to_string(),
            ActionKind::CommitAndPush {
                message: message.into(),
            },
        )
    }

    /// Submit the definitions gathered in the release context as one
    /// batch regrade.
    pub fn regrade_services(services: Vec<ServiceId>, cause: impl Into<String>) -> Self {
        let names: Vec<String> = services.iter().map(ToString::to_string).collect();
        Self::new(
            format!(
                "Regrade {} service(s): {}.",
                services.len(),
                names.join(", ")
            ),
            ActionKind::RegradeServices {
                services,
                cause: cause.into(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_workload_description() {
        let service = ServiceId::new("default", "web");
        let regrades = vec![ContainerRegrade {
            container: "app".to_string(),
            current: ImageId::parse("acme/web:v1").unwrap(),
            target: ImageId::parse("acme/web:v2").unwrap(),
        }];
        let action = ReleaseAction::update_workload(service, regrades);
        assert_eq!(
            action.description,
            "Update 1 images(s) in the resource definition file for default/web: \
             app (acme/web:v1 -> acme/web:v2)."
        );
    }

    #[test]
    fn test_regrade_services_description() {
        let action = ReleaseAction::regrade_services(
            vec![
                ServiceId::new("default", "a"),
                ServiceId::new("default", "b"),
            ],
            "latest images",
        );
        assert_eq!(
            action.description,
            "Regrade 2 service(s): default/a, default/b."
        );
    }

    #[test]
    fn test_plan_roundtrips_as_json() {
        let action = ReleaseAction::find_workload(ServiceId::new("default", "web"));
        let json = serde_json::to_string(&action).unwrap();
        let parsed: ReleaseAction = serde_json::from_str(&json).unwrap();
        assert_eq!(action, parsed);
    }
}
