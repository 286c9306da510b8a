// ABOUTME: Control plane backed by a Docker-compatible container engine.
// ABOUTME: A cluster is an engine network; a service is a labelled group of containers.

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, ContainerSummary, EndpointSettings, HostConfig, NetworkingConfig,
    RestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, InspectNetworkOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use super::{ControlPlane, DeployError, DeploymentRequest, DeploymentStatus};
use crate::types::{ClusterName, DeploymentHandle, ServiceName, TaskId};

pub const LABEL_MANAGED: &str = "deploy-pipeline.managed";
pub const LABEL_SERVICE: &str = "deploy-pipeline.service";
pub const LABEL_CLUSTER: &str = "deploy-pipeline.cluster";
pub const LABEL_REVISION: &str = "deploy-pipeline.revision";
pub const LABEL_DEPLOYMENT: &str = "deploy-pipeline.deployment";
pub const LABEL_DEPLOYED_BY: &str = "deploy-pipeline.deployed-by";

/// Limits and behaviour of the engine control plane.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Largest desired count accepted for one service.
    pub max_tasks: u32,
    /// Whether a service with no existing tasks may be created.
    pub create_services: bool,
    /// Grace period when stopping tasks of earlier revisions.
    pub stop_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_tasks: 32,
            create_services: true,
            stop_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
struct Submission {
    service: ServiceName,
    cluster: ClusterName,
    desired_count: u32,
}

pub struct EngineControlPlane {
    client: Docker,
    settings: EngineSettings,
    submissions: Mutex<HashMap<DeploymentHandle, Submission>>,
}

impl EngineControlPlane {
    pub fn new(client: Docker, settings: EngineSettings) -> Self {
        Self {
            client,
            settings,
            submissions: Mutex::new(HashMap::new()),
        }
    }

    async fn ensure_cluster(&self, cluster: &ClusterName) -> Result<(), DeployError> {
        match self
            .client
            .inspect_network(cluster.as_str(), None::<InspectNetworkOptions>)
            .await
        {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(DeployError::ClusterNotFound(cluster.to_string())),
            Err(e) => Err(DeployError::ControlPlaneUnavailable(e.to_string())),
        }
    }

    async fn service_tasks(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> Result<Vec<ContainerSummary>, DeployError> {
        let labels = [
            format!("{}=true", LABEL_MANAGED),
            format!("{}={}", LABEL_SERVICE, service),
            format!("{}={}", LABEL_CLUSTER, cluster),
        ];
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("label".to_string(), labels.to_vec());

        let opts = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        self.client
            .list_containers(Some(opts))
            .await
            .map_err(|e| DeployError::ControlPlaneUnavailable(e.to_string()))
    }

    fn submission(&self, handle: &DeploymentHandle) -> Result<Submission, DeployError> {
        self.submissions
            .lock()
            .get(handle)
            .cloned()
            .ok_or_else(|| DeployError::ServiceNotFound(format!("no deployment {}", handle)))
    }

    fn task_body(&self, request: &DeploymentRequest, handle: &DeploymentHandle) -> ContainerCreateBody {
        let revision = &request.revision;
        let resources = revision.resources();

        let env: Vec<String> = revision
            .env()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mut labels: HashMap<String, String> = revision
            .labels()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.insert(LABEL_MANAGED.to_string(), "true".to_string());
        labels.insert(LABEL_SERVICE.to_string(), request.service.to_string());
        labels.insert(LABEL_CLUSTER.to_string(), request.cluster.to_string());
        labels.insert(LABEL_REVISION.to_string(), revision.id().into_inner());
        labels.insert(LABEL_DEPLOYMENT.to_string(), handle.to_string());
        labels.insert(LABEL_DEPLOYED_BY.to_string(), deployed_by());

        let host_config = HostConfig {
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            memory: resources.memory_bytes.map(|m| m as i64),
            nano_cpus: resources.nano_cpus(),
            network_mode: Some(request.cluster.to_string()),
            ..Default::default()
        };

        let mut endpoints: HashMap<String, EndpointSettings> = HashMap::new();
        endpoints.insert(
            request.cluster.to_string(),
            EndpointSettings {
                aliases: Some(vec![request.service.to_string()]),
                ..Default::default()
            },
        );

        ContainerCreateBody {
            image: Some(revision.pinned_image()),
            env: if env.is_empty() { None } else { Some(env) },
            labels: Some(labels),
            host_config: Some(host_config),
            networking_config: Some(NetworkingConfig {
                endpoints_config: Some(endpoints),
            }),
            stop_timeout: Some(self.settings.stop_timeout.as_secs() as i64),
            ..Default::default()
        }
    }

    async fn start_task(
        &self,
        name: &str,
        body: ContainerCreateBody,
    ) -> Result<TaskId, (Option<TaskId>, bollard::errors::Error)> {
        let opts = CreateContainerOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let created = self
            .client
            .create_container(Some(opts), body)
            .await
            .map_err(|e| (None, e))?;
        let task = TaskId::new(created.id);

        self.client
            .start_container(task.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(|e| (Some(task.clone()), e))?;

        Ok(task)
    }

    /// Best-effort cleanup of a partially started revision.
    async fn discard(&self, tasks: &[TaskId]) {
        for task in tasks {
            let opts = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = self.client.remove_container(task.as_str(), Some(opts)).await {
                tracing::warn!(task = %task.short(12), "failed to remove task: {}", e);
            }
        }
    }
}

#[async_trait]
impl ControlPlane for EngineControlPlane {
    async fn submit_revision(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentHandle, DeployError> {
        if request.desired_count > self.settings.max_tasks {
            return Err(DeployError::QuotaExceeded {
                requested: request.desired_count,
                limit: self.settings.max_tasks,
            });
        }

        self.ensure_cluster(&request.cluster).await?;

        let existing = self.service_tasks(&request.cluster, &request.service).await?;
        if existing.is_empty() && !self.settings.create_services {
            return Err(DeployError::ServiceNotFound(request.service.to_string()));
        }

        let handle = new_handle(&request.service, request.revision.id().as_str());
        let body = self.task_body(request, &handle);

        let mut started: Vec<TaskId> = Vec::new();
        for index in 0..request.desired_count {
            let name = format!("{}-{}", handle, index);
            match self.start_task(&name, body.clone()).await {
                Ok(task) => {
                    tracing::debug!(task = %task.short(12), name = %name, "task started");
                    started.push(task);
                }
                Err((partial, e)) => {
                    started.extend(partial);
                    self.discard(&started).await;
                    return Err(map_submit_error(e));
                }
            }
        }

        self.submissions.lock().insert(
            handle.clone(),
            Submission {
                service: request.service.clone(),
                cluster: request.cluster.clone(),
                desired_count: request.desired_count,
            },
        );

        Ok(handle)
    }

    async fn get_status(
        &self,
        handle: &DeploymentHandle,
    ) -> Result<DeploymentStatus, DeployError> {
        let submission = self.submission(handle)?;
        let tasks = self
            .service_tasks(&submission.cluster, &submission.service)
            .await?;

        let snapshots: Vec<TaskSnapshot> = tasks.into_iter().map(TaskSnapshot::from).collect();
        Ok(summarize(handle, submission.desired_count, &snapshots))
    }

    async fn retire_previous(&self, handle: &DeploymentHandle) -> Result<usize, DeployError> {
        let submission = self.submission(handle)?;
        let tasks = self
            .service_tasks(&submission.cluster, &submission.service)
            .await?;

        let previous: Vec<TaskSnapshot> = tasks
            .into_iter()
            .map(TaskSnapshot::from)
            .filter(|t| t.is_running() && !t.belongs_to(handle))
            .collect();

        for task in &previous {
            let opts = StopContainerOptions {
                t: Some(self.settings.stop_timeout.as_secs() as i32),
                signal: None,
            };
            self.client
                .stop_container(&task.id, Some(opts))
                .await
                .map_err(|e| DeployError::ControlPlaneUnavailable(e.to_string()))?;
        }

        if !previous.is_empty() {
            tracing::info!(handle = %handle, stopped = previous.len(), "retired previous tasks");
        }
        Ok(previous.len())
    }
}

fn map_submit_error(e: bollard::errors::Error) -> DeployError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 || *status_code == 409 || *status_code == 400 => {
            DeployError::SubmissionRejected(message.clone())
        }
        _ => DeployError::ControlPlaneUnavailable(e.to_string()),
    }
}

fn deployed_by() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// `<service>-<revision prefix>-<submission stamp>`, unique per submission.
fn new_handle(service: &ServiceName, revision: &str) -> DeploymentHandle {
    let stamp = format!("{:x}", Utc::now().timestamp_millis());
    let revision = revision.get(..8).unwrap_or(revision);
    DeploymentHandle::new(format!("{}-{}-{}", service, revision, stamp))
}

/// What the status calculation needs from a container listing.
#[derive(Debug, Clone, Default)]
struct TaskSnapshot {
    id: String,
    deployment: Option<String>,
    state: String,
    status: String,
    created: Option<i64>,
}

impl From<ContainerSummary> for TaskSnapshot {
    fn from(c: ContainerSummary) -> Self {
        let deployment = c
            .labels
            .as_ref()
            .and_then(|labels| labels.get(LABEL_DEPLOYMENT).cloned());
        Self {
            id: c.id.unwrap_or_default(),
            deployment,
            state: c
                .state
                .map(|s| format!("{:?}", s).to_lowercase())
                .unwrap_or_default(),
            status: c.status.unwrap_or_default(),
            created: c.created,
        }
    }
}

impl TaskSnapshot {
    fn belongs_to(&self, handle: &DeploymentHandle) -> bool {
        self.deployment.as_deref() == Some(handle.as_str())
    }

    fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Running with no failing or pending health check.
    fn is_healthy(&self) -> bool {
        self.is_running()
            && !self.status.contains("(unhealthy)")
            && !self.status.contains("health: starting")
    }

    /// Stopped for good: the restart policy will not bring it back.
    fn is_finished(&self) -> bool {
        self.state == "exited" || self.state == "dead"
    }
}

fn summarize(handle: &DeploymentHandle, desired: u32, tasks: &[TaskSnapshot]) -> DeploymentStatus {
    let (current, previous): (Vec<&TaskSnapshot>, Vec<&TaskSnapshot>) =
        tasks.iter().partition(|t| t.belongs_to(handle));

    let count = |pred: fn(&TaskSnapshot) -> bool, set: &[&TaskSnapshot]| {
        set.iter().filter(|t| pred(t)).count() as u32
    };

    let last_event_timestamp = current
        .iter()
        .filter_map(|t| t.created)
        .max()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    DeploymentStatus {
        desired_count: desired,
        running_count: count(TaskSnapshot::is_running, &current),
        healthy_count: count(TaskSnapshot::is_healthy, &current),
        previous_running_count: count(TaskSnapshot::is_running, &previous),
        rolled_back: false,
        last_event_timestamp,
        terminal: !current.is_empty() && current.iter().all(|t| t.is_finished()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(deployment: &str, state: &str, status: &str) -> TaskSnapshot {
        TaskSnapshot {
            id: format!("{}-{}", deployment, state),
            deployment: Some(deployment.to_string()),
            state: state.to_string(),
            status: status.to_string(),
            created: Some(1_700_000_000),
        }
    }

    #[test]
    fn counts_only_tasks_of_this_deployment() {
        let handle = DeploymentHandle::new("bookmanager-abc-1");
        let tasks = vec![
            task("bookmanager-abc-1", "running", "Up 3 seconds (healthy)"),
            task("bookmanager-abc-1", "running", "Up 2 seconds (health: starting)"),
            task("bookmanager-old-0", "running", "Up 2 hours"),
            task("bookmanager-old-0", "running", "Up 2 hours"),
        ];

        let status = summarize(&handle, 2, &tasks);
        assert_eq!(status.running_count, 2);
        assert_eq!(status.healthy_count, 1);
        assert_eq!(status.previous_running_count, 2);
        assert!(!status.converged());
        assert!(!status.terminal);
        assert!(status.last_event_timestamp.is_some());
    }

    #[test]
    fn tasks_without_health_check_count_as_healthy() {
        let handle = DeploymentHandle::new("h1");
        let tasks = vec![task("h1", "running", "Up 5 seconds")];
        assert!(summarize(&handle, 1, &tasks).converged());
    }

    #[test]
    fn all_exited_is_terminal() {
        let handle = DeploymentHandle::new("h1");
        let tasks = vec![
            task("h1", "exited", "Exited (1) 3 seconds ago"),
            task("h1", "dead", ""),
        ];
        let status = summarize(&handle, 2, &tasks);
        assert!(status.terminal);
        assert_eq!(status.running_count, 0);
    }

    #[test]
    fn no_tasks_is_not_terminal() {
        let status = summarize(&DeploymentHandle::new("h1"), 1, &[]);
        assert!(!status.terminal);
        assert_eq!(status.last_event_timestamp, None);
    }

    #[test]
    fn handle_embeds_service_and_revision_prefix() {
        let service = ServiceName::new("bookmanager").unwrap();
        let handle = new_handle(&service, "0123456789ab");
        assert!(handle.as_str().starts_with("bookmanager-01234567-"));
    }

    #[test]
    fn conflict_is_a_rejection() {
        let err = map_submit_error(bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "name in use".to_string(),
        });
        assert_eq!(err, DeployError::SubmissionRejected("name in use".to_string()));
    }
}
