//! `bollard`-backed implementation of [`RuntimeClient`].

use super::client::RuntimeClient;
use super::types::{canonicalize_name, ContainerInspect, ContainerSummary, RuntimeEvent, RuntimeEventKind};
use crate::error::WatchdogError;
use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, RestartContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

pub struct BollardRuntimeClient {
    docker: Docker,
}

impl BollardRuntimeClient {
    pub fn connect(socket_path: &str) -> Result<Self, WatchdogError> {
        let docker = Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| WatchdogError::RuntimeTransient(format!("connecting to docker: {e}")))?;
        Ok(Self { docker })
    }

    fn name_filter(names: &[String]) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        if !names.is_empty() {
            filters.insert("name".to_string(), names.to_vec());
        }
        filters
    }
}

#[async_trait]
impl RuntimeClient for BollardRuntimeClient {
    async fn list(
        &self,
        names: &[String],
        deadline: Duration,
    ) -> Result<Vec<ContainerSummary>, WatchdogError> {
        let options = ListContainersOptions {
            all: true,
            filters: Self::name_filter(names),
            ..Default::default()
        };
        let containers = tokio::time::timeout(deadline, self.docker.list_containers(Some(options)))
            .await
            .map_err(|_| WatchdogError::RuntimeTransient("list containers timed out".into()))?
            .map_err(|e| WatchdogError::RuntimeTransient(format!("listing containers: {e}")))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let name = c.names.unwrap_or_default().into_iter().next()?;
                Some(ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    name: canonicalize_name(&name),
                    image: c.image.unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                    status: c.status.unwrap_or_default(),
                    health: c
                        .status
                        .as_deref()
                        .and_then(extract_health_from_status),
                })
            })
            .collect())
    }

    async fn list_all(&self, deadline: Duration) -> Result<Vec<ContainerSummary>, WatchdogError> {
        self.list(&[], deadline).await
    }

    async fn inspect(
        &self,
        name: &str,
        deadline: Duration,
    ) -> Result<ContainerInspect, WatchdogError> {
        let response = tokio::time::timeout(
            deadline,
            self.docker
                .inspect_container(name, Some(InspectContainerOptions { size: false })),
        )
        .await
        .map_err(|_| WatchdogError::RuntimeTransient(format!("inspecting {name} timed out")))?
        .map_err(|e| WatchdogError::RuntimeTransient(format!("inspecting {name}: {e}")))?;

        let state = response.state.clone().unwrap_or_default();
        let health = state
            .health
            .as_ref()
            .and_then(|h| h.status)
            .map(|s| format!("{s:?}").to_lowercase());

        Ok(ContainerInspect {
            id: response.id.unwrap_or_default(),
            name: response
                .name
                .map(|n| canonicalize_name(&n))
                .unwrap_or_else(|| name.to_string()),
            image: response.config.and_then(|c| c.image).unwrap_or_default(),
            state: state
                .status
                .map(|s| format!("{s:?}").to_lowercase())
                .unwrap_or_default(),
            status: state.error.clone().unwrap_or_default(),
            health,
            started_at: state
                .started_at
                .as_deref()
                .and_then(crate::utils::time::parse_runtime_timestamp),
            finished_at: state
                .finished_at
                .as_deref()
                .and_then(crate::utils::time::parse_runtime_timestamp),
            exit_code: state.exit_code,
            restart_count: response.restart_count.unwrap_or(0),
        })
    }

    async fn restart(&self, name: &str, timeout: Duration) -> Result<(), WatchdogError> {
        let options = RestartContainerOptions {
            t: timeout.as_secs() as i64,
        };
        self.docker
            .restart_container(name, Some(options))
            .await
            .map_err(|e| WatchdogError::RuntimeTransient(format!("restarting {name}: {e}")))
    }

    async fn stop(&self, name: &str, timeout: Duration) -> Result<(), WatchdogError> {
        let options = StopContainerOptions {
            t: timeout.as_secs() as i64,
        };
        self.docker
            .stop_container(name, Some(options))
            .await
            .map_err(|e| WatchdogError::RuntimeTransient(format!("stopping {name}: {e}")))
    }

    async fn start(&self, name: &str, deadline: Duration) -> Result<(), WatchdogError> {
        tokio::time::timeout(
            deadline,
            self.docker
                .start_container(name, None::<StartContainerOptions<String>>),
        )
        .await
        .map_err(|_| WatchdogError::RuntimeTransient(format!("starting {name} timed out")))?
        .map_err(|e| WatchdogError::RuntimeTransient(format!("starting {name}: {e}")))
    }

    fn events(&self, names: &[String]) -> BoxStream<'static, Result<RuntimeEvent, WatchdogError>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        if !names.is_empty() {
            filters.insert("container".to_string(), names.to_vec());
        }
        let options = EventsOptions::<String> {
            since: None,
            until: None,
            filters,
        };

        self.docker
            .events(Some(options))
            .filter_map(|item| async move {
                match item {
                    Ok(event) => {
                        let action = event.action.unwrap_or_default();
                        let kind = RuntimeEventKind::from_action(&action)?;
                        let container_name = event
                            .actor
                            .and_then(|a| a.attributes)
                            .and_then(|attrs| attrs.get("name").cloned())
                            .unwrap_or_default();
                        Some(Ok(RuntimeEvent {
                            kind,
                            container_name: canonicalize_name(&container_name),
                        }))
                    }
                    Err(e) => Some(Err(WatchdogError::RuntimeTransient(format!(
                        "event stream: {e}"
                    )))),
                }
            })
            .boxed()
    }
}

/// Docker's list API reports health only embedded in the human status
/// string, e.g. `Up 3 minutes (healthy)`.
fn extract_health_from_status(status: &str) -> Option<String> {
    let start = status.rfind('(')?;
    let end = status.rfind(')')?;
    if end <= start {
        return None;
    }
    let candidate = &status[start + 1..end];
    matches!(candidate, "healthy" | "unhealthy" | "starting").then(|| candidate.to_string())
}
