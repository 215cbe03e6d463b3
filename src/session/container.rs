// ABOUTME: Bollard adapter for managed-session containers — create/start/stop/remove/inspect/exec.
// Grounded on the teacher's container_manager.rs, generalized from per-session port/volume
// config to the spec's mount/env/label plan and the `managed=true` label convention.

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerSummary, HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures_util::stream::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::mount::MountPlan;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("container '{0}' already exists")]
    AlreadyExists(String),
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("container not running: {0}")]
    NotRunning(String),
    #[error("exec failed: {0}")]
    ExecFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Running,
    Exited,
    Other,
}

#[derive(Debug, Clone)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    pub state: RuntimeState,
    pub labels: HashMap<String, String>,
    pub image_id: String,
}

pub struct ContainerManager {
    docker: Docker,
}

impl ContainerManager {
    pub fn connect() -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub async fn create(
        &self,
        name: &str,
        image: &str,
        plan: &MountPlan,
    ) -> Result<String, ContainerError> {
        if self.find_by_name(name).await?.is_some() {
            return Err(ContainerError::AlreadyExists(name.to_string()));
        }

        let mounts: Vec<Mount> = plan
            .volumes
            .iter()
            .map(|v| Mount {
                source: Some(v.host.to_string_lossy().to_string()),
                target: Some(v.container.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(v.read_only),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            mounts: Some(mounts),
            auto_remove: Some(false),
            ..Default::default()
        };

        let env: Vec<String> = plan
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let config = Config {
            image: Some(image.to_string()),
            env: Some(env),
            labels: Some(plan.labels.clone()),
            host_config: Some(host_config),
            tty: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        info!(container = name, id = %response.id, "created managed container");
        Ok(response.id)
    }

    pub async fn start(&self, name_or_id: &str) -> Result<(), ContainerError> {
        self.docker
            .start_container(name_or_id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    /// 10-second grace period before SIGKILL, per spec.md §5.
    pub async fn stop(&self, name_or_id: &str) -> Result<(), ContainerError> {
        match self
            .docker
            .stop_container(name_or_id, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!(container = name_or_id, "already stopped");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::NotFound(name_or_id.to_string())),
            Err(e) => Err(ContainerError::Docker(e)),
        }
    }

    pub async fn remove(&self, name_or_id: &str) -> Result<(), ContainerError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(name_or_id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(container = name_or_id, "already removed");
                Ok(())
            }
            Err(e) => Err(ContainerError::Docker(e)),
        }
    }

    pub async fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ManagedContainer>, ContainerError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![format!("^/{name}$")]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(containers.into_iter().find_map(summary_to_managed))
    }

    /// All containers carrying `managed=true`, regardless of run-time state.
    pub async fn list_managed(&self) -> Result<Vec<ManagedContainer>, ContainerError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec!["managed=true".to_string()]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(containers.into_iter().filter_map(summary_to_managed).collect())
    }

    pub async fn logs(
        &self,
        name_or_id: &str,
        tail: Option<u64>,
    ) -> Result<Vec<String>, ContainerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.map(|n| n.to_string()).unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let mut stream = self.docker.logs(name_or_id, Some(options));
        let mut lines = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    if let Ok(line) = String::from_utf8(message.to_vec()) {
                        lines.push(line.trim_end().to_string());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(container = name_or_id, error = %e, "error reading logs");
                    break;
                }
            }
        }
        Ok(lines)
    }

    /// Like [`Self::logs`] but streams lines to `on_line` as they arrive and keeps
    /// reading until the container stops (or the daemon closes the log stream).
    /// Backs `session logs -f`.
    pub async fn logs_follow(
        &self,
        name_or_id: &str,
        tail: Option<u64>,
        mut on_line: impl FnMut(&str),
    ) -> Result<(), ContainerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            tail: tail.map(|n| n.to_string()).unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let mut stream = self.docker.logs(name_or_id, Some(options));
        while let Some(item) = stream.next().await {
            match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    if let Ok(line) = String::from_utf8(message.to_vec()) {
                        on_line(line.trim_end());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(container = name_or_id, error = %e, "error following logs");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Runs a command inside a running container and returns its combined output.
    /// Used by the credentials refresh exec and any future diagnostics.
    pub async fn exec(
        &self,
        name_or_id: &str,
        cmd: Vec<&str>,
    ) -> Result<String, ContainerError> {
        let managed = self
            .find_by_name(name_or_id)
            .await?
            .ok_or_else(|| ContainerError::NotFound(name_or_id.to_string()))?;
        if managed.state != RuntimeState::Running {
            return Err(ContainerError::NotRunning(name_or_id.to_string()));
        }

        let exec = self
            .docker
            .create_exec(
                name_or_id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = String::new();
        if let StartExecResults::Attached { mut output: stream, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(Ok(msg)) = stream.next().await {
                output.push_str(&msg.to_string());
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        if inspect.exit_code.unwrap_or(0) != 0 {
            return Err(ContainerError::ExecFailed(output));
        }
        Ok(output)
    }

    pub async fn inspect_state(
        &self,
        name_or_id: &str,
    ) -> Result<Option<RuntimeState>, ContainerError> {
        Ok(self.find_by_name(name_or_id).await?.map(|c| c.state))
    }
}

fn summary_to_managed(summary: ContainerSummary) -> Option<ManagedContainer> {
    let id = summary.id?;
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
    let state = match summary.state.as_deref() {
        Some("running") => RuntimeState::Running,
        Some("exited") | Some("dead") => RuntimeState::Exited,
        _ => RuntimeState::Other,
    };
    let labels = summary.labels.unwrap_or_default();
    let image_id = summary.image_id.unwrap_or_default();
    Some(ManagedContainer {
        id,
        name,
        state,
        labels,
        image_id,
    })
}
