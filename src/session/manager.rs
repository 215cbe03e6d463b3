// ABOUTME: End-to-end session orchestration — start/stop/clean/enumerate/inspect/usage.
// Grounded in session_lifecycle.rs's SessionLifecycleManager shape (owns a ContainerManager
// and clone manager, exposes create/start/stop/remove/refresh_status), generalized from an
// in-memory HashMap<Uuid, SessionState> to filesystem-plus-runtime reconciliation, since
// each CLI invocation is a fresh process with no cached state to carry forward.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Local;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, ConfigStore, ScadConfig};
use crate::credentials::{CredentialsError, CredentialsProbe};
use crate::git::{CloneError, CloneManager};
use crate::image::{ImageError, ImageBuilder};
use crate::mount::{self, HostContext};
use crate::session::container::{ContainerError, ContainerManager, RuntimeState};
use crate::session::event_log::EventLog;
use crate::session::run::{generate_run_id, RunPaths, RunState};
use crate::session::usage::{self, UsageSummary};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Clone(#[from] CloneError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no session found for '{0}'")]
    UnknownRun(String),
}

impl SessionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::Config(e) => e.exit_code(),
            SessionError::Clone(e) => e.exit_code(),
            SessionError::Credentials(e) => e.exit_code(),
            SessionError::UnknownRun(_) => 2,
            SessionError::Container(_) => 1,
            SessionError::Image(_) => 3,
            SessionError::Io(_) => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub run_id: String,
    pub config: String,
    pub branch: String,
    pub state: RunState,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub summary: SessionSummary,
    pub events: Vec<String>,
    pub clones: Vec<String>,
    pub agent_sessions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectStatus {
    pub running: usize,
    pub stopped: usize,
    pub removed: usize,
    pub cleaned: usize,
    pub total_cost_usd: Option<f64>,
    pub sessions: Vec<SessionSummary>,
}

pub struct SessionManager {
    base_dir: PathBuf,
    config_store: ConfigStore,
    clones: CloneManager,
    containers: ContainerManager,
    images: ImageBuilder,
    credentials: CredentialsProbe,
    events: EventLog,
}

impl SessionManager {
    pub fn new(base_dir: PathBuf) -> Result<Self, SessionError> {
        Ok(Self {
            config_store: ConfigStore::new(&base_dir),
            clones: CloneManager::new(&base_dir),
            containers: ContainerManager::connect()?,
            images: ImageBuilder::connect()?,
            credentials: CredentialsProbe::new(CredentialsProbe::default_path()),
            events: EventLog::new(&base_dir),
            base_dir,
        })
    }

    /// §4.7.1: credentials check -> run-ID generation -> image build -> clone
    /// creation -> mount plan -> container create -> event append. A failure at any
    /// step stops the pipeline before the next one runs.
    pub async fn start(
        &self,
        config_name: &str,
        tag: &str,
        branch: Option<&str>,
        prompt: Option<&str>,
        rebuild: bool,
    ) -> Result<String, SessionError> {
        let config = self.config_store.load(config_name)?;

        let hours_remaining = self.credentials.validate()?;
        if hours_remaining < 1.0 {
            warn!(hours_remaining, "credentials expire in under an hour");
        }

        let resolved_branch = self
            .clones
            .resolve_branch(&config, branch, tag, Local::now())?;
        let run_id = generate_run_id(config_name, tag, Local::now());

        if rebuild {
            self.images.build(&config, |line| info!(build_line = %line)).await?;
        } else {
            self.images.build_if_missing(&config).await?;
        }

        let clone_paths = self
            .clones
            .create_clones(&config, &resolved_branch, &run_id)?;

        let host_context = HostContext {
            base_dir: self.base_dir.clone(),
            gitconfig_path: crate::credentials::gitconfig_default_path(),
            credentials_path: Some(CredentialsProbe::default_path()),
            prompt: prompt.map(str::to_string),
            upstream_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
        };
        let plan = mount::plan(
            &config,
            &run_id,
            &resolved_branch,
            &clone_paths,
            &host_context,
            chrono::Utc::now(),
        );

        let container_name = format!("scad-{run_id}");
        self.containers
            .create(&container_name, &config.image_tag(), &plan)
            .await?;
        self.containers.start(&container_name).await?;

        self.events.append(
            &run_id,
            "start",
            &format!("config={} branch={}", config.name, resolved_branch),
        )?;

        info!(run_id = %run_id, config = %config.name, "started session");
        Ok(run_id)
    }

    /// Stops but does not remove the container.
    pub async fn stop(&self, run_id: &str) -> Result<bool, SessionError> {
        self.validate_run_id(run_id).await?;
        let container_name = format!("scad-{run_id}");
        self.containers.stop(&container_name).await?;
        self.events.append(run_id, "stop", "")?;
        Ok(true)
    }

    /// Idempotent: stop + remove the container if present, then remove the run
    /// directory. The only operation that deletes agent state.
    pub async fn clean(&self, run_id: &str) -> Result<(), SessionError> {
        let container_name = format!("scad-{run_id}");
        match self.containers.stop(&container_name).await {
            Ok(_) | Err(ContainerError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        match self.containers.remove(&container_name).await {
            Ok(_) => {}
            Err(e) => warn!(run_id, error = %e, "clean: container removal step failed"),
        }

        let run_dir = self.base_dir.join("runs").join(run_id);
        if run_dir.exists() {
            std::fs::remove_dir_all(&run_dir)?;
        }
        Ok(())
    }

    pub async fn list_running(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let managed = self.containers.list_managed().await?;
        Ok(managed
            .into_iter()
            .filter(|c| c.state == RuntimeState::Running)
            .map(summary_from_container)
            .collect())
    }

    /// Union of sessions derivable from the runs directory and running containers,
    /// reconciled by run ID with runtime state taking precedence on conflict.
    pub async fn all_sessions(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let managed = self.containers.list_managed().await?;
        let mut by_run_id: BTreeMap<String, SessionSummary> = BTreeMap::new();

        for container in &managed {
            if let Some(run_id) = container.labels.get("runId") {
                by_run_id.insert(run_id.clone(), summary_from_container(container.clone()));
            }
        }

        let runs_dir = self.base_dir.join("runs");
        if runs_dir.exists() {
            for entry in std::fs::read_dir(&runs_dir)?.flatten() {
                let run_id = entry.file_name().to_string_lossy().to_string();
                if by_run_id.contains_key(&run_id) {
                    continue;
                }
                let run_paths = RunPaths::new(&self.base_dir, &run_id);
                let state = if run_paths.has_worktrees() {
                    RunState::Removed
                } else {
                    RunState::Cleaned
                };
                let config = self.events.config_for_run(&run_id)?;
                let branch = self.branch_from_events(&run_id)?;
                by_run_id.insert(
                    run_id.clone(),
                    SessionSummary {
                        run_id,
                        config,
                        branch,
                        state,
                    },
                );
            }
        }

        Ok(by_run_id.into_values().collect())
    }

    pub async fn info(&self, run_id: &str) -> Result<SessionInfo, SessionError> {
        self.validate_run_id(run_id).await?;
        let summary = self
            .all_sessions()
            .await?
            .into_iter()
            .find(|s| s.run_id == run_id)
            .ok_or_else(|| SessionError::UnknownRun(run_id.to_string()))?;

        let events = self
            .events
            .read(run_id)?
            .into_iter()
            .map(|e| format!("{} {} {}", e.timestamp, e.verb, e.details))
            .collect();

        let run_paths = RunPaths::new(&self.base_dir, run_id);
        let clones = run_paths
            .worktrees_dir()
            .read_dir()
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let agent_sessions = count_agent_sessions(&run_paths.claude_dir());

        Ok(SessionInfo {
            summary,
            events,
            clones,
            agent_sessions,
        })
    }

    /// Authoritative from events.log; falls back to the first dash-segment of the
    /// run ID if no `start` event carries a `config=` detail.
    pub fn config_for_run(&self, run_id: &str) -> Result<String, SessionError> {
        Ok(self.events.config_for_run(run_id)?)
    }

    pub async fn usage_for(&self, run_id: &str) -> Option<UsageSummary> {
        let stream_log = self
            .base_dir
            .join("logs")
            .join(format!("{run_id}.stream.jsonl"));
        usage::usage_for(run_id, &stream_log).await
    }

    pub async fn project_status(
        &self,
        config_name: &str,
        include_cost: bool,
    ) -> Result<ProjectStatus, SessionError> {
        let sessions: Vec<SessionSummary> = self
            .all_sessions()
            .await?
            .into_iter()
            .filter(|s| s.config == config_name)
            .collect();

        let mut status = ProjectStatus::default();
        let mut total_cost = 0.0;
        let mut any_cost = false;

        for session in &sessions {
            match session.state {
                RunState::Running => status.running += 1,
                RunState::Stopped => status.stopped += 1,
                RunState::Removed => status.removed += 1,
                RunState::Cleaned => status.cleaned += 1,
            }
            if include_cost {
                if let Some(usage) = self.usage_for(&session.run_id).await {
                    total_cost += usage.cost_usd;
                    any_cost = true;
                }
            }
        }

        status.total_cost_usd = any_cost.then_some(total_cost);
        status.sessions = sessions;
        Ok(status)
    }

    /// Every command that takes a run ID calls this first. Fails with
    /// `UnknownRun` unless either the run directory exists or a container with
    /// the matching name exists.
    pub async fn validate_run_id(&self, run_id: &str) -> Result<(), SessionError> {
        let run_paths = RunPaths::new(&self.base_dir, run_id);
        if run_paths.exists() {
            return Ok(());
        }
        let container_name = format!("scad-{run_id}");
        if self.containers.find_by_name(&container_name).await?.is_some() {
            return Ok(());
        }
        Err(SessionError::UnknownRun(run_id.to_string()))
    }

    pub fn clone_manager(&self) -> &CloneManager {
        &self.clones
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn container_manager(&self) -> &ContainerManager {
        &self.containers
    }

    /// Path to the agent stream log for a run (`<base>/logs/<runId>.stream.jsonl`),
    /// the source `session logs --stream` reads from, per spec.md §6.
    pub fn stream_log_path(&self, run_id: &str) -> std::path::PathBuf {
        self.base_dir.join("logs").join(format!("{run_id}.stream.jsonl"))
    }

    /// Path to the setup-phase capture for a run (`<base>/logs/<runId>.log`),
    /// the source `session logs` (without `--stream`) reads from.
    pub fn setup_log_path(&self, run_id: &str) -> std::path::PathBuf {
        self.base_dir.join("logs").join(format!("{run_id}.log"))
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn load_config(&self, name: &str) -> Result<ScadConfig, SessionError> {
        Ok(self.config_store.load(name)?)
    }

    fn branch_from_events(&self, run_id: &str) -> std::io::Result<String> {
        let records = self.events.read(run_id)?;
        for record in &records {
            if record.verb == "start" {
                if let Some(branch) = record
                    .details
                    .split_whitespace()
                    .find_map(|pair| pair.strip_prefix("branch="))
                {
                    return Ok(branch.to_string());
                }
            }
        }
        Ok(String::new())
    }
}

fn summary_from_container(container: crate::session::container::ManagedContainer) -> SessionSummary {
    let state = if container.state == RuntimeState::Running {
        RunState::Running
    } else {
        RunState::Stopped
    };
    SessionSummary {
        run_id: container
            .labels
            .get("runId")
            .cloned()
            .unwrap_or_else(|| container.name.clone()),
        config: container.labels.get("config").cloned().unwrap_or_default(),
        branch: container.labels.get("branch").cloned().unwrap_or_default(),
        state,
    }
}

fn count_agent_sessions(claude_dir: &std::path::Path) -> usize {
    let projects_dir = claude_dir.join("projects");
    let Ok(entries) = std::fs::read_dir(&projects_dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|dir| {
            std::fs::read_dir(dir.path())
                .map(|inner| {
                    inner
                        .flatten()
                        .filter(|f| f.path().extension().and_then(|e| e.to_str()) == Some("jsonl"))
                        .count()
                })
                .unwrap_or(0)
        })
        .sum()
}
