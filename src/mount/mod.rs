// ABOUTME: Pure composition of the volume map, environment, and labels for a session.
// Grounded in claude_dev.rs::run_container's Vec<(PathBuf, PathBuf)> volume-assembly style
// and original_source/claude_config.py::get_volume_mounts for the agent-specific entries.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{InstructionsMode, ScadConfig};
use crate::timezone::resolve_host_timezone;

pub const CONTAINER_WORKSPACE: &str = "/workspace";
pub const CONTAINER_HOME: &str = "/home/scad";
pub const CREDENTIALS_STAGING_PATH: &str = "/mnt/host-claude-credentials.json";
pub const GITCONFIG_STAGING_PATH: &str = "/mnt/host-gitconfig";

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MountPlan {
    pub volumes: Vec<VolumeMount>,
    pub env: Vec<(String, String)>,
    pub labels: HashMap<String, String>,
}

pub struct HostContext {
    pub base_dir: PathBuf,
    pub gitconfig_path: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
    pub prompt: Option<String>,
    pub upstream_api_key: Option<String>,
}

/// Pure function: `(Config, runId, clone paths, branch, HostContext) -> MountPlan`.
/// Later rules never overwrite earlier ones (composition order matches spec.md §4.6's table).
pub fn plan(
    config: &ScadConfig,
    run_id: &str,
    branch: &str,
    clone_paths: &BTreeMap<String, PathBuf>,
    host: &HostContext,
    started_at: DateTime<Utc>,
) -> MountPlan {
    let mut volumes = Vec::new();

    for (key, repo) in &config.repos {
        if let Some(path) = clone_paths.get(key) {
            volumes.push(VolumeMount {
                host: path.clone(),
                container: format!("{CONTAINER_WORKSPACE}/{key}"),
                read_only: !repo.worktree,
            });
        }
    }

    for mount in &config.mounts {
        volumes.push(VolumeMount {
            host: mount.host.clone(),
            container: mount.container.clone(),
            read_only: false,
        });
    }

    volumes.push(VolumeMount {
        host: host.base_dir.join("logs"),
        container: format!("{CONTAINER_HOME}/.scad-logs"),
        read_only: false,
    });

    if let Some(gitconfig) = &host.gitconfig_path {
        if gitconfig.exists() {
            volumes.push(VolumeMount {
                host: gitconfig.clone(),
                container: GITCONFIG_STAGING_PATH.to_string(),
                read_only: true,
            });
        }
    }

    let run_dir = host.base_dir.join("runs").join(run_id);
    volumes.push(VolumeMount {
        host: run_dir.join("claude"),
        container: format!("{CONTAINER_HOME}/.claude"),
        read_only: false,
    });
    volumes.push(VolumeMount {
        host: run_dir.join("claude.json"),
        container: format!("{CONTAINER_HOME}/.claude.json"),
        read_only: false,
    });

    if let Some(credentials) = &host.credentials_path {
        if credentials.exists() {
            volumes.push(VolumeMount {
                host: credentials.clone(),
                container: CREDENTIALS_STAGING_PATH.to_string(),
                read_only: true,
            });
        }
    }

    if let Some(instructions_path) = resolve_instructions_path(config) {
        volumes.push(VolumeMount {
            host: instructions_path,
            container: format!("{CONTAINER_HOME}/INSTRUCTIONS.md"),
            read_only: true,
        });
    }

    let localtime = Path::new("/etc/localtime");
    if localtime.exists() {
        volumes.push(VolumeMount {
            host: localtime.to_path_buf(),
            container: "/etc/localtime".to_string(),
            read_only: true,
        });
    }

    let mut env = vec![
        ("RUN_ID".to_string(), run_id.to_string()),
        ("TZ".to_string(), resolve_host_timezone()),
        ("CLAUDE_CODE_DISABLE_TELEMETRY".to_string(), "1".to_string()),
        ("DISABLE_TELEMETRY".to_string(), "1".to_string()),
        ("DISABLE_ERROR_REPORTING".to_string(), "1".to_string()),
    ];
    if let Some(prompt) = &host.prompt {
        env.push(("AGENT_PROMPT".to_string(), prompt.clone()));
    }
    if let Some(api_key) = &host.upstream_api_key {
        env.push(("ANTHROPIC_API_KEY".to_string(), api_key.clone()));
    }

    let mut labels = HashMap::new();
    labels.insert("managed".to_string(), "true".to_string());
    labels.insert("config".to_string(), config.name.clone());
    labels.insert("branch".to_string(), branch.to_string());
    labels.insert("runId".to_string(), run_id.to_string());
    labels.insert(
        "started".to_string(),
        started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );

    MountPlan {
        volumes,
        env,
        labels,
    }
}

/// `Auto` looks for `~/CLAUDE.md` on the host (not the workdir repo — the global
/// instructions file is operator-scoped, per original_source/claude_config.py::get_volume_mounts);
/// `Disabled` suppresses the mount entirely; `Explicit(path)` is used verbatim if it exists.
fn resolve_instructions_path(config: &ScadConfig) -> Option<PathBuf> {
    match &config.agent.instructions {
        InstructionsMode::Disabled => None,
        InstructionsMode::Explicit(path) => path.exists().then(|| path.clone()),
        InstructionsMode::Auto => {
            let candidate = dirs::home_dir()?.join("CLAUDE.md");
            candidate.exists().then_some(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn demo_config() -> ScadConfig {
        ScadConfig::parse(
            "demo",
            "name: demo\nrepos:\n  code:\n    path: /tmp/x\n    workdir: true\n",
        )
        .unwrap()
    }

    #[test]
    fn composes_clone_mounts_and_labels() {
        let config = demo_config();
        let tmp = TempDir::new().unwrap();
        let mut clones = BTreeMap::new();
        clones.insert("code".to_string(), tmp.path().join("worktrees/code"));

        let host = HostContext {
            base_dir: tmp.path().to_path_buf(),
            gitconfig_path: None,
            credentials_path: None,
            prompt: Some("work".to_string()),
            upstream_api_key: None,
        };

        let plan = plan(
            &config,
            "demo-t1-Jan01-0000",
            "scad-demo-t1-Jan01-0000",
            &clones,
            &host,
            Utc::now(),
        );

        assert!(plan
            .volumes
            .iter()
            .any(|v| v.container == "/workspace/code" && !v.read_only));
        assert_eq!(plan.labels["config"], "demo");
        assert_eq!(plan.labels["managed"], "true");
        assert!(plan
            .env
            .iter()
            .any(|(k, v)| k == "AGENT_PROMPT" && v == "work"));
    }

    #[test]
    fn direct_mount_repo_is_read_only() {
        let config = ScadConfig::parse(
            "demo",
            "name: demo\nrepos:\n  code:\n    path: /tmp/x\n    workdir: true\n  docs:\n    path: /tmp/docs\n    worktree: false\n",
        )
        .unwrap();
        let tmp = TempDir::new().unwrap();
        let mut clones = BTreeMap::new();
        clones.insert("code".to_string(), tmp.path().join("worktrees/code"));
        clones.insert("docs".to_string(), PathBuf::from("/tmp/docs"));

        let host = HostContext {
            base_dir: tmp.path().to_path_buf(),
            gitconfig_path: None,
            credentials_path: None,
            prompt: None,
            upstream_api_key: None,
        };

        let plan = plan(
            &config,
            "demo-t1-Jan01-0000",
            "scad-demo-t1-Jan01-0000",
            &clones,
            &host,
            Utc::now(),
        );

        let docs_mount = plan
            .volumes
            .iter()
            .find(|v| v.container == "/workspace/docs")
            .unwrap();
        assert!(docs_mount.read_only);
    }
}
