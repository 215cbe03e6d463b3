// ABOUTME: Project configuration model — a named record mapping repos, mounts, and agent
// settings into a buildable container image. Validation enforces the workdir-uniqueness
// invariant on every load.

pub mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::ConfigStore;

pub const SCAD_DEFAULT_PLUGINS: &[&str] = &[
    "superpowers@claude-plugins-official",
    "commit-commands@claude-plugins-official",
    "pyright-lsp@claude-plugins-official",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config '{0}' not found")]
    NotFound(String),

    #[error("config '{0}' is invalid: {1}")]
    Invalid(String, String),

    #[error("config name '{0}' is already taken")]
    NameTaken(String),

    #[error("exactly one repo must have workdir=true, found {0}")]
    WorkdirCount(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Exit code per spec.md §7: ConfigNotFound/ConfigInvalid/ConfigNameTaken -> 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::NotFound(_)
            | ConfigError::Invalid(_, _)
            | ConfigError::NameTaken(_)
            | ConfigError::WorkdirCount(_) => 2,
            ConfigError::Io(_) | ConfigError::Yaml(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    #[default]
    Default,
    BypassAll,
}

/// Three-way sum for the global instructions file, per DESIGN NOTES §9:
/// "Dynamic config objects -> tagged schema". Not an overloaded string/bool/null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionsMode {
    Auto,
    Disabled,
    Explicit(PathBuf),
}

impl Default for InstructionsMode {
    fn default() -> Self {
        InstructionsMode::Auto
    }
}

// serde can't derive an externally-tagged enum over {null, false, string} directly,
// so InstructionsMode round-trips through a small untagged shadow type.
impl Serialize for InstructionsMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            InstructionsMode::Auto => serializer.serialize_none(),
            InstructionsMode::Disabled => serializer.serialize_bool(false),
            InstructionsMode::Explicit(path) => {
                serializer.serialize_str(&path.to_string_lossy())
            }
        }
    }
}

impl<'de> Deserialize<'de> for InstructionsMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shadow {
            Bool(bool),
            Path(String),
            Null,
        }

        Ok(match Option::<Shadow>::deserialize(deserializer)? {
            None | Some(Shadow::Null) => InstructionsMode::Auto,
            Some(Shadow::Bool(false)) => InstructionsMode::Disabled,
            Some(Shadow::Bool(true)) => InstructionsMode::Auto,
            Some(Shadow::Path(p)) => InstructionsMode::Explicit(PathBuf::from(p)),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub permission_mode: PermissionMode,
    #[serde(default)]
    pub additional_flags: Option<String>,
    #[serde(default, alias = "claude_md")]
    pub instructions: InstructionsMode,
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,
}

fn default_plugins() -> Vec<String> {
    SCAD_DEFAULT_PLUGINS.iter().map(|s| s.to_string()).collect()
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            permission_mode: PermissionMode::default(),
            additional_flags: None,
            instructions: InstructionsMode::default(),
            plugins: default_plugins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub workdir: bool,
    #[serde(default, alias = "add_dir")]
    pub add_dir: bool,
    #[serde(default = "default_true")]
    pub worktree: bool,
    #[serde(default)]
    pub focus: Option<String>,
}

fn default_true() -> bool {
    true
}

impl RepoSpec {
    pub fn resolved_path(&self) -> PathBuf {
        shellexpand_path(&self.path)
    }
}

fn shellexpand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSpec {
    pub host: PathBuf,
    pub container: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonSpec {
    #[serde(default = "default_python_version")]
    pub version: String,
    #[serde(default)]
    pub requirements: Option<String>,
}

fn default_python_version() -> String {
    "3.11".to_string()
}

impl Default for PythonSpec {
    fn default() -> Self {
        Self {
            version: default_python_version(),
            requirements: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScadConfig {
    pub name: String,
    pub repos: BTreeMap<String, RepoSpec>,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    #[serde(default)]
    pub apt_packages: Vec<String>,
    #[serde(default)]
    pub python: PythonSpec,
    #[serde(default, alias = "claude")]
    pub agent: AgentSpec,
}

impl ScadConfig {
    /// Parses and validates a config document. The workdir-uniqueness invariant
    /// is enforced here so every caller (load, register) gets it for free.
    pub fn parse(name: &str, yaml: &str) -> Result<Self, ConfigError> {
        let mut config: ScadConfig = serde_yaml::from_str(yaml)?;
        if config.name.is_empty() {
            config.name = name.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let workdirs = self.repos.values().filter(|r| r.workdir).count();
        if workdirs != 1 {
            return Err(ConfigError::WorkdirCount(workdirs));
        }
        Ok(())
    }

    /// The single repo key marked workdir=true. Panics only if `validate` was
    /// never called; every load path calls it first.
    pub fn workdir_key(&self) -> &str {
        self.repos
            .iter()
            .find(|(_, r)| r.workdir)
            .map(|(k, _)| k.as_str())
            .expect("validate() guarantees exactly one workdir repo")
    }

    pub fn base_image(&self) -> String {
        format!("python:{}-slim", self.python.version)
    }

    pub fn image_tag(&self) -> String {
        format!("scad-{}", self.name)
    }
}

pub const CONFIG_TEMPLATE: &str = r#"# scad config: {name}
# Edit this file, then run: scad build {name}

name: {name}

repos:
  # At least one repo must have workdir: true
  code:
    path: ~/path/to/your/repo
    workdir: true
    # add_dir: false    # add to the agent's context with --add-dir
    # worktree: true    # create local clone (false = direct mount)
    # focus: docs/      # subdir for context prompt

# mounts:                # additional host paths to mount
#   - host: ~/data
#     container: /data

# apt_packages: []        # extra system packages

python:
  version: "3.11"
  # requirements: requirements.txt   # relative to the workdir repo

agent:
  permission_mode: bypassAll
  # additional_flags: ""
  # instructions: ~/CLAUDE.md   # omit=auto, false=disabled, string=path
  # plugins:                    # defaults: superpowers, commit-commands, pyright-lsp
"#;
