// ABOUTME: Reads the agent's on-disk OAuth credentials and refreshes them into a running
// container. Grounded in original_source/claude_config.py's staging-path comment: the
// container never has direct access to the host credentials file's inode, so host-side
// credential rotation is picked up by re-running `refresh` rather than observing the mount.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::mount::CREDENTIALS_STAGING_PATH;
use crate::session::container::{ContainerError, ContainerManager, RuntimeState};

#[derive(Error, Debug)]
pub enum CredentialsError {
    /// The credentials file is missing or unparseable — distinct from `Expired`
    /// so the operator is told to log in, not just to wait out a refresh.
    #[error("credentials file is missing or unreadable")]
    Invalid,
    #[error("credentials are expired")]
    Expired,
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("container not running: {0}")]
    ContainerNotRunning(String),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl CredentialsError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CredentialsError::Invalid => 1,
            CredentialsError::Expired => 2,
            CredentialsError::ContainerNotFound(_) | CredentialsError::ContainerNotRunning(_) => 1,
            CredentialsError::Container(_) => 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OauthSection {
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct CredentialsDocument {
    oauth: OauthSection,
}

pub struct CredentialsProbe {
    credentials_path: PathBuf,
}

impl CredentialsProbe {
    pub fn new(credentials_path: PathBuf) -> Self {
        Self { credentials_path }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude")
            .join(".credentials.json")
    }

    /// Never throws: a missing or unparseable file simply reads as invalid.
    pub fn check(&self) -> (bool, f64) {
        match self.validate() {
            Ok(hours_remaining) => (true, hours_remaining),
            Err(_) => (false, 0.0),
        }
    }

    /// Distinguishes a missing/unparseable credentials file (`Invalid`) from a
    /// present-but-expired one (`Expired`), per spec.md §4.4/§7's separate kinds.
    pub fn validate(&self) -> Result<f64, CredentialsError> {
        let raw = std::fs::read_to_string(&self.credentials_path)
            .map_err(|_| CredentialsError::Invalid)?;
        let doc = serde_json::from_str::<CredentialsDocument>(&raw)
            .map_err(|_| CredentialsError::Invalid)?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let remaining_ms = doc.oauth.expires_at - now_ms;
        if remaining_ms <= 0 {
            return Err(CredentialsError::Expired);
        }
        Ok(remaining_ms as f64 / 3_600_000.0)
    }

    /// Requires valid credentials and a running container; execs a copy from the
    /// immutable staging mount to the live path inside the container.
    pub async fn refresh(
        &self,
        container_name: &str,
        containers: &ContainerManager,
    ) -> Result<f64, CredentialsError> {
        let (valid, hours_remaining) = self.check();
        if !valid {
            return Err(CredentialsError::Expired);
        }

        let state = containers
            .inspect_state(container_name)
            .await?
            .ok_or_else(|| CredentialsError::ContainerNotFound(container_name.to_string()))?;
        if state != RuntimeState::Running {
            return Err(CredentialsError::ContainerNotRunning(
                container_name.to_string(),
            ));
        }

        let live_path = format!("{}/.claude/.credentials.json", crate::mount::CONTAINER_HOME);
        containers
            .exec(
                container_name,
                vec!["cp", CREDENTIALS_STAGING_PATH, &live_path],
            )
            .await?;

        info!(container = container_name, "refreshed credentials in container");
        Ok(hours_remaining)
    }
}

pub fn gitconfig_default_path() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".gitconfig"))
        .filter(|p: &PathBuf| p.exists())
}
