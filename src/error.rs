// ABOUTME: Top-level error type mapping every component's domain error to a process exit code

use thiserror::Error;

use crate::config::ConfigError;
use crate::git::CloneError;
use crate::image::ImageError;
use crate::session::SessionError;

/// Every error a CLI command can surface, with the exit code it maps to.
#[derive(Error, Debug)]
pub enum ScadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ScadError {
    /// Exit code per spec.md §7.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScadError::Config(e) => e.exit_code(),
            ScadError::Clone(e) => e.exit_code(),
            ScadError::Image(_) => 3,
            ScadError::Session(e) => e.exit_code(),
            ScadError::Other(_) => 1,
        }
    }
}
