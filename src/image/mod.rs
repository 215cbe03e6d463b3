// ABOUTME: Drives the Docker image build for a rendered build context, streaming progress
// lines and pruning superseded images. Grounded in claude_dev.rs::build_image_if_needed's
// "skip if exists, else build" shape, generalized to build from an arbitrary staging
// directory instead of a fixed path.

use std::collections::HashMap;
use std::path::Path;

use bollard::image::{BuildImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::Docker;
use futures_util::stream::StreamExt;
use thiserror::Error;
use tracing::{info, warn};

use crate::build::{BuildContext, BuildContextError};
use crate::config::ScadConfig;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("build context error: {0}")]
    BuildContext(#[from] BuildContextError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image build failed: {0}")]
    BuildFailed(String),
}

#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub tag: String,
    pub id: String,
    pub created_iso: String,
}

pub struct ImageBuilder {
    docker: Docker,
}

impl ImageBuilder {
    pub fn connect() -> Result<Self, ImageError> {
        Ok(Self {
            docker: Docker::connect_with_local_defaults()?,
        })
    }

    pub async fn exists(&self, config: &ScadConfig) -> Result<bool, ImageError> {
        Ok(self.info(&config.name).await?.is_some())
    }

    pub async fn info(&self, config_name: &str) -> Result<Option<ImageInfo>, ImageError> {
        let tag = format!("scad-{config_name}");
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![tag.clone()]);

        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(images.into_iter().next().map(|summary| ImageInfo {
            tag: tag.clone(),
            id: summary.id,
            created_iso: chrono::DateTime::from_timestamp(summary.created, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
        }))
    }

    /// No-op if the tag already exists; otherwise builds. Returns the tag.
    pub async fn build_if_missing(&self, config: &ScadConfig) -> Result<String, ImageError> {
        if self.exists(config).await? {
            return Ok(config.image_tag());
        }
        let mut lines = Vec::new();
        self.build(config, |line| lines.push(line)).await
    }

    /// Renders a build context into a temp directory, streams the build, and invokes
    /// `on_line` for each textual progress line. The temp directory is released on
    /// every exit path (including build failure) since it's an RAII `TempDir`.
    pub async fn build(
        &self,
        config: &ScadConfig,
        mut on_line: impl FnMut(String),
    ) -> Result<String, ImageError> {
        let staging = tempfile::tempdir()?;
        BuildContext::render(config, staging.path())?;

        let tag = config.image_tag();
        let tarball = tar_directory(staging.path())?;

        let options = BuildImageOptions {
            t: tag.clone(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(tarball.into()));
        let mut first_error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(stream_line) = info.stream {
                        let trimmed = stream_line.trim_end().to_string();
                        if !trimmed.is_empty() {
                            on_line(trimmed);
                        }
                    }
                    if let Some(error) = info.error {
                        first_error.get_or_insert_with(|| error.clone());
                    }
                }
                Err(e) => {
                    first_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        if let Some(error) = first_error {
            return Err(ImageError::BuildFailed(error));
        }

        info!(tag = %tag, "built image");
        Ok(tag)
    }

    /// Removes a single image by ID. Used by the garbage collector's `--force` path
    /// to act on `unused_images` findings.
    pub async fn remove_image(&self, image_id: &str) -> Result<(), ImageError> {
        self.docker
            .remove_image(
                image_id,
                Some(RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await?;
        Ok(())
    }

    /// Best-effort removal of same-config images whose ID differs from `current_image_id`.
    /// Individual failures are swallowed and never propagate.
    pub async fn prune_old(&self, config_name: &str, current_image_id: &str) {
        let tag = format!("scad-{config_name}");
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![tag]);

        let images = match self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
        {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "prune_old failed to list images");
                return;
            }
        };

        for image in images {
            if image.id == current_image_id {
                continue;
            }
            if let Err(e) = self
                .docker
                .remove_image(
                    &image.id,
                    Some(RemoveImageOptions {
                        force: true,
                        ..Default::default()
                    }),
                    None,
                )
                .await
            {
                warn!(image = %image.id, error = %e, "prune_old failed to remove image");
            }
        }
    }
}

fn tar_directory(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", dir)?;
    builder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tar_directory_produces_nonempty_archive() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let archive = tar_directory(tmp.path()).unwrap();
        assert!(!archive.is_empty());
    }
}
