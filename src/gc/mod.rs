// ABOUTME: Reconciles the container runtime against on-disk run state and prunes orphans.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::image::ImageBuilder;
use crate::session::container::ContainerManager;

#[derive(Debug, Clone, Default)]
pub struct GcFindings {
    pub orphan_containers: Vec<String>,
    pub dead_run_dirs: Vec<String>,
    pub unused_images: Vec<String>,
}

impl GcFindings {
    pub fn is_empty(&self) -> bool {
        self.orphan_containers.is_empty()
            && self.dead_run_dirs.is_empty()
            && self.unused_images.is_empty()
    }
}

pub struct GarbageCollector<'a> {
    base_dir: PathBuf,
    containers: &'a ContainerManager,
    images: &'a ImageBuilder,
}

impl<'a> GarbageCollector<'a> {
    pub fn new(base_dir: &Path, containers: &'a ContainerManager, images: &'a ImageBuilder) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            containers,
            images,
        }
    }

    pub async fn gc(&self, force: bool) -> Result<GcFindings, crate::session::container::ContainerError> {
        let managed = self.containers.list_managed().await?;
        let run_ids_with_containers: HashSet<String> = managed
            .iter()
            .filter_map(|c| c.labels.get("runId").cloned())
            .collect();

        let mut findings = GcFindings::default();

        for container in &managed {
            let run_id = container.labels.get("runId");
            let run_dir_missing = run_id
                .map(|id| !self.base_dir.join("runs").join(id).exists())
                .unwrap_or(true);
            let exited = container.state == crate::session::container::RuntimeState::Exited;
            if run_dir_missing || exited {
                findings.orphan_containers.push(container.name.clone());
            }
        }

        let runs_dir = self.base_dir.join("runs");
        if runs_dir.exists() {
            if let Ok(entries) = std::fs::read_dir(&runs_dir) {
                for entry in entries.flatten() {
                    let run_id = entry.file_name().to_string_lossy().to_string();
                    if run_ids_with_containers.contains(&run_id) {
                        continue;
                    }
                    let worktrees = entry.path().join("worktrees");
                    let has_worktrees = worktrees
                        .read_dir()
                        .map(|mut d| d.next().is_some())
                        .unwrap_or(false);
                    if !has_worktrees {
                        findings.dead_run_dirs.push(run_id);
                    }
                }
            }
        }

        let referenced_image_ids: HashSet<String> =
            managed.iter().map(|c| c.image_id.clone()).collect();
        if let Ok(managed_configs) = self.managed_config_names(&managed) {
            for config_name in managed_configs {
                if let Ok(images) = self.images_for_config(&config_name).await {
                    for image_id in images {
                        if !referenced_image_ids.contains(&image_id) {
                            findings.unused_images.push(image_id);
                        }
                    }
                }
            }
        }

        if force {
            self.apply(&findings).await;
            return Ok(GcFindings::default());
        }

        Ok(findings)
    }

    fn managed_config_names(
        &self,
        managed: &[crate::session::container::ManagedContainer],
    ) -> Result<HashSet<String>, crate::session::container::ContainerError> {
        Ok(managed
            .iter()
            .filter_map(|c| c.labels.get("config").cloned())
            .collect())
    }

    async fn images_for_config(&self, config_name: &str) -> Result<Vec<String>, crate::image::ImageError> {
        Ok(self
            .images
            .info(config_name)
            .await?
            .into_iter()
            .map(|info| info.id)
            .collect())
    }

    /// Each finding is removed best-effort; individual failures are swallowed.
    async fn apply(&self, findings: &GcFindings) {
        for name in &findings.orphan_containers {
            if let Err(e) = self.containers.remove(name).await {
                warn!(container = name, error = %e, "gc failed to remove orphan container");
            } else {
                info!(container = name, "gc removed orphan container");
            }
        }

        for run_id in &findings.dead_run_dirs {
            let path = self.base_dir.join("runs").join(run_id);
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(run_id, error = %e, "gc failed to remove dead run dir");
            } else {
                info!(run_id, "gc removed dead run dir");
            }
        }

        for image_id in &findings.unused_images {
            if let Err(e) = self.images.remove_image(image_id).await {
                warn!(image = image_id, error = %e, "gc failed to remove unused image");
            } else {
                info!(image = image_id, "gc removed unused image");
            }
        }
    }
}
