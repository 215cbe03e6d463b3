// ABOUTME: `scad gc` — reconciles the container runtime against on-disk run state

use std::path::Path;

use clap::Args;

use crate::error::ScadError;
use crate::gc::GarbageCollector;
use crate::image::ImageBuilder;
use crate::session::container::ContainerManager;

#[derive(Args)]
pub struct GcArgs {
    /// Actually remove findings instead of just reporting them.
    #[arg(long)]
    force: bool,
}

pub async fn run(args: GcArgs, base_dir: &Path) -> Result<(), ScadError> {
    let containers = ContainerManager::connect().map_err(crate::session::SessionError::from)?;
    let images = ImageBuilder::connect().map_err(crate::session::SessionError::from)?;
    let collector = GarbageCollector::new(base_dir, &containers, &images);

    let findings = collector
        .gc(args.force)
        .await
        .map_err(crate::session::SessionError::from)?;

    if args.force {
        println!("gc complete");
        return Ok(());
    }

    if findings.is_empty() {
        println!("nothing to reconcile");
        return Ok(());
    }

    if !findings.orphan_containers.is_empty() {
        println!("orphan containers:");
        for name in &findings.orphan_containers {
            println!("  {name}");
        }
    }
    if !findings.dead_run_dirs.is_empty() {
        println!("dead run directories:");
        for run_id in &findings.dead_run_dirs {
            println!("  {run_id}");
        }
    }
    if !findings.unused_images.is_empty() {
        println!("unused images:");
        for id in &findings.unused_images {
            println!("  {id}");
        }
    }
    Ok(())
}
