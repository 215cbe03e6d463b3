// ABOUTME: `scad build <config>` — forces an image rebuild and prunes superseded images

use std::path::Path;

use clap::Args;
use tracing::info;

use crate::config::ConfigStore;
use crate::error::ScadError;
use crate::image::ImageBuilder;

#[derive(Args)]
pub struct BuildArgs {
    config: String,
    /// Streams every build progress line to stdout instead of just the outcome.
    /// (The top-level `-v`/`--verbose` flag controls log level instead; this one
    /// is long-only to avoid colliding with it.)
    #[arg(long)]
    verbose: bool,
}

pub async fn run(args: BuildArgs, base_dir: &Path) -> Result<(), ScadError> {
    let store = ConfigStore::new(base_dir);
    let config = store.load(&args.config)?;

    let builder = ImageBuilder::connect().map_err(crate::session::SessionError::from)?;
    let previous = builder
        .info(&config.name)
        .await
        .map_err(crate::session::SessionError::from)?;

    let verbose = args.verbose;
    let tag = builder
        .build(&config, move |line| {
            if verbose {
                println!("{line}");
            }
        })
        .await
        .map_err(crate::session::SessionError::from)?;

    if let Some(previous) = previous {
        builder.prune_old(&config.name, &previous.id).await;
    }

    info!(tag = %tag, "build complete");
    println!("built {tag}");
    Ok(())
}
