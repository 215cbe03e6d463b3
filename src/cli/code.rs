// ABOUTME: `scad code ...` command group — fetch/sync/refresh between clones and host

use std::path::Path;

use clap::Subcommand;

use crate::credentials::CredentialsProbe;
use crate::error::ScadError;
use crate::session::container::ContainerManager;
use crate::session::SessionManager;

#[derive(Subcommand)]
pub enum CodeCmd {
    /// Fetches the clone's branch back into its source repository.
    Fetch { run_id: String },
    /// Syncs new host refs into the run's clones, without checking them out.
    Sync { run_id: String },
    /// Copies fresh host credentials into a running session's container.
    Refresh { run_id: String },
}

pub async fn run(cmd: CodeCmd, base_dir: &Path) -> Result<(), ScadError> {
    let manager = SessionManager::new(base_dir.to_path_buf())?;

    match cmd {
        CodeCmd::Fetch { run_id } => {
            manager.validate_run_id(&run_id).await?;
            let config = manager.load_config(&manager.config_for_run(&run_id)?)?;
            let results = manager
                .clone_manager()
                .fetch_to_host(&run_id, &config, manager.event_log())
                .map_err(crate::session::SessionError::from)?;
            for result in results {
                println!(
                    "{}: {} -> {}",
                    result.repo,
                    result.branch,
                    result.source.display()
                );
            }
            Ok(())
        }
        CodeCmd::Sync { run_id } => {
            manager.validate_run_id(&run_id).await?;
            let config = manager.load_config(&manager.config_for_run(&run_id)?)?;
            let results = manager
                .clone_manager()
                .sync_from_host(&run_id, &config, manager.event_log())
                .map_err(crate::session::SessionError::from)?;
            for result in results {
                println!("{}: synced from {}", result.repo, result.source.display());
            }
            Ok(())
        }
        CodeCmd::Refresh { run_id } => {
            manager.validate_run_id(&run_id).await?;
            let container_name = format!("scad-{run_id}");
            let containers = ContainerManager::connect().map_err(crate::session::SessionError::from)?;
            let probe = CredentialsProbe::new(CredentialsProbe::default_path());
            let hours_remaining = probe
                .refresh(&container_name, &containers)
                .await
                .map_err(crate::session::SessionError::from)?;
            manager.event_log().append(&run_id, "refresh", "").ok();
            println!("refreshed credentials, {hours_remaining:.1}h remaining");
            Ok(())
        }
    }
}
