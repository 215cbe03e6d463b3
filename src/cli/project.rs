// ABOUTME: `scad project ...` command group — aggregate view across a config's sessions

use std::path::Path;

use clap::{Args, Subcommand};

use crate::error::ScadError;
use crate::session::SessionManager;

#[derive(Subcommand)]
pub enum ProjectCmd {
    /// Aggregate counts (and optionally cost) across all sessions of a config.
    Status(StatusArgs),
}

#[derive(Args)]
pub struct StatusArgs {
    config: String,
    #[arg(long)]
    cost: bool,
}

pub async fn run(cmd: ProjectCmd, base_dir: &Path) -> Result<(), ScadError> {
    let manager = SessionManager::new(base_dir.to_path_buf())?;

    match cmd {
        ProjectCmd::Status(args) => {
            let status = manager.project_status(&args.config, args.cost).await?;
            println!("config:  {}", args.config);
            println!("running: {}", status.running);
            println!("stopped: {}", status.stopped);
            println!("removed: {}", status.removed);
            println!("cleaned: {}", status.cleaned);
            if let Some(cost) = status.total_cost_usd {
                println!("cost:    ${cost:.2}");
            }
            for session in &status.sessions {
                println!(
                    "  {}\t{}\t{}",
                    session.run_id,
                    session.branch,
                    session.state.as_str()
                );
            }
            Ok(())
        }
    }
}
