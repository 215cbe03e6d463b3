// ABOUTME: `scad config ...` command group — store management (list/view/edit/add/remove/new)

use std::path::{Path, PathBuf};
use std::process::Command;

use clap::{Args, Subcommand};

use crate::config::ConfigStore;
use crate::error::ScadError;

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Lists registered configuration names.
    List,
    /// Prints the raw YAML of a configuration.
    View { name: String },
    /// Opens a configuration's file in `$EDITOR`.
    Edit { name: String },
    /// Registers a reference to an externally-authored config file.
    Add(AddArgs),
    /// Removes a configuration's store entry (never its referenced file).
    Remove { name: String },
    /// Writes a new commented template.
    New(NewArgs),
}

#[derive(Args)]
pub struct AddArgs {
    path: PathBuf,
}

#[derive(Args)]
pub struct NewArgs {
    name: String,
    /// Opens the new template in `$EDITOR` immediately after writing it.
    #[arg(long)]
    edit: bool,
}

pub fn run(cmd: ConfigCmd, base_dir: &Path) -> Result<(), ScadError> {
    let store = ConfigStore::new(base_dir);

    match cmd {
        ConfigCmd::List => {
            for name in store.list()? {
                println!("{name}");
            }
            Ok(())
        }
        ConfigCmd::View { name } => {
            print!("{}", store.view(&name)?);
            Ok(())
        }
        ConfigCmd::Edit { name } => {
            let path = store.path(&name);
            if !path.exists() {
                return Err(crate::config::ConfigError::NotFound(name).into());
            }
            open_in_editor(&path)
        }
        ConfigCmd::Add(args) => {
            let name = store.register(&args.path)?;
            println!("registered config '{name}'");
            Ok(())
        }
        ConfigCmd::Remove { name } => {
            store.remove(&name)?;
            println!("removed config '{name}'");
            Ok(())
        }
        ConfigCmd::New(args) => {
            let path = store.new_config(&args.name)?;
            println!("wrote template to {}", path.display());
            if args.edit {
                open_in_editor(&path)?;
            }
            Ok(())
        }
    }
}

fn open_in_editor(path: &Path) -> Result<(), ScadError> {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = Command::new(&editor)
        .arg(path)
        .status()
        .map_err(|e| anyhow::anyhow!("failed to launch $EDITOR ({editor}): {e}"))?;
    if !status.success() {
        return Err(anyhow::anyhow!("editor exited with {status}").into());
    }
    Ok(())
}
