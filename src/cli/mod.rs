// ABOUTME: CLI surface — clap derive command tree plus dispatch to each command group.
// Grounded in the broader corpus's nested-subcommand style for coding-agent CLIs
// (adjutant/src/cli/mod.rs's `AutopilotCli { command }` + per-group Subcommand enums),
// since the teacher itself is a TUI with no CLI surface.

pub mod build;
pub mod code;
pub mod config;
pub mod gc;
pub mod project;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::{generate, Shell};

use crate::error::ScadError;

#[derive(Parser)]
#[command(name = "scad", version, about = "Scoped coding-agent dispatch")]
pub struct Cli {
    /// Raise logging from info to debug. Repeat for trace.
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Overrides the `<base>` state directory (primarily for tests).
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(subcommand)]
    Session(session::SessionCmd),
    #[command(subcommand)]
    Code(code::CodeCmd),
    #[command(subcommand)]
    Config(config::ConfigCmd),
    #[command(subcommand)]
    Project(project::ProjectCmd),
    Build(build::BuildArgs),
    Gc(gc::GcArgs),
    /// Emits a shell completion script.
    Completions { shell: Shell },
}

pub fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".scad")
}

pub async fn dispatch(cli: Cli) -> Result<(), ScadError> {
    let base_dir = cli.base_dir.clone().unwrap_or_else(default_base_dir);

    match cli.command {
        Command::Session(cmd) => session::run(cmd, &base_dir).await,
        Command::Code(cmd) => code::run(cmd, &base_dir).await,
        Command::Config(cmd) => config::run(cmd, &base_dir),
        Command::Project(cmd) => project::run(cmd, &base_dir).await,
        Command::Build(args) => build::run(args, &base_dir).await,
        Command::Gc(args) => gc::run(args, &base_dir).await,
        Command::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
