// ABOUTME: Entry point — parses the CLI, wires logging, dispatches, maps errors to exit codes.

use clap::Parser;
use scad::cli::{default_base_dir, dispatch, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let base_dir = cli.base_dir.clone().unwrap_or_else(default_base_dir);
    if let Err(e) = std::fs::create_dir_all(&base_dir) {
        eprintln!(
            "error: could not create state directory {}: {e}",
            base_dir.display()
        );
        std::process::exit(3);
    }

    match dispatch(cli).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// Mirrors the teacher's `tracing` + `EnvFilter` setup, writing to a dated log file
/// under `<base>/logs/scad.log` instead of a TUI alternate screen. `-v` raises the
/// default filter from `info` to `debug`; repeats go to `trace`.
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::prelude::*;

    let base_dir = default_base_dir();
    let log_dir = base_dir.join("logs");
    let _ = std::fs::create_dir_all(&log_dir);

    let log_file = log_dir.join(format!("scad-{}.log", chrono::Local::now().format("%Y%m%d")));
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    else {
        return;
    };

    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("scad={default_level}").into()),
        )
        .try_init();
}
