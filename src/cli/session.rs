// ABOUTME: `scad session ...` command group

use std::path::Path;

use clap::{Args, Subcommand};

use crate::error::ScadError;
use crate::session::{RunState, SessionManager, SessionSummary};

#[derive(Subcommand)]
pub enum SessionCmd {
    Start(StartArgs),
    Stop(StopArgs),
    Clean(CleanArgs),
    Status(StatusArgs),
    Info { run_id: String },
    Logs(LogsArgs),
    Attach { run_id: String },
}

#[derive(Args)]
pub struct StartArgs {
    config: String,
    #[arg(long)]
    tag: String,
    #[arg(long)]
    branch: Option<String>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    rebuild: bool,
}

#[derive(Args)]
pub struct StopArgs {
    run_id: Option<String>,
    #[arg(long)]
    all: bool,
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    yes: bool,
}

#[derive(Args)]
pub struct CleanArgs {
    run_id: Option<String>,
    #[arg(long)]
    all: bool,
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    yes: bool,
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
pub struct LogsArgs {
    run_id: String,
    #[arg(short = 'f', long)]
    follow: bool,
    #[arg(short = 'n', long)]
    n: Option<u64>,
    #[arg(long)]
    stream: bool,
}

pub async fn run(cmd: SessionCmd, base_dir: &Path) -> Result<(), ScadError> {
    let manager = SessionManager::new(base_dir.to_path_buf())?;

    match cmd {
        SessionCmd::Start(args) => {
            let run_id = manager
                .start(
                    &args.config,
                    &args.tag,
                    args.branch.as_deref(),
                    args.prompt.as_deref(),
                    args.rebuild,
                )
                .await?;
            println!("{run_id}");
            Ok(())
        }
        SessionCmd::Stop(args) => {
            require_run_id_xor_selector(&args.run_id, args.all, &args.config)?;
            if let Some(run_id) = &args.run_id {
                stop_run(&manager, run_id).await
            } else {
                stop_where(&manager, args.all, args.config.as_deref(), args.yes).await
            }
        }
        SessionCmd::Clean(args) => {
            require_run_id_xor_selector(&args.run_id, args.all, &args.config)?;
            if let Some(run_id) = &args.run_id {
                clean_run(&manager, run_id).await
            } else {
                clean_where(
                    &manager,
                    args.all,
                    args.config.as_deref(),
                    args.force,
                    args.yes,
                )
                .await
            }
        }
        SessionCmd::Status(args) => {
            let sessions = if args.all {
                manager.all_sessions().await?
            } else {
                manager.list_running().await?
            };
            print_sessions(&sessions);
            Ok(())
        }
        SessionCmd::Info { run_id } => {
            let info = manager.info(&run_id).await?;
            println!("run_id:    {}", info.summary.run_id);
            println!("config:    {}", info.summary.config);
            println!("branch:    {}", info.summary.branch);
            println!("state:     {}", info.summary.state.as_str());
            println!("clones:    {}", info.clones.join(", "));
            println!("agent sessions: {}", info.agent_sessions);
            println!("events:");
            for line in &info.events {
                println!("  {line}");
            }
            Ok(())
        }
        SessionCmd::Logs(args) => show_logs(&manager, args).await,
        SessionCmd::Attach { run_id } => {
            manager.validate_run_id(&run_id).await?;
            println!("attach to scad-{run_id} with: docker exec -it scad-{run_id} tmux attach");
            Ok(())
        }
    }
}

/// `session stop` and `session clean` require either a run ID or `--all`/`--config`,
/// never both — enforced once here rather than duplicated per handler.
fn require_run_id_xor_selector(
    run_id: &Option<String>,
    all: bool,
    config: &Option<String>,
) -> Result<(), ScadError> {
    let has_run_id = run_id.is_some();
    let has_selector = all || config.is_some();
    if has_run_id == has_selector {
        return Err(ScadError::Other(anyhow::anyhow!(
            "specify exactly one of a run ID or --all/--config"
        )));
    }
    Ok(())
}

async fn stop_run(manager: &SessionManager, run_id: &str) -> Result<(), ScadError> {
    manager.stop(run_id).await?;
    println!("stopped {run_id}");
    Ok(())
}

async fn stop_where(
    manager: &SessionManager,
    all: bool,
    config: Option<&str>,
    yes: bool,
) -> Result<(), ScadError> {
    let targets: Vec<SessionSummary> = matching_sessions(manager, all, config)
        .await?
        .into_iter()
        .filter(|s| s.state == RunState::Running)
        .collect();
    if targets.is_empty() {
        return Ok(());
    }
    if !yes && !confirm(&format!("Stop {} running session(s)?", targets.len())) {
        println!("aborted");
        return Ok(());
    }
    for session in targets {
        manager.stop(&session.run_id).await?;
        println!("stopped {}", session.run_id);
    }
    Ok(())
}

async fn clean_run(manager: &SessionManager, run_id: &str) -> Result<(), ScadError> {
    manager.clean(run_id).await?;
    println!("cleaned {run_id}");
    Ok(())
}

async fn clean_where(
    manager: &SessionManager,
    all: bool,
    config: Option<&str>,
    force: bool,
    yes: bool,
) -> Result<(), ScadError> {
    let targets: Vec<SessionSummary> = matching_sessions(manager, all, config)
        .await?
        .into_iter()
        .filter(|s| force || s.state != RunState::Running)
        .collect();
    if targets.is_empty() {
        return Ok(());
    }
    if !yes && !confirm(&format!("Clean {} session(s)? This removes their agent state.", targets.len())) {
        println!("aborted");
        return Ok(());
    }
    for session in targets {
        manager.clean(&session.run_id).await?;
        println!("cleaned {}", session.run_id);
    }
    Ok(())
}

/// Prompts on the controlling terminal; a declined or non-interactive prompt
/// (e.g. stdin not a TTY) is treated as "no" rather than erroring the command.
fn confirm(prompt: &str) -> bool {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

async fn matching_sessions(
    manager: &SessionManager,
    all: bool,
    config: Option<&str>,
) -> Result<Vec<SessionSummary>, ScadError> {
    let sessions = manager.all_sessions().await?;
    Ok(sessions
        .into_iter()
        .filter(|s| all || config.map(|c| c == s.config).unwrap_or(false))
        .collect())
}

/// `--stream` reads the agent's JSONL stream log; the default reads the container's
/// own stdout/stderr (the setup-phase capture, per spec.md §6.3). `-f` follows either
/// source until interrupted; `-n` bounds the initial tail to the last N lines.
async fn show_logs(manager: &SessionManager, args: LogsArgs) -> Result<(), ScadError> {
    if args.stream {
        let path = manager.stream_log_path(&args.run_id);
        for line in tail_lines(&path, args.n).map_err(|e| {
            ScadError::Other(anyhow::anyhow!("reading stream log {}: {e}", path.display()))
        })? {
            println!("{line}");
        }
        if args.follow {
            follow_file(&path)
                .await
                .map_err(|e| ScadError::Other(anyhow::anyhow!("following stream log: {e}")))?;
        }
        return Ok(());
    }

    let container_name = format!("scad-{}", args.run_id);
    if args.follow {
        manager
            .container_manager()
            .logs_follow(&container_name, args.n, |line| println!("{line}"))
            .await
            .map_err(crate::session::SessionError::from)?;
    } else {
        let lines = manager
            .container_manager()
            .logs(&container_name, args.n)
            .await
            .map_err(crate::session::SessionError::from)?;
        for line in lines {
            println!("{line}");
        }
    }
    Ok(())
}

fn tail_lines(path: &std::path::Path, n: Option<u64>) -> std::io::Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    if let Some(n) = n {
        let n = n as usize;
        if lines.len() > n {
            lines = lines.split_off(lines.len() - n);
        }
    }
    Ok(lines)
}

/// Polls for file growth and prints appended bytes, the way `tail -f` does. Runs
/// until the process is interrupted — there is no natural end-of-stream for a file
/// that a live agent process may still be appending to.
async fn follow_file(path: &std::path::Path) -> std::io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};

    let mut pos = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let Ok(metadata) = std::fs::metadata(path) else {
            continue;
        };
        if metadata.len() > pos {
            let mut file = std::fs::File::open(path)?;
            file.seek(SeekFrom::Start(pos))?;
            let mut buf = String::new();
            file.read_to_string(&mut buf)?;
            print!("{buf}");
            pos = metadata.len();
        }
    }
}

fn print_sessions(sessions: &[SessionSummary]) {
    for session in sessions {
        println!(
            "{}\t{}\t{}\t{}",
            session.run_id,
            session.config,
            session.branch,
            session.state.as_str()
        );
    }
}
