// ABOUTME: Run identity, lifecycle-state derivation, and the per-run filesystem layout

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Derived, never stored as a field (spec.md §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
    Removed,
    Cleaned,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Stopped => "stopped",
            RunState::Removed => "removed",
            RunState::Cleaned => "cleaned",
        }
    }
}

/// `<configName>-<tag>-<MonDD>-<HHMM>` in host-local time. `tag` is the
/// operator string or the literal `notag`.
pub fn generate_run_id(config_name: &str, tag: &str, now: DateTime<Local>) -> String {
    format!(
        "{config_name}-{tag}-{}-{}",
        now.format("%b%d"),
        now.format("%H%M")
    )
}

/// Checks the `<...>-<...>-<MonDD>-<HHMM>` tail shape without pulling in a
/// regex dependency the rest of the crate has no other use for.
pub fn looks_like_run_id(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.rsplitn(3, '-').collect();
    if parts.len() != 3 {
        return false;
    }
    let (hhmm, monday, _rest) = (parts[0], parts[1], parts[2]);

    let hhmm_ok = hhmm.len() == 4 && hhmm.chars().all(|c| c.is_ascii_digit());

    let monday_ok = monday.len() == 5
        && monday.as_bytes()[0].is_ascii_uppercase()
        && monday.as_bytes()[1].is_ascii_lowercase()
        && monday.as_bytes()[2].is_ascii_lowercase()
        && monday[3..].chars().all(|c| c.is_ascii_digit());

    hhmm_ok && monday_ok
}

pub struct RunPaths {
    run_dir: PathBuf,
}

impl RunPaths {
    pub fn new(base_dir: &Path, run_id: &str) -> Self {
        Self {
            run_dir: base_dir.join("runs").join(run_id),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.run_dir.join("worktrees")
    }

    pub fn claude_dir(&self) -> PathBuf {
        self.run_dir.join("claude")
    }

    pub fn claude_json(&self) -> PathBuf {
        self.run_dir.join("claude.json")
    }

    pub fn events_log(&self) -> PathBuf {
        self.run_dir.join("events.log")
    }

    pub fn exists(&self) -> bool {
        self.run_dir.exists()
    }

    pub fn has_worktrees(&self) -> bool {
        self.worktrees_dir()
            .read_dir()
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generates_expected_run_id_format() {
        let now = Local.with_ymd_and_hms(2026, 7, 30, 9, 5, 0).unwrap();
        let run_id = generate_run_id("demo", "plan07", now);
        assert_eq!(run_id, "demo-plan07-Jul30-0905");
        assert!(looks_like_run_id(&run_id));
        assert!(!looks_like_run_id("not-a-run-id"));
    }
}
