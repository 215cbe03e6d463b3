// ABOUTME: Per-run local git clones (content-addressed hardlinks), fetch-back, and ref sync.
// Grounded on the teacher's worktree_manager.rs (git2 + `git` subprocess fallback), but the
// mechanism is local clones rather than `git worktree`: worktree metadata refers back to the
// source .git path, which is unreachable from inside the container (spec.md §4.5).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local};
use git2::{BranchType, Repository};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ScadConfig;
use crate::session::event_log::EventLog;

#[derive(Error, Debug)]
pub enum CloneError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("branch '{0}' already exists in {1}")]
    BranchExists(String, String),
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("no clones found for run '{0}'")]
    CloneSetMissing(String),
}

impl CloneError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CloneError::BranchExists(_, _) => 2,
            CloneError::CloneSetMissing(_) => 2,
            _ => 3,
        }
    }
}

pub type CloneInfo = BTreeMap<String, PathBuf>;

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub repo: String,
    pub branch: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SyncResult {
    pub repo: String,
    pub source: PathBuf,
}

pub struct CloneManager {
    runs_dir: PathBuf,
}

impl CloneManager {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            runs_dir: base_dir.join("runs"),
        }
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id)
    }

    fn worktrees_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("worktrees")
    }

    /// For every `worktree=true` repo, clones the source path locally and
    /// checks out `branch` (must not exist in any participating source repo,
    /// enforced upstream by `resolve_branch`). `worktree=false` repos are
    /// returned with their host path unchanged. Also seeds `claude/` and
    /// `claude.json`, per spec.md §4.5 step 3.
    pub fn create_clones(
        &self,
        config: &ScadConfig,
        branch: &str,
        run_id: &str,
    ) -> Result<CloneInfo, CloneError> {
        let worktrees_dir = self.worktrees_dir(run_id);
        std::fs::create_dir_all(&worktrees_dir)?;

        let mut result = CloneInfo::new();
        for (key, repo) in &config.repos {
            let source_path = repo.resolved_path();
            if repo.worktree {
                let clone_path = worktrees_dir.join(key);
                self.clone_local(&source_path, &clone_path, branch)?;
                result.insert(key.clone(), clone_path);
            } else {
                result.insert(key.clone(), source_path);
            }
        }

        let run_dir = self.run_dir(run_id);
        let claude_dir = run_dir.join("claude");
        std::fs::create_dir_all(&claude_dir)?;
        let claude_json = run_dir.join("claude.json");
        if !claude_json.exists() {
            std::fs::write(&claude_json, "{}")?;
        }

        Ok(result)
    }

    fn clone_local(
        &self,
        source_path: &Path,
        clone_path: &Path,
        branch: &str,
    ) -> Result<(), CloneError> {
        info!(
            source = %source_path.display(),
            clone = %clone_path.display(),
            branch,
            "creating local clone"
        );

        let output = Command::new("git")
            .args([
                "clone",
                "--local",
                source_path.to_str().unwrap_or_default(),
                clone_path.to_str().unwrap_or_default(),
            ])
            .output()?;
        if !output.status.success() {
            return Err(CloneError::CommandFailed(format!(
                "git clone --local failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let repo = Repository::open(clone_path)?;
        let head_commit = repo.head()?.peel_to_commit()?;
        repo.branch(branch, &head_commit, false)?;

        let checkout = Command::new("git")
            .current_dir(clone_path)
            .args(["checkout", branch])
            .output()?;
        if !checkout.status.success() {
            return Err(CloneError::CommandFailed(format!(
                "git checkout {branch} failed: {}",
                String::from_utf8_lossy(&checkout.stderr)
            )));
        }

        Ok(())
    }

    /// For each clone: detach HEAD, fetch `<branch>:<branch>` into the source
    /// repo from the clone's path, then re-attach the clone to `branch`.
    pub fn fetch_to_host(
        &self,
        run_id: &str,
        config: &ScadConfig,
        event_log: &EventLog,
    ) -> Result<Vec<FetchResult>, CloneError> {
        let worktrees_dir = self.worktrees_dir(run_id);
        if !worktrees_dir.exists() {
            return Err(CloneError::CloneSetMissing(run_id.to_string()));
        }

        let mut results = Vec::new();
        for (key, repo) in &config.repos {
            if !repo.worktree {
                continue;
            }
            let clone_path = worktrees_dir.join(key);
            if !clone_path.exists() {
                continue;
            }

            let clone_repo = Repository::open(&clone_path)?;
            let head = clone_repo.head()?;
            let Some(branch) = head.shorthand().map(|s| s.to_string()) else {
                debug!(repo = key, "HEAD is detached, skipping fetch");
                continue;
            };

            // Detach so the source repo's fetch doesn't contend with a checked-out branch.
            let head_oid = head
                .target()
                .ok_or_else(|| CloneError::CommandFailed("clone HEAD has no OID".to_string()))?;
            clone_repo.set_head_detached(head_oid)?;

            let source_path = repo.resolved_path();
            let fetch = Command::new("git")
                .current_dir(&source_path)
                .args([
                    "fetch",
                    clone_path.to_str().unwrap_or_default(),
                    &format!("{branch}:{branch}"),
                ])
                .output()?;

            // Re-attach regardless of fetch outcome so the clone stays usable.
            let checkout = Command::new("git")
                .current_dir(&clone_path)
                .args(["checkout", &branch])
                .output()?;
            if !checkout.status.success() {
                warn!(repo = key, "failed to re-attach clone to {branch}");
            }

            if !fetch.status.success() {
                return Err(CloneError::CommandFailed(format!(
                    "git fetch into {} failed: {}",
                    source_path.display(),
                    String::from_utf8_lossy(&fetch.stderr)
                )));
            }

            info!(repo = key, branch, "fetched clone branch back to host");
            event_log.append(run_id, "fetch", &format!("repo={key} branch={branch}"))?;
            results.push(FetchResult {
                repo: key.clone(),
                branch,
                source: source_path,
            });
        }

        Ok(results)
    }

    /// Forced fetch of `+refs/heads/*:refs/remotes/origin/*` from the source
    /// repo into each clone. Does not check out or merge.
    pub fn sync_from_host(
        &self,
        run_id: &str,
        config: &ScadConfig,
        event_log: &EventLog,
    ) -> Result<Vec<SyncResult>, CloneError> {
        let worktrees_dir = self.worktrees_dir(run_id);
        if !worktrees_dir.exists() {
            return Err(CloneError::CloneSetMissing(run_id.to_string()));
        }

        let mut results = Vec::new();
        for (key, repo) in &config.repos {
            if !repo.worktree {
                continue;
            }
            let clone_path = worktrees_dir.join(key);
            if !clone_path.exists() {
                continue;
            }
            let source_path = repo.resolved_path();

            let output = Command::new("git")
                .current_dir(&clone_path)
                .args([
                    "fetch",
                    "--force",
                    source_path.to_str().unwrap_or_default(),
                    "+refs/heads/*:refs/remotes/origin/*",
                ])
                .output()?;
            if !output.status.success() {
                return Err(CloneError::CommandFailed(format!(
                    "git fetch from {} failed: {}",
                    source_path.display(),
                    String::from_utf8_lossy(&output.stderr)
                )));
            }

            info!(repo = key, "synced host refs into clone");
            event_log.append(run_id, "sync", &format!("repo={key}"))?;
            results.push(SyncResult {
                repo: key.clone(),
                source: source_path,
            });
        }

        Ok(results)
    }

    /// Removes only the `worktrees/` subdirectory, preserving the event log
    /// and agent state.
    pub fn cleanup(&self, run_id: &str) -> Result<(), CloneError> {
        let worktrees_dir = self.worktrees_dir(run_id);
        if worktrees_dir.exists() {
            std::fs::remove_dir_all(&worktrees_dir)?;
        }
        Ok(())
    }

    /// Resolves the branch name for a new run. Operator-supplied names are
    /// accepted verbatim unless any participating source repo already has
    /// that branch. Otherwise generates `scad-<config>-<tag>-<MonDD>-<HHMM>`,
    /// appending `-2`, `-3`, ... on collision. Collision checks iterate repos
    /// in config-declaration (BTreeMap key) order and short-circuit on the
    /// first hit.
    pub fn resolve_branch(
        &self,
        config: &ScadConfig,
        operator_name: Option<&str>,
        tag: &str,
        now: DateTime<Local>,
    ) -> Result<String, CloneError> {
        if let Some(name) = operator_name {
            if let Some(repo_key) = self.find_branch_collision(config, name)? {
                return Err(CloneError::BranchExists(name.to_string(), repo_key));
            }
            return Ok(name.to_string());
        }

        let base = format!(
            "scad-{}-{}-{}-{}",
            config.name,
            tag,
            now.format("%b%d"),
            now.format("%H%M")
        );

        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.find_branch_collision(config, &candidate)?.is_some() {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
        Ok(candidate)
    }

    fn find_branch_collision(
        &self,
        config: &ScadConfig,
        branch: &str,
    ) -> Result<Option<String>, CloneError> {
        for (key, repo) in &config.repos {
            if !repo.worktree {
                continue;
            }
            let source_path = repo.resolved_path();
            if branch_exists(&source_path, branch)? {
                return Ok(Some(key.clone()));
            }
        }
        Ok(None)
    }
}

fn branch_exists(repo_path: &Path, branch: &str) -> Result<bool, CloneError> {
    let repo = Repository::open(repo_path)?;
    match repo.find_branch(branch, BranchType::Local) {
        Ok(_) => Ok(true),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
        Err(e) => Err(CloneError::Git(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn init_repo_with_commit(path: &Path) -> Repository {
        let repo = Repository::init(path).unwrap();
        let signature = git2::Signature::now("Test", "test@example.com").unwrap();
        let tree_id = {
            let mut index = repo.index().unwrap();
            index.write_tree().unwrap()
        };
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
            .unwrap();
        repo
    }

    fn demo_config(repo_path: &Path) -> ScadConfig {
        let yaml = format!(
            "name: demo\nrepos:\n  code:\n    path: {}\n    workdir: true\n",
            repo_path.display()
        );
        ScadConfig::parse("demo", &yaml).unwrap()
    }

    #[test]
    fn create_clones_checks_out_new_branch() {
        let source = TempDir::new().unwrap();
        init_repo_with_commit(source.path());
        let config = demo_config(source.path());

        let base = TempDir::new().unwrap();
        let manager = CloneManager::new(base.path());
        let clones = manager
            .create_clones(&config, "scad-demo-t1-Jan01-0000", "run1")
            .unwrap();

        let clone_path = &clones["code"];
        assert!(clone_path.exists());
        let clone_repo = Repository::open(clone_path).unwrap();
        let head = clone_repo.head().unwrap();
        assert_eq!(head.shorthand(), Some("scad-demo-t1-Jan01-0000"));

        assert!(base.path().join("runs/run1/claude").exists());
        assert!(base.path().join("runs/run1/claude.json").exists());
    }

    #[test]
    fn resolve_branch_detects_collision_and_generates_suffix() {
        let source = TempDir::new().unwrap();
        let repo = init_repo_with_commit(source.path());
        let head_commit = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("scad-demo-t1-Mar01-1400", &head_commit, false)
            .unwrap();

        let config = demo_config(source.path());
        let base = TempDir::new().unwrap();
        let manager = CloneManager::new(base.path());

        let now = Local.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap();
        let branch = manager
            .resolve_branch(&config, None, "t1", now)
            .unwrap();
        assert_eq!(branch, "scad-demo-t1-Mar01-1400-2");
    }

    #[test]
    fn resolve_branch_rejects_existing_operator_supplied_name() {
        let source = TempDir::new().unwrap();
        let repo = init_repo_with_commit(source.path());
        let head_commit = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("taken", &head_commit, false).unwrap();

        let config = demo_config(source.path());
        let base = TempDir::new().unwrap();
        let manager = CloneManager::new(base.path());

        let now = Local::now();
        let err = manager
            .resolve_branch(&config, Some("taken"), "t1", now)
            .unwrap_err();
        assert!(matches!(err, CloneError::BranchExists(_, _)));
    }

    #[test]
    fn fetch_to_host_round_trips_branch() {
        let source = TempDir::new().unwrap();
        init_repo_with_commit(source.path());
        let config = demo_config(source.path());

        let base = TempDir::new().unwrap();
        let manager = CloneManager::new(base.path());
        let event_log = EventLog::new(base.path());

        let branch = "scad-demo-t1-Jan01-0000";
        manager.create_clones(&config, branch, "run1").unwrap();

        // Commit a new file in the clone.
        let clone_path = base.path().join("runs/run1/worktrees/code");
        std::fs::write(clone_path.join("new.txt"), "hi").unwrap();
        let clone_repo = Repository::open(&clone_path).unwrap();
        let mut index = clone_repo.index().unwrap();
        index.add_path(Path::new("new.txt")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = clone_repo.find_tree(tree_id).unwrap();
        let signature = git2::Signature::now("Test", "test@example.com").unwrap();
        let parent = clone_repo.head().unwrap().peel_to_commit().unwrap();
        clone_repo
            .commit(Some("HEAD"), &signature, &signature, "add file", &tree, &[&parent])
            .unwrap();

        let results = manager.fetch_to_host("run1", &config, &event_log).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].branch, branch);

        let source_repo = Repository::open(source.path()).unwrap();
        let source_branch = source_repo
            .find_branch(branch, BranchType::Local)
            .unwrap();
        let source_commit = source_branch.get().peel_to_commit().unwrap();

        let clone_repo_after = Repository::open(&clone_path).unwrap();
        let clone_head = clone_repo_after.head().unwrap();
        assert_eq!(clone_head.shorthand(), Some(branch));
        assert_eq!(clone_head.peel_to_commit().unwrap().id(), source_commit.id());
    }

    #[test]
    fn fetch_to_host_fails_when_worktrees_missing() {
        let source = TempDir::new().unwrap();
        init_repo_with_commit(source.path());
        let config = demo_config(source.path());

        let base = TempDir::new().unwrap();
        let manager = CloneManager::new(base.path());
        let event_log = EventLog::new(base.path());

        let err = manager
            .fetch_to_host("missing-run", &config, &event_log)
            .unwrap_err();
        assert!(matches!(err, CloneError::CloneSetMissing(_)));
    }

    #[test]
    fn cleanup_removes_only_worktrees() {
        let source = TempDir::new().unwrap();
        init_repo_with_commit(source.path());
        let config = demo_config(source.path());

        let base = TempDir::new().unwrap();
        let manager = CloneManager::new(base.path());
        manager
            .create_clones(&config, "scad-demo-t1-Jan01-0000", "run1")
            .unwrap();

        let run_dir = base.path().join("runs/run1");
        std::fs::write(run_dir.join("events.log"), "line\n").unwrap();

        manager.cleanup("run1").unwrap();
        assert!(!run_dir.join("worktrees").exists());
        assert!(run_dir.join("events.log").exists());
        assert!(run_dir.join("claude").exists());
    }
}
