// ABOUTME: End-to-end composition of ConfigStore + CloneManager + MountPlanner + EventLog
// without a Docker daemon — the part of the §4.7.1 start pipeline that doesn't need one.

use std::path::Path;

use chrono::{Local, TimeZone};
use git2::Repository;
use pretty_assertions::assert_eq;
use scad::config::ConfigStore;
use scad::git::CloneManager;
use scad::mount::{self, HostContext};
use scad::session::event_log::EventLog;
use tempfile::TempDir;

fn init_source_repo(path: &Path) {
    let repo = Repository::init(path).unwrap();
    let signature = git2::Signature::now("Test", "test@example.com").unwrap();
    let tree_id = repo.index().unwrap().write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
        .unwrap();
}

/// Mirrors spec.md §8 scenario 1 minus the container: config load, branch
/// resolution, clone creation, mount plan composition, start-event logging.
#[test]
fn cold_start_one_repo_config_without_container() {
    let base = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    init_source_repo(source.path());

    let store = ConfigStore::new(base.path());
    let yaml = format!(
        "name: demo\nrepos:\n  code:\n    path: {}\n    workdir: true\n",
        source.path().display()
    );
    std::fs::create_dir_all(base.path().join("configs")).unwrap();
    std::fs::write(base.path().join("configs/demo.yml"), yaml).unwrap();
    let config = store.load("demo").unwrap();

    let clones = CloneManager::new(base.path());
    let now = Local.with_ymd_and_hms(2026, 7, 30, 9, 5, 0).unwrap();
    let branch = clones.resolve_branch(&config, None, "plan07", now).unwrap();
    assert!(branch.starts_with("scad-demo-plan07-"));

    let run_id = format!("demo-plan07-{}", now.format("%b%d-%H%M"));
    let clone_paths = clones.create_clones(&config, &branch, &run_id).unwrap();
    assert!(clone_paths["code"].join(".git").exists());

    let host = HostContext {
        base_dir: base.path().to_path_buf(),
        gitconfig_path: None,
        credentials_path: None,
        prompt: Some("work".to_string()),
        upstream_api_key: None,
    };
    let plan = mount::plan(&config, &run_id, &branch, &clone_paths, &host, chrono::Utc::now());
    assert_eq!(plan.labels["config"], "demo");
    assert_eq!(plan.labels["branch"], branch);
    assert!(plan
        .volumes
        .iter()
        .any(|v| v.container == "/workspace/code"));

    let events = EventLog::new(base.path());
    events
        .append(&run_id, "start", &format!("config=demo branch={branch}"))
        .unwrap();
    let records = events.read(&run_id).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].verb, "start");
    assert_eq!(events.config_for_run(&run_id).unwrap(), "demo");
}

/// spec.md §8 boundary behaviour: `resolveBranch` never returns a name that
/// already exists in a participating source repo, across repeated collisions.
#[test]
fn resolve_branch_walks_past_multiple_collisions() {
    let base = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    init_source_repo(source.path());

    let repo = Repository::open(source.path()).unwrap();
    let head_commit = repo.head().unwrap().peel_to_commit().unwrap();
    let now = Local.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap();
    for suffix in ["", "-2", "-3"] {
        repo.branch(&format!("scad-demo-t1-Mar01-1400{suffix}"), &head_commit, false)
            .unwrap();
    }

    let yaml = format!(
        "name: demo\nrepos:\n  code:\n    path: {}\n    workdir: true\n",
        source.path().display()
    );
    let config = scad::config::ScadConfig::parse("demo", &yaml).unwrap();

    let clones = CloneManager::new(base.path());
    let branch = clones.resolve_branch(&config, None, "t1", now).unwrap();
    assert_eq!(branch, "scad-demo-t1-Mar01-1400-4");
}

/// spec.md §3.2: state derivation when the container is absent. A run directory
/// with worktrees is `removed`; one with only the event log is `cleaned`.
#[test]
fn run_paths_distinguish_removed_from_cleaned() {
    let base = TempDir::new().unwrap();
    let run_id = "demo-t1-Jan01-0000";
    let paths = scad::session::run::RunPaths::new(base.path(), run_id);

    std::fs::create_dir_all(paths.worktrees_dir().join("code")).unwrap();
    assert!(paths.exists());
    assert!(paths.has_worktrees());

    std::fs::remove_dir_all(paths.worktrees_dir()).unwrap();
    std::fs::write(paths.events_log(), "line\n").unwrap();
    assert!(paths.exists());
    assert!(!paths.has_worktrees());
}
