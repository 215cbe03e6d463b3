// ABOUTME: Parses representative command lines from the spec's command table through
// clap, without dispatching them — no Docker or filesystem side effects.

use clap::Parser;
use scad::cli::Cli;

#[test]
fn session_start_requires_tag() {
    let err = Cli::try_parse_from(["scad", "session", "start", "demo"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
}

#[test]
fn session_start_parses_with_tag_and_optional_flags() {
    let cli = Cli::try_parse_from([
        "scad",
        "session",
        "start",
        "demo",
        "--tag",
        "plan07",
        "--prompt",
        "work on the thing",
        "--rebuild",
    ])
    .unwrap();
    assert_eq!(cli.verbose, 0);
    assert!(matches!(cli.command, scad::cli::Command::Session(_)));
}

#[test]
fn global_verbose_flag_stacks() {
    let cli = Cli::try_parse_from(["scad", "-vv", "gc"]).unwrap();
    assert_eq!(cli.verbose, 2);
}

#[test]
fn base_dir_override_parses() {
    let cli = Cli::try_parse_from(["scad", "--base-dir", "/tmp/scad-test", "gc"]).unwrap();
    assert_eq!(cli.base_dir.unwrap(), std::path::PathBuf::from("/tmp/scad-test"));
}

#[test]
fn code_fetch_sync_refresh_all_parse() {
    for sub in ["fetch", "sync", "refresh"] {
        Cli::try_parse_from(["scad", "code", sub, "demo-t1-Jan01-0000"]).unwrap();
    }
}

#[test]
fn config_subcommands_parse() {
    Cli::try_parse_from(["scad", "config", "list"]).unwrap();
    Cli::try_parse_from(["scad", "config", "view", "demo"]).unwrap();
    Cli::try_parse_from(["scad", "config", "new", "demo"]).unwrap();
    Cli::try_parse_from(["scad", "config", "add", "/tmp/demo.yml"]).unwrap();
    Cli::try_parse_from(["scad", "config", "remove", "demo"]).unwrap();
}

#[test]
fn project_status_accepts_cost_flag() {
    Cli::try_parse_from(["scad", "project", "status", "demo", "--cost"]).unwrap();
}

#[test]
fn build_accepts_verbose_flag() {
    Cli::try_parse_from(["scad", "build", "demo", "--verbose"]).unwrap();
}

#[test]
fn gc_accepts_force_flag() {
    Cli::try_parse_from(["scad", "gc", "--force"]).unwrap();
}

#[test]
fn completions_requires_known_shell() {
    Cli::try_parse_from(["scad", "completions", "bash"]).unwrap();
    assert!(Cli::try_parse_from(["scad", "completions", "not-a-shell"]).is_err());
}
