// ABOUTME: Git integration — per-run local clones, fetch-back, and ref sync

pub mod clone_manager;

pub use clone_manager::{CloneError, CloneInfo, CloneManager, FetchResult, SyncResult};
