// ABOUTME: Usage/cost aggregation via an opaque external tool subprocess, with a
// stream-log fallback. All failures yield None, never an error (spec.md §4.7.5).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub turns: u64,
    pub cost_usd: f64,
    pub cache_create_tokens: u64,
    pub cache_read_tokens: u64,
}

#[derive(Debug, Deserialize, Default)]
struct RawUsage {
    #[serde(default, rename = "inputTokens")]
    input_tokens: u64,
    #[serde(default, rename = "outputTokens")]
    output_tokens: u64,
    #[serde(default)]
    turns: u64,
    #[serde(default, rename = "costUsd")]
    cost_usd: f64,
    #[serde(default, rename = "cacheCreateTokens")]
    cache_create_tokens: u64,
    #[serde(default, rename = "cacheReadTokens")]
    cache_read_tokens: u64,
}

impl From<RawUsage> for UsageSummary {
    fn from(raw: RawUsage) -> Self {
        Self {
            input_tokens: raw.input_tokens,
            output_tokens: raw.output_tokens,
            turns: raw.turns,
            cost_usd: raw.cost_usd,
            cache_create_tokens: raw.cache_create_tokens,
            cache_read_tokens: raw.cache_read_tokens,
        }
    }
}

/// Invokes an external usage tool with a 30-second timeout, normalizing its JSON
/// output. Falls back to the final record of the agent stream log for cost if the
/// tool is unavailable. Every failure path returns `None`.
pub async fn usage_for(run_id: &str, stream_log_path: &Path) -> Option<UsageSummary> {
    if let Some(summary) = run_usage_tool(run_id).await {
        return Some(summary);
    }
    stream_log_fallback(stream_log_path)
}

async fn run_usage_tool(run_id: &str) -> Option<UsageSummary> {
    let result = timeout(
        Duration::from_secs(30),
        Command::new("scad-usage").arg(run_id).output(),
    )
    .await;

    let output = match result {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(_)) => {
            debug!(run_id, "usage tool exited non-zero");
            return None;
        }
        Ok(Err(e)) => {
            debug!(run_id, error = %e, "usage tool unavailable");
            return None;
        }
        Err(_) => {
            warn!(run_id, "usage tool timed out after 30s");
            return None;
        }
    };

    let raw: RawUsage = serde_json::from_slice(&output.stdout).ok()?;
    Some(raw.into())
}

fn stream_log_fallback(stream_log_path: &Path) -> Option<UsageSummary> {
    let raw = std::fs::read_to_string(stream_log_path).ok()?;
    let last_line = raw.lines().filter(|l| !l.trim().is_empty()).last()?;
    let record: Value = serde_json::from_str(last_line).ok()?;

    let cost_usd = record
        .get("total_cost_usd")
        .or_else(|| record.get("costUsd"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    Some(UsageSummary {
        cost_usd,
        ..Default::default()
    })
}
