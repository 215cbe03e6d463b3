// ABOUTME: Renders a configuration into a Docker build context staging directory.
// Grounded in original_source/container.py::render_build_context (Jinja2 templates there;
// this port uses plain format! strings since no templating crate appears anywhere in the
// retrieved example pack for Dockerfile generation).

use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{PermissionMode, ScadConfig};

#[derive(Error, Debug)]
pub enum BuildContextError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pure rendering step: `(Config, stagingDir) -> ()`. Deterministic given the same
/// config and environment; no network access. Optional inputs that are absent from
/// the config (dependency manifest, instructions file) are simply absent from the
/// staging directory, never rendered as empty placeholders.
pub struct BuildContext;

impl BuildContext {
    pub fn render(config: &ScadConfig, staging_dir: &Path) -> Result<(), BuildContextError> {
        std::fs::create_dir_all(staging_dir)?;

        std::fs::write(staging_dir.join("Dockerfile"), render_dockerfile(config))?;
        std::fs::write(staging_dir.join("entrypoint.sh"), render_entrypoint(config))?;
        std::fs::write(staging_dir.join(".tmux.conf"), render_tmux_conf())?;
        std::fs::write(staging_dir.join("statusline.sh"), render_statusline())?;

        let (seed_script, seed_json) = render_plugin_seed(config);
        std::fs::write(staging_dir.join("bootstrap-plugins.sh"), seed_script)?;
        std::fs::write(staging_dir.join("plugins.json"), seed_json)?;

        std::fs::write(
            staging_dir.join("claude.json"),
            serde_json::to_string_pretty(&render_claude_json(config))?,
        )?;
        std::fs::write(
            staging_dir.join("settings.json"),
            serde_json::to_string_pretty(&render_settings_json(config))?,
        )?;

        if let Some(requirements_rel) = &config.python.requirements {
            let workdir_repo = &config.repos[config.workdir_key()];
            let source = workdir_repo.resolved_path().join(requirements_rel);
            if source.exists() {
                std::fs::copy(&source, staging_dir.join("requirements.txt"))?;
                debug!(path = %source.display(), "copied dependency manifest into build context");
            }
        }

        info!(staging = %staging_dir.display(), config = %config.name, "rendered build context");
        Ok(())
    }
}

fn render_dockerfile(config: &ScadConfig) -> String {
    let mut apt_install = String::new();
    if !config.apt_packages.is_empty() {
        apt_install = format!(
            "RUN apt-get update && apt-get install -y --no-install-recommends {} \\\n    && rm -rf /var/lib/apt/lists/*\n",
            config.apt_packages.join(" ")
        );
    }

    let requirements_install = if config.python.requirements.is_some() {
        "COPY requirements.txt /tmp/requirements.txt\nRUN pip install --no-cache-dir -r /tmp/requirements.txt\n"
    } else {
        ""
    };

    format!(
        r#"FROM {base_image}

RUN apt-get update && apt-get install -y --no-install-recommends \
    git curl ca-certificates tmux sudo \
    && rm -rf /var/lib/apt/lists/*
{apt_install}
RUN curl -fsSL https://claude.ai/install.sh | bash -s latest

RUN useradd --create-home --shell /bin/bash scad \
    && mkdir -p /workspace \
    && chown -R scad:scad /workspace
{requirements_install}
COPY entrypoint.sh /usr/local/bin/entrypoint.sh
COPY .tmux.conf /home/scad/.tmux.conf
COPY statusline.sh /home/scad/statusline.sh
COPY bootstrap-plugins.sh /usr/local/bin/bootstrap-plugins.sh
COPY plugins.json /home/scad/.claude-plugins-seed.json
COPY claude.json /home/scad/.claude.json.seed
COPY settings.json /home/scad/.claude-settings.seed.json
RUN chmod +x /usr/local/bin/entrypoint.sh /usr/local/bin/bootstrap-plugins.sh \
    && chown -R scad:scad /home/scad

USER scad
WORKDIR /workspace

ENTRYPOINT ["/usr/local/bin/entrypoint.sh"]
"#,
        base_image = config.base_image(),
    )
}

fn render_entrypoint(config: &ScadConfig) -> String {
    let permission_flag = match config.agent.permission_mode {
        PermissionMode::BypassAll => "--dangerously-skip-permissions",
        PermissionMode::Default => "",
    };
    let extra_flags = config.agent.additional_flags.clone().unwrap_or_default();

    format!(
        r#"#!/bin/bash
set -euo pipefail

mkdir -p "$HOME/.claude"
if [ ! -f "$HOME/.claude.json" ]; then
    cp "$HOME/.claude.json.seed" "$HOME/.claude.json"
fi
mkdir -p "$HOME/.claude"
if [ ! -f "$HOME/.claude/settings.json" ]; then
    cp "$HOME/.claude-settings.seed.json" "$HOME/.claude/settings.json"
fi

if [ -f /mnt/host-claude-credentials.json ]; then
    cp /mnt/host-claude-credentials.json "$HOME/.claude/.credentials.json"
fi
if [ -f /mnt/host-gitconfig ]; then
    cp /mnt/host-gitconfig "$HOME/.gitconfig"
fi

/usr/local/bin/bootstrap-plugins.sh

cd "/workspace/{workdir_key}"

exec claude {permission_flag} {extra_flags} ${{AGENT_PROMPT:+--prompt "$AGENT_PROMPT"}}
"#,
        workdir_key = config.workdir_key(),
    )
}

fn render_tmux_conf() -> String {
    "set -g mouse on\nset -g history-limit 10000\nset -g status-style bg=black,fg=white\n".to_string()
}

fn render_statusline() -> String {
    "#!/bin/bash\necho \"[scad] run=$RUN_ID\"\n".to_string()
}

fn render_plugin_seed(config: &ScadConfig) -> (String, String) {
    let script = "#!/bin/bash\nset -euo pipefail\nclaude plugin install --from-seed \"$HOME/.claude-plugins-seed.json\"\n".to_string();
    let json = serde_json::to_string_pretty(&json!({ "plugins": config.agent.plugins }))
        .expect("plugin list always serializes");
    (script, json)
}

/// Grounded verbatim in original_source/claude_config.py::render_claude_json.
fn render_claude_json(config: &ScadConfig) -> serde_json::Value {
    let workdir_key = config.workdir_key();
    let mut projects = serde_json::Map::new();
    projects.insert(
        format!("/workspace/{workdir_key}"),
        json!({ "hasTrustDialogAccepted": true }),
    );

    json!({
        "hasCompletedOnboarding": true,
        "effortCalloutDismissed": true,
        "installMethod": "native",
        "projects": projects,
    })
}

/// Grounded verbatim in original_source/claude_config.py::render_settings_json.
fn render_settings_json(config: &ScadConfig) -> serde_json::Value {
    let enabled_plugins: serde_json::Map<String, serde_json::Value> = config
        .agent
        .plugins
        .iter()
        .map(|p| (p.clone(), json!(true)))
        .collect();

    let mut settings = json!({
        "cleanupPeriodDays": 365,
        "attribution": { "commit": "", "pr": "" },
        "permissions": {
            "deny": [
                "Bash(rm -rf /)",
                "Bash(sudo *)",
                "Bash(mkfs*)",
                "Bash(dd if=*)",
                "Bash(git push * --force* main)",
                "Bash(git push * --force* master)",
                "Bash(git reset --hard*)",
            ],
        },
        "hooks": {
            "PreToolUse": [
                {
                    "matcher": "Bash",
                    "hooks": [{
                        "type": "prompt",
                        "prompt": "Block if the command contains rm -rf / or pushes directly to main/master branches. Allow everything else.",
                    }],
                },
            ],
            "Notification": [
                {
                    "matcher": "statusline",
                    "hooks": [{
                        "type": "command",
                        "command": "bash /home/scad/statusline.sh",
                    }],
                },
            ],
        },
        "enabledPlugins": enabled_plugins,
    });

    if matches!(config.agent.permission_mode, PermissionMode::BypassAll) {
        settings["permissions"]["defaultMode"] = json!("bypassPermissions");
        settings["skipDangerousModePermissionPrompt"] = json!(true);
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn demo_config() -> ScadConfig {
        ScadConfig::parse(
            "demo",
            "name: demo\nrepos:\n  code:\n    path: /tmp/x\n    workdir: true\n",
        )
        .unwrap()
    }

    #[test]
    fn render_writes_all_expected_files() {
        let config = demo_config();
        let tmp = TempDir::new().unwrap();
        BuildContext::render(&config, tmp.path()).unwrap();

        for name in [
            "Dockerfile",
            "entrypoint.sh",
            ".tmux.conf",
            "statusline.sh",
            "bootstrap-plugins.sh",
            "plugins.json",
            "claude.json",
            "settings.json",
        ] {
            assert!(tmp.path().join(name).exists(), "missing {name}");
        }
        assert!(!tmp.path().join("requirements.txt").exists());
    }

    #[test]
    fn bypass_all_adds_permission_settings() {
        let config = ScadConfig::parse(
            "demo",
            "name: demo\nrepos:\n  code: { path: /tmp/x, workdir: true }\nagent:\n  permission_mode: bypassAll\n",
        )
        .unwrap();
        let settings = render_settings_json(&config);
        assert_eq!(settings["permissions"]["defaultMode"], "bypassPermissions");
        assert_eq!(settings["skipDangerousModePermissionPrompt"], true);
    }

    #[test]
    fn requirements_file_copied_when_present() {
        let source_repo = TempDir::new().unwrap();
        std::fs::write(source_repo.path().join("requirements.txt"), "requests\n").unwrap();

        let yaml = format!(
            "name: demo\nrepos:\n  code:\n    path: {}\n    workdir: true\npython:\n  requirements: requirements.txt\n",
            source_repo.path().display()
        );
        let config = ScadConfig::parse("demo", &yaml).unwrap();

        let staging = TempDir::new().unwrap();
        BuildContext::render(&config, staging.path()).unwrap();
        assert!(staging.path().join("requirements.txt").exists());
    }
}
