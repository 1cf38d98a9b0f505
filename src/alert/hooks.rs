// ABOUTME: Alert sink running user scripts for deployment state transitions.
// ABOUTME: Looks for <state_dir>/hooks/on-<state> and passes the event via CONVOY_* variables.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{AlertEvent, AlertSink, TransportError};
use crate::history::DeploymentState;

/// Runs hook scripts from a hooks directory.
pub struct HookSink {
    hooks_dir: PathBuf,
}

impl HookSink {
    /// Look for hooks in `<state_dir>/hooks`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            hooks_dir: state_dir.join("hooks"),
        }
    }

    pub fn hook_exists(&self, state: DeploymentState) -> bool {
        self.hook_path(state).is_file()
    }

    fn hook_path(&self, state: DeploymentState) -> PathBuf {
        self.hooks_dir.join(hook_filename(state))
    }
}

/// Script name for a target state, e.g. `on-rolled-back`.
pub fn hook_filename(state: DeploymentState) -> String {
    format!("on-{}", state.as_str().replace('_', "-"))
}

/// Event fields exposed to hook scripts.
pub fn hook_env(event: &AlertEvent) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("CONVOY_DEPLOYMENT".to_string(), event.deployment.to_string());
    env.insert("CONVOY_ENVIRONMENT".to_string(), event.environment.to_string());
    env.insert("CONVOY_STATE".to_string(), event.to_state.to_string());
    if let Some(from) = event.from_state {
        env.insert("CONVOY_FROM_STATE".to_string(), from.to_string());
    }
    env.insert("CONVOY_IMAGE".to_string(), event.artifact.pinned());
    env.insert("CONVOY_DIGEST".to_string(), event.artifact.digest().to_string());
    env.insert("CONVOY_COMMIT".to_string(), event.artifact.commit_sha().to_string());
    env.insert("CONVOY_ATTEMPT".to_string(), event.attempt.to_string());
    env.insert("CONVOY_SEVERITY".to_string(), event.severity().to_string());
    env.insert(
        "CONVOY_REQUIRES_INTERVENTION".to_string(),
        event.requires_intervention.to_string(),
    );
    if let Some(ref error) = event.error {
        env.insert("CONVOY_ERROR_KIND".to_string(), error.kind.to_string());
        env.insert("CONVOY_ERROR".to_string(), error.message.clone());
    }
    env
}

#[async_trait]
impl AlertSink for HookSink {
    fn name(&self) -> &str {
        "hooks"
    }

    /// A missing script is not an error.
    async fn deliver(&self, event: &AlertEvent) -> Result<(), TransportError> {
        let hook_path = self.hook_path(event.to_state);
        if !hook_path.is_file() {
            return Ok(());
        }

        tracing::info!("Running {} hook: {}", hook_filename(event.to_state), hook_path.display());

        let output = Command::new(&hook_path)
            .envs(hook_env(event))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            tracing::debug!("{} hook completed successfully", hook_filename(event.to_state));
            Ok(())
        } else {
            Err(TransportError::Hook {
                script: hook_path.display().to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
