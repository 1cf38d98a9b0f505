// ABOUTME: Structured alerts emitted on deployment state transitions.
// ABOUTME: Defines the event, the sink boundary and the fire-and-forget dispatcher.

mod dispatcher;
mod hooks;
mod log;
mod memory;
mod webhook;

pub use dispatcher::AlertDispatcher;
pub use hooks::HookSink;
pub use log::LogSink;
pub use memory::MemorySink;
pub use webhook::WebhookSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::history::{DeploymentRecord, DeploymentState, RecordedError};
use crate::types::{ArtifactRef, DeploymentId, EnvironmentName};

/// How loudly an alert should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        })
    }
}

/// A state transition of one deployment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEvent {
    pub deployment: DeploymentId,
    pub environment: EnvironmentName,
    pub artifact: ArtifactRef,
    /// None when the record was just created.
    pub from_state: Option<DeploymentState>,
    pub to_state: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
    pub attempt: u32,
    pub requires_intervention: bool,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn from_record(record: &DeploymentRecord, from_state: Option<DeploymentState>) -> Self {
        AlertEvent {
            deployment: record.id.clone(),
            environment: record.environment,
            artifact: record.artifact.clone(),
            from_state,
            to_state: record.state,
            error: record.error.clone(),
            attempt: record.attempt,
            requires_intervention: record.requires_intervention,
            timestamp: record.last_transition_at,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.to_state {
            DeploymentState::Failed => Severity::Critical,
            DeploymentState::RolledBack => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let from = self
            .from_state
            .map(|s| s.as_str())
            .unwrap_or("created");
        let mut line = format!(
            "{} {} {} -> {} ({})",
            self.environment,
            self.deployment.short(),
            from,
            self.to_state,
            self.artifact.digest().short()
        );
        if let Some(ref error) = self.error {
            line.push_str(&format!(": {}", error.message));
        }
        if self.requires_intervention {
            line.push_str(" [manual intervention required]");
        }
        line
    }
}

/// Delivery failure of a single sink. Logged by the dispatcher, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http delivery failed: {0}")]
    Http(#[from] crate::http::HttpError),

    #[error("endpoint returned status {0}")]
    Status(u16),

    #[error("failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("hook {script} failed with exit code {code:?}: {stderr}")]
    Hook {
        script: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery timed out")]
    Timeout,
}

/// Destination for alert events.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &AlertEvent) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::DeployErrorKind;
    use crate::types::{CommitSha, Digest};

    fn record(state: DeploymentState) -> DeploymentRecord {
        let mut r = DeploymentRecord::new(
            EnvironmentName::Prod,
            ArtifactRef::new(
                "registry.example.com/app",
                None,
                Digest::parse("sha256:abcdef0123").unwrap(),
                CommitSha::new("abc1234").unwrap(),
            ),
        );
        r.state = state;
        r
    }

    #[test]
    fn severity_follows_target_state() {
        let healthy = AlertEvent::from_record(&record(DeploymentState::Healthy), None);
        let rolled = AlertEvent::from_record(&record(DeploymentState::RolledBack), None);
        let failed = AlertEvent::from_record(&record(DeploymentState::Failed), None);
        assert_eq!(healthy.severity(), Severity::Info);
        assert_eq!(rolled.severity(), Severity::Warning);
        assert_eq!(failed.severity(), Severity::Critical);
    }

    #[test]
    fn summary_includes_error_and_intervention() {
        let mut r = record(DeploymentState::Failed);
        r.error = Some(RecordedError {
            kind: DeployErrorKind::Provision,
            message: "quota exceeded".to_string(),
        });
        r.requires_intervention = true;

        let event = AlertEvent::from_record(&r, Some(DeploymentState::Provisioning));
        let summary = event.summary();
        assert!(summary.contains("provisioning -> failed"));
        assert!(summary.contains("quota exceeded"));
        assert!(summary.contains("manual intervention"));
    }

    #[test]
    fn serializes_with_states() {
        let event = AlertEvent::from_record(
            &record(DeploymentState::Healthy),
            Some(DeploymentState::Verifying),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from_state"], "verifying");
        assert_eq!(json["to_state"], "healthy");
        assert_eq!(json["environment"], "prod");
    }
}
