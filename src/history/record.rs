// ABOUTME: Deployment record and its lifecycle state as persisted in history.
// ABOUTME: State changes go through advance() so illegal transitions are rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::deploy::{DeployError, DeployErrorKind};
use crate::types::{ArtifactRef, BuildRequestId, DeploymentId, EnvironmentName};

/// Lifecycle state of a deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// Created, waiting for approval.
    Pending,
    Provisioning,
    Verifying,
    /// Terminal success; eligible for promotion.
    Healthy,
    /// Terminal; the previous Healthy artifact was re-applied.
    RolledBack,
    Failed,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Healthy | DeploymentState::RolledBack | DeploymentState::Failed
        )
    }

    pub fn can_transition_to(&self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        matches!(
            (self, next),
            (Pending, Provisioning)
                | (Pending, Failed)
                | (Provisioning, Verifying)
                | (Provisioning, Failed)
                | (Verifying, Healthy)
                | (Verifying, RolledBack)
                | (Verifying, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Pending => "pending",
            DeploymentState::Provisioning => "provisioning",
            DeploymentState::Verifying => "verifying",
            DeploymentState::Healthy => "healthy",
            DeploymentState::RolledBack => "rolled_back",
            DeploymentState::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error kind and message captured when a record fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: DeployErrorKind,
    pub message: String,
}

impl From<&DeployError> for RecordedError {
    fn from(err: &DeployError) -> Self {
        RecordedError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Who approved a gated deployment, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approver: String,
    pub approved_at: DateTime<Utc>,
}

/// One deployment of one artifact to one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub environment: EnvironmentName,
    pub artifact: ArtifactRef,
    pub state: DeploymentState,
    pub started_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
    /// Provisioning attempts made so far.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalRecord>,
    /// Artifact re-applied by rollback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_to: Option<ArtifactRef>,
    /// Healthy deployment this one was promoted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_from: Option<DeploymentId>,
    #[serde(default)]
    pub requires_intervention: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_request_id: Option<BuildRequestId>,
}

impl DeploymentRecord {
    pub fn new(environment: EnvironmentName, artifact: ArtifactRef) -> Self {
        let now = Utc::now();
        DeploymentRecord {
            id: DeploymentId::generate(),
            environment,
            artifact,
            state: DeploymentState::Pending,
            started_at: now,
            last_transition_at: now,
            attempt: 0,
            error: None,
            approval: None,
            rolled_back_to: None,
            promoted_from: None,
            requires_intervention: false,
            build_request_id: None,
        }
    }

    /// Move to `next`, returning the previous state.
    pub fn advance(&mut self, next: DeploymentState) -> Result<DeploymentState, DeployError> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(DeployError::InvalidTransition { from, to: next });
        }
        self.state = next;
        self.last_transition_at = Utc::now().max(self.last_transition_at);
        Ok(from)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommitSha, Digest};

    fn record() -> DeploymentRecord {
        let artifact = ArtifactRef::new(
            "registry.example.com/app",
            Some("abc1234".to_string()),
            Digest::parse("sha256:abc").unwrap(),
            CommitSha::new("abc1234").unwrap(),
        );
        DeploymentRecord::new(EnvironmentName::Dev, artifact)
    }

    #[test]
    fn new_record_is_pending() {
        let r = record();
        assert_eq!(r.state, DeploymentState::Pending);
        assert_eq!(r.started_at, r.last_transition_at);
        assert!(!r.is_terminal());
    }

    #[test]
    fn happy_path_transitions() {
        let mut r = record();
        assert_eq!(
            r.advance(DeploymentState::Provisioning).unwrap(),
            DeploymentState::Pending
        );
        r.advance(DeploymentState::Verifying).unwrap();
        r.advance(DeploymentState::Healthy).unwrap();
        assert!(r.is_terminal());
        assert!(r.last_transition_at >= r.started_at);
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            DeploymentState::Healthy,
            DeploymentState::RolledBack,
            DeploymentState::Failed,
        ] {
            for next in [
                DeploymentState::Pending,
                DeploymentState::Provisioning,
                DeploymentState::Verifying,
                DeploymentState::Healthy,
                DeploymentState::RolledBack,
                DeploymentState::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn pending_cannot_skip_to_verifying() {
        let mut r = record();
        let err = r.advance(DeploymentState::Verifying).unwrap_err();
        assert!(matches!(
            err,
            DeployError::InvalidTransition {
                from: DeploymentState::Pending,
                to: DeploymentState::Verifying
            }
        ));
        assert_eq!(r.state, DeploymentState::Pending);
    }

    #[test]
    fn rolled_back_only_from_verifying() {
        assert!(DeploymentState::Verifying.can_transition_to(DeploymentState::RolledBack));
        assert!(!DeploymentState::Provisioning.can_transition_to(DeploymentState::RolledBack));
        assert!(!DeploymentState::Pending.can_transition_to(DeploymentState::RolledBack));
    }

    #[test]
    fn serializes_state_snake_case() {
        let json = serde_json::to_string(&DeploymentState::RolledBack).unwrap();
        assert_eq!(json, "\"rolled_back\"");
    }

    #[test]
    fn record_survives_json() {
        let mut r = record();
        r.approval = Some(ApprovalRecord {
            approver: "alice".to_string(),
            approved_at: Utc::now(),
        });
        let json = serde_json::to_string(&r).unwrap();
        let back: DeploymentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
