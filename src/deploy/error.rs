// ABOUTME: Error types for deployment orchestration.
// ABOUTME: Wraps provider, verifier and persistence failures with a kind for programmatic handling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::health::VerificationError;
use crate::history::{DeploymentState, HistoryError};
use crate::provision::ProvisionError;
use crate::registry::RegistryError;
use crate::secrets::SecretError;
use crate::types::EnvironmentName;

/// Errors that can end a deployment or reject a request.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The request or configuration cannot be acted on.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No trigger table entry matches the branch or tag.
    #[error("no trigger mapping for '{0}'")]
    UnmappedTrigger(String),

    #[error("registry lookup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("secret resolution failed: {0}")]
    Secret(#[from] SecretError),

    /// Provisioning failed fatally or exhausted its retries.
    #[error("provisioning failed after {attempts} attempt(s): {source}")]
    Provision {
        #[source]
        source: ProvisionError,
        attempts: u32,
    },

    #[error("provisioning timed out after {0:?}")]
    ProvisionTimeout(Duration),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Verification failed and no earlier Healthy deployment exists.
    #[error("{cause}; no healthy deployment in {environment} to roll back to")]
    NoRollbackTarget {
        environment: EnvironmentName,
        cause: VerificationError,
    },

    /// Verification failed and re-applying the previous artifact failed too.
    #[error("{cause}; rollback to {target} failed: {reason}")]
    RollbackFailed {
        cause: VerificationError,
        target: String,
        reason: String,
    },

    #[error("no approval received within {0:?}")]
    ApprovalTimeout(Duration),

    #[error("deployment cancelled")]
    Cancelled,

    /// A previous orchestrator stopped while the deployment was in this state.
    #[error("orchestrator stopped while the deployment was {0}")]
    Interrupted(DeploymentState),

    #[error("promotion not allowed: {0}")]
    PromotionNotAllowed(String),

    #[error("{0} is the last environment in the promotion order")]
    NoNextEnvironment(EnvironmentName),

    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition {
        from: DeploymentState,
        to: DeploymentState,
    },

    #[error("history store failed: {0}")]
    History(#[from] HistoryError),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployErrorKind {
    Configuration,
    Registry,
    Secret,
    Provision,
    Verification,
    Rollback,
    ApprovalTimeout,
    Cancelled,
    Interrupted,
    Promotion,
    InvalidTransition,
    Persistence,
}

impl DeployError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Configuration(_) | DeployError::UnmappedTrigger(_) => {
                DeployErrorKind::Configuration
            }
            DeployError::Registry(_) => DeployErrorKind::Registry,
            DeployError::Secret(_) => DeployErrorKind::Secret,
            DeployError::Provision { .. } | DeployError::ProvisionTimeout(_) => {
                DeployErrorKind::Provision
            }
            DeployError::Verification(_) | DeployError::NoRollbackTarget { .. } => {
                DeployErrorKind::Verification
            }
            DeployError::RollbackFailed { .. } => DeployErrorKind::Rollback,
            DeployError::ApprovalTimeout(_) => DeployErrorKind::ApprovalTimeout,
            DeployError::Cancelled => DeployErrorKind::Cancelled,
            DeployError::Interrupted(_) => DeployErrorKind::Interrupted,
            DeployError::PromotionNotAllowed(_) | DeployError::NoNextEnvironment(_) => {
                DeployErrorKind::Promotion
            }
            DeployError::InvalidTransition { .. } => DeployErrorKind::InvalidTransition,
            DeployError::History(_) => DeployErrorKind::Persistence,
        }
    }

    /// Returns the provider error if provisioning failed.
    pub fn provision_error(&self) -> Option<&ProvisionError> {
        match self {
            DeployError::Provision { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl DeployErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployErrorKind::Configuration => "configuration",
            DeployErrorKind::Registry => "registry",
            DeployErrorKind::Secret => "secret",
            DeployErrorKind::Provision => "provision",
            DeployErrorKind::Verification => "verification",
            DeployErrorKind::Rollback => "rollback",
            DeployErrorKind::ApprovalTimeout => "approval_timeout",
            DeployErrorKind::Cancelled => "cancelled",
            DeployErrorKind::Interrupted => "interrupted",
            DeployErrorKind::Promotion => "promotion",
            DeployErrorKind::InvalidTransition => "invalid_transition",
            DeployErrorKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for DeployErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
