// ABOUTME: Error types for infrastructure provisioning.
// ABOUTME: Only transient unavailability is retryable; every other kind is fatal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors reported by a provisioner's reconcile call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    /// The provider refused the request because an account or service limit was hit.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The orchestrator's credentials do not allow the requested change.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The provider rejected the desired state itself.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The provider could not be reached or asked us to try again later.
    #[error("provider temporarily unavailable: {0}")]
    TransientUnavailable(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionErrorKind {
    QuotaExceeded,
    PermissionDenied,
    InvalidConfiguration,
    TransientUnavailable,
}

impl ProvisionError {
    pub fn kind(&self) -> ProvisionErrorKind {
        match self {
            ProvisionError::QuotaExceeded(_) => ProvisionErrorKind::QuotaExceeded,
            ProvisionError::PermissionDenied(_) => ProvisionErrorKind::PermissionDenied,
            ProvisionError::InvalidConfiguration(_) => ProvisionErrorKind::InvalidConfiguration,
            ProvisionError::TransientUnavailable(_) => ProvisionErrorKind::TransientUnavailable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ProvisionErrorKind::TransientUnavailable
    }
}

impl fmt::Display for ProvisionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionErrorKind::QuotaExceeded => "quota_exceeded",
            ProvisionErrorKind::PermissionDenied => "permission_denied",
            ProvisionErrorKind::InvalidConfiguration => "invalid_configuration",
            ProvisionErrorKind::TransientUnavailable => "transient_unavailable",
        };
        f.write_str(s)
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ProvisionError::PermissionDenied(err.to_string()),
            _ => ProvisionError::TransientUnavailable(err.to_string()),
        }
    }
}
