// ABOUTME: Health verification of deployed environments.
// ABOUTME: Exports the probe boundary, the debounced verifier and the HTTP probe.

mod http;
mod verifier;

pub use http::HttpProbe;
pub use verifier::{HealthVerifier, UnhealthyReason, VerificationError, VerifyReport};

use async_trait::async_trait;
use serde::Serialize;

use crate::types::EnvironmentName;

/// One reading of an environment's reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Observation {
    /// Instances currently running.
    pub running: u32,
    /// Instances the environment should have.
    pub desired: u32,
    /// Whether the running instances pass their health check.
    pub healthy: bool,
}

impl Observation {
    pub fn healthy(count: u32) -> Self {
        Self {
            running: count,
            desired: count,
            healthy: true,
        }
    }

    pub fn unhealthy(running: u32, desired: u32) -> Self {
        Self {
            running,
            desired,
            healthy: false,
        }
    }

    pub fn empty(desired: u32) -> Self {
        Self {
            running: 0,
            desired,
            healthy: false,
        }
    }

    /// Healthy means at least one instance is up and passing checks.
    pub fn is_healthy(&self) -> bool {
        self.running > 0 && self.healthy
    }
}

/// Errors from a single probe call.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("environment unreachable: {0}")]
    Unreachable(String),

    #[error("no health probe configured for {0}")]
    NotConfigured(EnvironmentName),
}

/// Reports an environment's current status.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn observe(&self, environment: EnvironmentName) -> Result<Observation, ProbeError>;
}
