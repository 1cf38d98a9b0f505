// ABOUTME: Deployment environment names.
// ABOUTME: The closed set of stages an artifact is promoted through.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown environment: {0} (expected dev, staging or prod)")]
pub struct EnvironmentNameError(pub String);

/// A target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentName {
    Dev,
    Staging,
    Prod,
}

impl EnvironmentName {
    pub const ALL: [EnvironmentName; 3] = [
        EnvironmentName::Dev,
        EnvironmentName::Staging,
        EnvironmentName::Prod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentName::Dev => "dev",
            EnvironmentName::Staging => "staging",
            EnvironmentName::Prod => "prod",
        }
    }

    /// Production is always approval-gated regardless of descriptor settings.
    pub fn is_production(&self) -> bool {
        matches!(self, EnvironmentName::Prod)
    }
}

impl FromStr for EnvironmentName {
    type Err = EnvironmentNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(EnvironmentName::Dev),
            "staging" | "stage" => Ok(EnvironmentName::Staging),
            "prod" | "production" => Ok(EnvironmentName::Prod),
            _ => Err(EnvironmentNameError(s.to_string())),
        }
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
