// ABOUTME: Health verification polling configuration.
// ABOUTME: Defines poll cadence, probe timeout and debounce thresholds with defaults.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Consecutive healthy observations required before trusting the result.
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    /// Consecutive unhealthy observations that end verification early.
    /// Unset means only the verification timeout ends a failing run.
    #[serde(default)]
    pub failure_threshold: Option<u32>,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_healthy_threshold() -> u32 {
    2
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            poll_interval: default_poll_interval(),
            probe_timeout: default_probe_timeout(),
            healthy_threshold: default_healthy_threshold(),
            failure_threshold: None,
        }
    }
}
