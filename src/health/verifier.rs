// ABOUTME: Debounced health verifier polling an environment until healthy or timed out.
// ABOUTME: Requires consecutive healthy observations so a flapping service does not pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{HealthProbe, Observation};
use crate::config::HealthConfig;
use crate::types::EnvironmentName;

/// Why an environment failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhealthyReason {
    /// No observation ever saw a running instance.
    NoInstancesRunning,
    /// Too many consecutive unhealthy observations.
    RepeatedHealthCheckFailure,
    /// The verification window elapsed without a healthy streak.
    Timeout,
}

impl fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnhealthyReason::NoInstancesRunning => "no instances running",
            UnhealthyReason::RepeatedHealthCheckFailure => "repeated health check failure",
            UnhealthyReason::Timeout => "timed out",
        };
        f.write_str(s)
    }
}

/// Verification failed; drives rollback and is never retried directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{environment} unhealthy: {reason} after {polls} poll(s)")]
pub struct VerificationError {
    pub environment: EnvironmentName,
    pub reason: UnhealthyReason,
    pub polls: u32,
    /// Last probe error or observation summary.
    pub detail: Option<String>,
}

/// Successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    pub polls: u32,
    pub last: Observation,
}

#[derive(Default)]
struct Tracker {
    polls: u32,
    consecutive_healthy: u32,
    consecutive_failures: u32,
    observations: u32,
    probe_errors: u32,
    saw_instances: bool,
    detail: Option<String>,
}

impl Tracker {
    fn record(&mut self, observation: &Observation) {
        self.observations += 1;
        if observation.running > 0 {
            self.saw_instances = true;
        }
        if observation.is_healthy() {
            self.consecutive_healthy += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_healthy = 0;
            self.consecutive_failures += 1;
            self.detail = Some(format!(
                "{}/{} running, healthy={}",
                observation.running, observation.desired, observation.healthy
            ));
        }
    }

    fn record_error(&mut self, detail: String) {
        self.probe_errors += 1;
        self.consecutive_healthy = 0;
        self.consecutive_failures += 1;
        self.detail = Some(detail);
    }

    /// Every poll returned an observation and none saw a running instance.
    /// A failed or hung probe is not an observation.
    fn never_running(&self) -> bool {
        self.observations > 0 && self.probe_errors == 0 && !self.saw_instances
    }

    fn failure_reason(&self, otherwise: UnhealthyReason) -> UnhealthyReason {
        if self.never_running() {
            UnhealthyReason::NoInstancesRunning
        } else {
            otherwise
        }
    }
}

/// Polls a [`HealthProbe`] until the environment proves healthy.
pub struct HealthVerifier {
    probe: Arc<dyn HealthProbe>,
    probe_timeout: Duration,
    healthy_threshold: u32,
    failure_threshold: Option<u32>,
}

impl HealthVerifier {
    pub fn new(probe: Arc<dyn HealthProbe>, config: &HealthConfig) -> Self {
        Self {
            probe,
            probe_timeout: config.probe_timeout,
            healthy_threshold: config.healthy_threshold.max(1),
            failure_threshold: config.failure_threshold,
        }
    }

    /// Poll `environment` every `poll_interval` until `healthy_threshold`
    /// consecutive healthy observations or until `timeout` elapses.
    ///
    /// The timeout is a hard bound: a probe that hangs is abandoned.
    pub async fn verify(
        &self,
        environment: EnvironmentName,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<VerifyReport, VerificationError> {
        let mut tracker = Tracker::default();

        let polled = tokio::time::timeout(
            timeout,
            self.poll(environment, poll_interval, &mut tracker),
        )
        .await;

        match polled {
            Ok(result) => result,
            Err(_elapsed) => {
                let reason = tracker.failure_reason(UnhealthyReason::Timeout);
                tracing::debug!(
                    environment = %environment,
                    polls = tracker.polls,
                    ?reason,
                    "Health verification window elapsed"
                );
                Err(VerificationError {
                    environment,
                    reason,
                    polls: tracker.polls,
                    detail: tracker.detail,
                })
            }
        }
    }

    async fn poll(
        &self,
        environment: EnvironmentName,
        poll_interval: Duration,
        tracker: &mut Tracker,
    ) -> Result<VerifyReport, VerificationError> {
        loop {
            tracker.polls += 1;

            match tokio::time::timeout(self.probe_timeout, self.probe.observe(environment)).await
            {
                Ok(Ok(observation)) => {
                    tracker.record(&observation);
                    tracing::debug!(
                        environment = %environment,
                        poll = tracker.polls,
                        running = observation.running,
                        healthy = observation.healthy,
                        "Health observation"
                    );
                    if tracker.consecutive_healthy >= self.healthy_threshold {
                        return Ok(VerifyReport {
                            polls: tracker.polls,
                            last: observation,
                        });
                    }
                }
                Ok(Err(e)) => {
                    tracing::debug!(environment = %environment, error = %e, "Health probe failed");
                    tracker.record_error(e.to_string());
                }
                Err(_) => {
                    tracker.record_error(format!(
                        "probe timed out after {}s",
                        self.probe_timeout.as_secs()
                    ));
                }
            }

            if let Some(limit) = self.failure_threshold
                && tracker.consecutive_failures >= limit
            {
                return Err(VerificationError {
                    environment,
                    reason: tracker.failure_reason(UnhealthyReason::RepeatedHealthCheckFailure),
                    polls: tracker.polls,
                    detail: tracker.detail.take(),
                });
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}
