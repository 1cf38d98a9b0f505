// ABOUTME: Jittered exponential backoff for retrying transient provisioning failures.
// ABOUTME: Attempts run strictly one after another and are bounded by max_attempts.

use rand::Rng;
use std::time::Duration;

use super::{ProvisionError, ProvisionResult, Provisioner};
use crate::config::{EnvironmentDescriptor, RetryConfig};
use crate::secrets::ResolvedSecrets;
use crate::types::ArtifactRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay, config.max_delay, config.max_attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Un-jittered delay after the given failed attempt (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Delay drawn uniformly from `[ceiling / 2, ceiling]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms == 0 {
            return ceiling;
        }
        let jittered = rand::rng().random_range(ceiling_ms / 2..=ceiling_ms);
        Duration::from_millis(jittered)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Reconcile, retrying only `TransientUnavailable` up to the attempt limit.
///
/// `attempts` is updated before each call so a caller that drops this
/// future (timeout, cancellation) still knows how far it got.
pub async fn reconcile_with_retry(
    provisioner: &dyn Provisioner,
    descriptor: &EnvironmentDescriptor,
    artifact: &ArtifactRef,
    secrets: &ResolvedSecrets,
    backoff: &Backoff,
    attempts: &mut u32,
) -> Result<ProvisionResult, ProvisionError> {
    loop {
        *attempts += 1;
        let attempt = *attempts;

        match provisioner.reconcile(descriptor, artifact, secrets).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < backoff.max_attempts() => {
                let delay = backoff.delay(attempt);
                tracing::warn!(
                    environment = %descriptor.name,
                    attempt,
                    max_attempts = backoff.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient provisioning failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ceiling_doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 5);
        assert_eq!(backoff.ceiling(1), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(2), Duration::from_secs(2));
        assert_eq!(backoff.ceiling(3), Duration::from_secs(4));
        assert_eq!(backoff.ceiling(4), Duration::from_secs(5));
        assert_eq!(backoff.ceiling(40), Duration::from_secs(5));
    }

    #[test]
    fn at_least_one_attempt() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(1), 0);
        assert_eq!(backoff.max_attempts(), 1);
    }

    proptest! {
        #[test]
        fn jittered_delay_stays_within_bounds(
            base_ms in 1u64..10_000,
            max_ms in 1u64..120_000,
            attempt in 1u32..64,
        ) {
            let backoff = Backoff::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
                3,
            );
            let ceiling = backoff.ceiling(attempt);
            let delay = backoff.delay(attempt);
            prop_assert!(delay <= ceiling);
            prop_assert!(delay >= ceiling / 2 - Duration::from_millis(1).min(ceiling / 2));
        }
    }
}
