// ABOUTME: Alert sink writing events as tracing records.
// ABOUTME: Level follows severity: failures at error, rollbacks at warn.

use async_trait::async_trait;

use super::{AlertEvent, AlertSink, Severity, TransportError};

pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), TransportError> {
        let summary = event.summary();
        match event.severity() {
            Severity::Critical => tracing::error!(
                environment = %event.environment,
                deployment = %event.deployment.short(),
                digest = %event.artifact.digest(),
                attempt = event.attempt,
                "{}",
                summary
            ),
            Severity::Warning => tracing::warn!(
                environment = %event.environment,
                deployment = %event.deployment.short(),
                digest = %event.artifact.digest(),
                "{}",
                summary
            ),
            Severity::Info => tracing::info!(
                environment = %event.environment,
                deployment = %event.deployment.short(),
                digest = %event.artifact.digest(),
                "{}",
                summary
            ),
        }
        Ok(())
    }
}
