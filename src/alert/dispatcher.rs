// ABOUTME: Bounded queue and background worker fanning alerts out to sinks.
// ABOUTME: notify() never blocks or fails; delivery errors are logged and dropped.

use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AlertEvent, AlertSink, TransportError};

pub struct AlertDispatcher {
    sender: Mutex<Option<mpsc::Sender<AlertEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AlertDispatcher {
    /// Start the delivery worker. Must be called within a tokio runtime.
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>, capacity: usize, delivery_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, sinks, delivery_timeout));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// A dispatcher with no sinks; events are accepted and discarded.
    pub fn disabled() -> Self {
        Self {
            sender: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Queue an event for delivery.
    pub fn notify(&self, event: AlertEvent) {
        let guard = self.sender.lock();
        let Some(ref sender) = *guard else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    environment = %event.environment,
                    deployment = %event.deployment.short(),
                    "alert queue full, dropping {} event",
                    event.to_state
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("alert dispatcher stopped, dropping event");
            }
        }
    }

    /// Stop accepting events and wait until queued ones are delivered.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            tracing::warn!("alert worker ended abnormally: {}", e);
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<AlertEvent>,
    sinks: Vec<Arc<dyn AlertSink>>,
    delivery_timeout: Duration,
) {
    while let Some(event) = receiver.recv().await {
        let deliveries = sinks.iter().map(|sink| {
            let event = &event;
            async move {
                let result = match tokio::time::timeout(delivery_timeout, sink.deliver(event)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout),
                };
                if let Err(e) = result {
                    tracing::warn!(
                        sink = sink.name(),
                        environment = %event.environment,
                        deployment = %event.deployment.short(),
                        "alert delivery failed: {}",
                        e
                    );
                }
            }
        });
        join_all(deliveries).await;
    }
    tracing::debug!("alert worker drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MemorySink;
    use crate::history::{DeploymentRecord, DeploymentState};
    use crate::types::{ArtifactRef, CommitSha, Digest, EnvironmentName};
    use async_trait::async_trait;

    fn event() -> AlertEvent {
        let record = DeploymentRecord::new(
            EnvironmentName::Dev,
            ArtifactRef::new(
                "registry.example.com/app",
                None,
                Digest::parse("sha256:abc").unwrap(),
                CommitSha::new("abc1234").unwrap(),
            ),
        );
        AlertEvent::from_record(&record, None)
    }

    struct Broken;

    #[async_trait]
    impl AlertSink for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn deliver(&self, _: &AlertEvent) -> Result<(), TransportError> {
            Err(TransportError::Status(500))
        }
    }

    struct Stuck;

    #[async_trait]
    impl AlertSink for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn deliver(&self, _: &AlertEvent) -> Result<(), TransportError> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_drains_queue() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = AlertDispatcher::new(vec![sink.clone()], 16, Duration::from_secs(1));

        for _ in 0..5 {
            dispatcher.notify(event());
        }
        dispatcher.shutdown().await;

        assert_eq!(sink.events().len(), 5);
    }

    #[tokio::test]
    async fn failing_sink_does_not_affect_others() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = AlertDispatcher::new(
            vec![Arc::new(Broken), sink.clone()],
            16,
            Duration::from_secs(1),
        );

        dispatcher.notify(event());
        dispatcher.shutdown().await;

        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_sink_is_bounded_by_timeout() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = AlertDispatcher::new(
            vec![Arc::new(Stuck), sink.clone()],
            16,
            Duration::from_secs(10),
        );

        dispatcher.notify(event());
        dispatcher.notify(event());
        dispatcher.shutdown().await;

        assert_eq!(sink.events().len(), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let dispatcher = AlertDispatcher::new(vec![Arc::new(Stuck)], 1, Duration::from_secs(3600));
        for _ in 0..10 {
            dispatcher.notify(event());
        }
    }

    #[tokio::test]
    async fn disabled_dispatcher_accepts_events() {
        let dispatcher = AlertDispatcher::disabled();
        dispatcher.notify(event());
        dispatcher.shutdown().await;
    }

    #[test]
    fn event_state_is_carried() {
        assert_eq!(event().to_state, DeploymentState::Pending);
    }
}
