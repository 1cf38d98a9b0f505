// ABOUTME: Alert sink collecting events in memory.
// ABOUTME: Lets tests and embedders inspect exactly what was dispatched.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AlertEvent, AlertSink, TransportError};

#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<AlertEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AlertSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), TransportError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
