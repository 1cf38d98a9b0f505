// ABOUTME: In-memory history store for tests and embedders.
// ABOUTME: Keeps every snapshot so tests can inspect intermediate states.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{DeploymentRecord, HistoryError, HistoryStore, collapse};
use crate::types::EnvironmentName;

#[derive(Default)]
pub struct MemoryHistory {
    snapshots: Mutex<HashMap<EnvironmentName, Vec<DeploymentRecord>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot appended for an environment, oldest first.
    pub fn snapshots(&self, environment: EnvironmentName) -> Vec<DeploymentRecord> {
        self.snapshots
            .lock()
            .get(&environment)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError> {
        self.snapshots
            .lock()
            .entry(record.environment)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn records(
        &self,
        environment: EnvironmentName,
    ) -> Result<Vec<DeploymentRecord>, HistoryError> {
        Ok(collapse(self.snapshots(environment)))
    }
}
