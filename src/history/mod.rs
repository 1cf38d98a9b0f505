// ABOUTME: Append-only deployment history used for audit, status and rollback.
// ABOUTME: Defines the store boundary plus in-memory and JSON-lines implementations.

mod error;
mod jsonl;
mod memory;
mod record;

pub use error::HistoryError;
pub use jsonl::JsonlHistory;
pub use memory::MemoryHistory;
pub use record::{ApprovalRecord, DeploymentRecord, DeploymentState, RecordedError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{DeploymentId, EnvironmentName};

/// Persisted deployment history, keyed by `(environment, started_at)`.
///
/// `append` stores a snapshot and never rewrites earlier ones. Readers see
/// one record per deployment: its most recent snapshot, ordered by start time.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError>;

    async fn records(
        &self,
        environment: EnvironmentName,
    ) -> Result<Vec<DeploymentRecord>, HistoryError>;

    async fn get(
        &self,
        environment: EnvironmentName,
        started_at: DateTime<Utc>,
    ) -> Result<Option<DeploymentRecord>, HistoryError> {
        Ok(self
            .records(environment)
            .await?
            .into_iter()
            .find(|r| r.started_at == started_at))
    }

    async fn latest(
        &self,
        environment: EnvironmentName,
    ) -> Result<Option<DeploymentRecord>, HistoryError> {
        Ok(self.records(environment).await?.pop())
    }

    /// Most recent Healthy record other than `excluding`.
    async fn last_healthy(
        &self,
        environment: EnvironmentName,
        excluding: &DeploymentId,
    ) -> Result<Option<DeploymentRecord>, HistoryError> {
        Ok(self
            .records(environment)
            .await?
            .into_iter()
            .rev()
            .find(|r| r.state == DeploymentState::Healthy && &r.id != excluding))
    }
}

/// Reduce a snapshot log to the latest snapshot per deployment, ordered by start.
pub(crate) fn collapse(snapshots: impl IntoIterator<Item = DeploymentRecord>) -> Vec<DeploymentRecord> {
    let mut records: Vec<DeploymentRecord> = Vec::new();
    for snapshot in snapshots {
        match records.iter_mut().find(|r| r.id == snapshot.id) {
            Some(existing) => *existing = snapshot,
            None => records.push(snapshot),
        }
    }
    records.sort_by_key(|r| r.started_at);
    records
}
