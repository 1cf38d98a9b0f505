// ABOUTME: File-backed history writing one JSON line per record snapshot.
// ABOUTME: Files are opened in append mode only; earlier lines are never rewritten.

use async_trait::async_trait;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::error::{DecodeSnafu, EncodeSnafu, IoSnafu};
use super::{DeploymentRecord, HistoryError, HistoryStore, collapse};
use crate::types::EnvironmentName;

/// History stored under `<dir>/<environment>.jsonl`.
pub struct JsonlHistory {
    dir: PathBuf,
    write: Mutex<()>,
}

impl JsonlHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, environment: EnvironmentName) -> PathBuf {
        self.dir.join(format!("{}.jsonl", environment))
    }

    async fn read_snapshots(
        &self,
        environment: EnvironmentName,
    ) -> Result<Vec<DeploymentRecord>, HistoryError> {
        let path = self.path_for(environment);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(IoSnafu { path }),
        };

        let complete = content.ends_with('\n');
        let lines: Vec<&str> = content.lines().collect();
        let mut snapshots = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeploymentRecord>(line) {
                Ok(record) => snapshots.push(record),
                // A write interrupted mid-line leaves an unterminated tail.
                Err(e) if index + 1 == lines.len() && !complete => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        "ignoring truncated history entry: {}",
                        e
                    );
                }
                Err(e) => {
                    return Err(e).context(DecodeSnafu {
                        path: path.clone(),
                        line: index + 1,
                    });
                }
            }
        }

        Ok(snapshots)
    }
}

#[async_trait]
impl HistoryStore for JsonlHistory {
    async fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(record).context(EncodeSnafu)?;
        line.push('\n');

        let path = self.path_for(record.environment);
        let _guard = self.write.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .context(IoSnafu { path: &self.dir })?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context(IoSnafu { path: &path })?;
        file.write_all(line.as_bytes())
            .await
            .context(IoSnafu { path: &path })?;
        file.flush().await.context(IoSnafu { path: &path })?;

        tracing::debug!(
            environment = %record.environment,
            deployment = %record.id.short(),
            state = %record.state,
            "history snapshot appended"
        );
        Ok(())
    }

    async fn records(
        &self,
        environment: EnvironmentName,
    ) -> Result<Vec<DeploymentRecord>, HistoryError> {
        Ok(collapse(self.read_snapshots(environment).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::DeploymentState;
    use crate::types::{ArtifactRef, CommitSha, Digest};
    use tempfile::TempDir;

    fn record(digest: &str) -> DeploymentRecord {
        DeploymentRecord::new(
            EnvironmentName::Staging,
            ArtifactRef::new(
                "registry.example.com/app",
                Some("abc1234".to_string()),
                Digest::parse(digest).unwrap(),
                CommitSha::new("abc1234").unwrap(),
            ),
        )
    }

    #[tokio::test]
    async fn appends_lines_and_collapses_on_read() {
        let dir = TempDir::new().unwrap();
        let history = JsonlHistory::new(dir.path().join("history"));

        let mut r = record("sha256:abc");
        history.append(&r).await.unwrap();
        r.advance(DeploymentState::Provisioning).unwrap();
        history.append(&r).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("history/staging.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let records = history.records(EnvironmentName::Staging).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, DeploymentState::Provisioning);
    }

    #[tokio::test]
    async fn missing_file_is_empty_history() {
        let dir = TempDir::new().unwrap();
        let history = JsonlHistory::new(dir.path());
        assert!(history.records(EnvironmentName::Dev).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let r = record("sha256:def");
        JsonlHistory::new(dir.path()).append(&r).await.unwrap();

        let reopened = JsonlHistory::new(dir.path());
        let latest = reopened
            .latest(EnvironmentName::Staging)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, r.id);
        assert_eq!(latest.artifact.digest().to_string(), "sha256:def");
    }

    #[tokio::test]
    async fn truncated_tail_is_ignored() {
        let dir = TempDir::new().unwrap();
        let history = JsonlHistory::new(dir.path());
        history.append(&record("sha256:abc")).await.unwrap();

        let path = dir.path().join("staging.jsonl");
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"id\":\"trunc");
        std::fs::write(&path, raw).unwrap();

        let records = history.records(EnvironmentName::Staging).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_middle_line_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("staging.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let history = JsonlHistory::new(dir.path());
        let err = history.records(EnvironmentName::Staging).await.unwrap_err();
        assert!(matches!(err, HistoryError::Decode { line: 1, .. }));
    }
}
