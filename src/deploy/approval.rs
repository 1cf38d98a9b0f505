// ABOUTME: Approval gate holding gated deployments in Pending until someone signs off.
// ABOUTME: Approvals can arrive before the request, in-process or as files in the state dir.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::cancel::CancelSignal;
use super::error::DeployError;
use crate::types::{Digest, EnvironmentName};

/// An external sign-off for one deployment to one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approver: String,
    /// When set, only a deployment of this digest may consume the approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
    pub approved_at: DateTime<Utc>,
}

impl Approval {
    pub fn new(approver: impl Into<String>, digest: Option<Digest>) -> Self {
        Self {
            approver: approver.into(),
            digest,
            approved_at: Utc::now(),
        }
    }

    fn covers(&self, digest: &Digest) -> bool {
        self.digest.as_ref().is_none_or(|d| d == digest)
    }
}

/// Outstanding approvals per environment. Each approval admits one deployment.
#[derive(Default)]
pub struct ApprovalGate {
    pending: Mutex<HashMap<EnvironmentName, Vec<Approval>>>,
    waiting: Mutex<HashMap<EnvironmentName, usize>>,
    arrived: Notify,
}

/// Counts a deployment as waiting for as long as it lives.
struct Waiting<'a> {
    gate: &'a ApprovalGate,
    environment: EnvironmentName,
}

impl<'a> Waiting<'a> {
    fn register(gate: &'a ApprovalGate, environment: EnvironmentName) -> Self {
        *gate.waiting.lock().entry(environment).or_default() += 1;
        Self { gate, environment }
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        let mut waiting = self.gate.waiting.lock();
        if let Some(count) = waiting.get_mut(&self.environment) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                waiting.remove(&self.environment);
            }
        }
    }
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn approve(&self, environment: EnvironmentName, approval: Approval) {
        tracing::info!(
            %environment,
            approver = %approval.approver,
            digest = approval.digest.as_ref().map(|d| d.to_string()).unwrap_or_default(),
            "Approval received"
        );
        self.pending.lock().entry(environment).or_default().push(approval);
        self.arrived.notify_waiters();
    }

    /// Consume the oldest approval covering `digest`.
    pub fn take(&self, environment: EnvironmentName, digest: &Digest) -> Option<Approval> {
        let mut pending = self.pending.lock();
        let approvals = pending.get_mut(&environment)?;
        let index = approvals.iter().position(|a| a.covers(digest))?;
        Some(approvals.remove(index))
    }

    pub fn outstanding(&self, environment: EnvironmentName) -> usize {
        self.pending
            .lock()
            .get(&environment)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Whether a deployment to `environment` is currently held for approval.
    pub fn is_waiting(&self, environment: EnvironmentName) -> bool {
        self.waiting.lock().contains_key(&environment)
    }

    /// Wait for an approval covering `digest`.
    ///
    /// Fails with `ApprovalTimeout` once `timeout` elapses and with
    /// `Cancelled` if the deployment is cancelled first.
    pub async fn wait(
        &self,
        environment: EnvironmentName,
        digest: &Digest,
        timeout: Duration,
        cancel: &mut CancelSignal,
    ) -> Result<Approval, DeployError> {
        let deadline = Instant::now() + timeout;
        let _waiting = Waiting::register(self, environment);
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            // Register before checking so an approval between the two is not missed.
            notified.as_mut().enable();

            if let Some(approval) = self.take(environment, digest) {
                return Ok(approval);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(DeployError::ApprovalTimeout(timeout));
                }
                _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            }
        }
    }
}

/// Approval dropped on disk by `convoy approve` for a running orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApprovalFile {
    approver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<Digest>,
    approved_at: DateTime<Utc>,
}

/// How long an approval file stays valid unless configured otherwise.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Directory of `<environment>.json` approval files.
#[derive(Debug, Clone)]
pub struct FileApprovals {
    dir: PathBuf,
    max_age: Duration,
}

impl FileApprovals {
    /// Approvals under `<state_dir>/approvals`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("approvals"),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Discard files approved more than `max_age` ago instead of feeding them
    /// to the gate.
    pub fn expiring_after(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    fn is_expired(&self, file: &ApprovalFile) -> bool {
        (Utc::now() - file.approved_at)
            .to_std()
            .is_ok_and(|age| age > self.max_age)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, environment: EnvironmentName) -> PathBuf {
        self.dir.join(format!("{}.json", environment))
    }

    /// Write an approval file, replacing any earlier one for the environment.
    pub fn write(&self, environment: EnvironmentName, approval: &Approval) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let file = ApprovalFile {
            approver: approval.approver.clone(),
            digest: approval.digest.clone(),
            approved_at: approval.approved_at,
        };
        let json = serde_json::to_string_pretty(&file).map_err(std::io::Error::other)?;
        let path = self.path_for(environment);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Move approval files for environments with a waiting deployment into
    /// the gate. Files for idle environments stay on disk; expired files are
    /// deleted. Returns how many were fed to the gate.
    pub fn collect(&self, gate: &ApprovalGate) -> usize {
        let mut consumed = 0;
        for environment in EnvironmentName::ALL {
            if !gate.is_waiting(environment) {
                continue;
            }
            let path = self.path_for(environment);
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!("Failed to read approval {}: {}", path.display(), e);
                    continue;
                }
            };
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove approval {}: {}", path.display(), e);
                continue;
            }
            match serde_json::from_str::<ApprovalFile>(&content) {
                Ok(file) if self.is_expired(&file) => tracing::warn!(
                    %environment,
                    approver = %file.approver,
                    approved_at = %file.approved_at,
                    "Ignoring approval older than {}s",
                    self.max_age.as_secs()
                ),
                Ok(file) => {
                    gate.approve(
                        environment,
                        Approval {
                            approver: file.approver,
                            digest: file.digest,
                            approved_at: file.approved_at,
                        },
                    );
                    consumed += 1;
                }
                Err(e) => tracing::warn!("Ignoring malformed approval {}: {}", path.display(), e),
            }
        }
        consumed
    }

    /// Poll the directory until `stop` fires.
    pub fn watch(
        self,
        gate: Arc<ApprovalGate>,
        interval: Duration,
        mut stop: CancelSignal,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.collect(&gate);
                    }
                    _ = stop.cancelled() => break,
                }
            }
            tracing::debug!("approval watcher stopped");
        })
    }
}
