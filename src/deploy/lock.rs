// ABOUTME: Locks serializing deployments: one per environment, one orchestrator per state dir.
// ABOUTME: The instance lock is an atomically created file carrying holder info.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::types::{EnvironmentName, ServiceName};

/// Lock file name inside the state directory.
pub const LOCK_FILENAME: &str = "convoy.lock";

/// Per-environment mutual exclusion, held from record creation to terminal state.
#[derive(Default)]
pub struct EnvironmentLocks {
    locks: Mutex<HashMap<EnvironmentName, Arc<tokio::sync::Mutex<()>>>>,
}

/// A held environment lock; released on drop.
#[derive(Debug)]
pub struct EnvironmentGuard {
    environment: EnvironmentName,
    _guard: OwnedMutexGuard<()>,
}

impl EnvironmentGuard {
    pub fn environment(&self) -> EnvironmentName {
        self.environment
    }
}

impl EnvironmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, environment: EnvironmentName) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(environment).or_default().clone()
    }

    /// Wait until the environment is free.
    pub async fn acquire(&self, environment: EnvironmentName) -> EnvironmentGuard {
        let guard = self.slot(environment).lock_owned().await;
        EnvironmentGuard {
            environment,
            _guard: guard,
        }
    }

    pub fn try_acquire(&self, environment: EnvironmentName) -> Option<EnvironmentGuard> {
        let guard = self.slot(environment).try_lock_owned().ok()?;
        Some(EnvironmentGuard {
            environment,
            _guard: guard,
        })
    }

    pub fn is_held(&self, environment: EnvironmentName) -> bool {
        self.slot(environment).try_lock().is_err()
    }
}

/// A holder that has not refreshed its lock for this long is presumed dead.
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// How often a running orchestrator refreshes its lock.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Information about who holds the instance lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Last heartbeat from the holder.
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
    pub service: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(service: &ServiceName) -> Self {
        let now = Utc::now();
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: now,
            refreshed_at: Some(now),
            service: service.to_string(),
        }
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.refreshed_at.unwrap_or(self.started_at)
    }

    /// Stale once the holder has been silent for [`STALE_AFTER`], however
    /// long ago it started.
    pub fn is_stale(&self) -> bool {
        (Utc::now() - self.last_seen())
            .to_std()
            .is_ok_and(|silent| silent >= STALE_AFTER)
    }

    fn same_holder(&self, other: &LockInfo) -> bool {
        self.holder == other.holder && self.pid == other.pid && self.started_at == other.started_at
    }

    pub fn lock_path(state_dir: &Path) -> PathBuf {
        state_dir.join(LOCK_FILENAME)
    }
}

/// Exclusive ownership of a state directory; the file is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    info: LockInfo,
    /// Set on drop; a heartbeat never writes after it.
    released: Arc<Mutex<bool>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl InstanceLock {
    /// Acquire the lock for `state_dir`.
    ///
    /// The lock file appears atomically with its content, so two processes
    /// cannot both win and nobody reads a half-written file. Locks whose
    /// holder stopped refreshing are broken with a warning; `force` breaks
    /// any lock.
    pub fn acquire(state_dir: &Path, service: &ServiceName, force: bool) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = LockInfo::lock_path(state_dir);
        let info = LockInfo::new(service);

        if Self::try_create(&path, &info)? {
            return Ok(Self::held(path, info));
        }

        match Self::read_existing(&path) {
            Some(existing) if !force && !existing.is_stale() => {
                return Err(Error::LockHeld {
                    path,
                    holder: existing.holder,
                    pid: existing.pid,
                    since: existing.started_at.to_rfc3339(),
                });
            }
            Some(existing) => {
                tracing::warn!(
                    "Breaking {}lock held by {} (pid {}) since {}, last seen {}",
                    if force { "" } else { "stale " },
                    existing.holder,
                    existing.pid,
                    existing.started_at,
                    existing.last_seen()
                );
            }
            None => tracing::warn!("Lock info unreadable, breaking lock"),
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if Self::try_create(&path, &info)? {
            return Ok(Self::held(path, info));
        }

        let existing = Self::read_existing(&path);
        Err(Error::LockHeld {
            path,
            holder: existing
                .as_ref()
                .map(|e| e.holder.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            pid: existing.as_ref().map(|e| e.pid).unwrap_or(0),
            since: existing
                .map(|e| e.started_at.to_rfc3339())
                .unwrap_or_default(),
        })
    }

    fn held(path: PathBuf, info: LockInfo) -> Self {
        Self {
            path,
            info,
            released: Arc::new(Mutex::new(false)),
            heartbeat: None,
        }
    }

    /// Refresh the lock every `interval` until it is dropped, so a long
    /// deployment is never taken for a dead holder. Needs a tokio runtime.
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        let path = self.path.clone();
        let info = self.info.clone();
        let released = self.released.clone();

        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                match Self::refresh(&path, &info, &released) {
                    Ok(true) => tracing::trace!("Refreshed lock {}", path.display()),
                    Ok(false) => {
                        tracing::debug!("Lock {} no longer ours, stopping heartbeat", path.display());
                        break;
                    }
                    Err(e) => tracing::warn!("Failed to refresh lock {}: {}", path.display(), e),
                }
            }
        }));
        self
    }

    /// Rewrite the lock with a new heartbeat if this process still holds it.
    fn refresh(path: &Path, info: &LockInfo, released: &Mutex<bool>) -> Result<bool> {
        let released = released.lock();
        if *released {
            return Ok(false);
        }
        match Self::read_existing(path) {
            Some(current) if current.same_holder(info) => {}
            _ => return Ok(false),
        }

        let mut refreshed = info.clone();
        refreshed.refreshed_at = Some(Utc::now());
        let temp = Self::temp_path(path, "refresh");
        std::fs::write(&temp, serde_json::to_vec(&refreshed)?)?;
        std::fs::rename(&temp, path)?;
        Ok(true)
    }

    /// Write the info beside the lock, then hard-link it into place.
    ///
    /// Linking fails if the lock exists, which makes creation atomic with
    /// the content already present.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool> {
        let temp = Self::temp_path(path, "create");
        std::fs::write(&temp, serde_json::to_vec(info)?)?;
        let linked = std::fs::hard_link(&temp, path);
        if let Err(e) = std::fs::remove_file(&temp) {
            tracing::debug!("Failed to remove {}: {}", temp.display(), e);
        }
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(path: &Path, purpose: &str) -> PathBuf {
        path.with_file_name(format!(
            ".{}.{}.{}",
            LOCK_FILENAME,
            std::process::id(),
            purpose
        ))
    }

    fn read_existing(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        let mut released = self.released.lock();
        *released = true;

        // A forced takeover belongs to someone else now.
        match Self::read_existing(&self.path) {
            Some(current) if !current.same_holder(&self.info) => return,
            _ => {}
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!("Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}
