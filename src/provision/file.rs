// ABOUTME: Local provisioner persisting applied state as JSON files.
// ABOUTME: Writes through a temp file and rename so an apply is never half-written.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};

use super::{AppliedState, DesiredState, ProvisionError, ProvisionResult, Provisioner};
use crate::config::EnvironmentDescriptor;
use crate::health::{HealthProbe, Observation, ProbeError};
use crate::secrets::ResolvedSecrets;
use crate::types::{ArtifactRef, EnvironmentName};

/// Stores one `<env>.json` per environment under a directory.
///
/// Stands in for a real infrastructure provider when driving the
/// orchestrator locally; the files describe what would be running.
#[derive(Debug, Clone)]
pub struct FileProvisioner {
    root: PathBuf,
    quota: Option<u32>,
}

impl FileProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota: None,
        }
    }

    pub fn with_quota(mut self, instances: u32) -> Self {
        self.quota = Some(instances);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, environment: EnvironmentName) -> PathBuf {
        self.root.join(format!("{}.json", environment))
    }

    async fn read_state(
        &self,
        environment: EnvironmentName,
    ) -> Result<Option<AppliedState>, ProvisionError> {
        let path = self.state_path(environment);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                // Reconcile converges from any starting point, so an unreadable
                // file is treated as "nothing applied" and overwritten.
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring unreadable infrastructure state"
                );
                Ok(None)
            }
        }
    }

    async fn write_state(&self, state: &AppliedState) -> Result<(), ProvisionError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.state_path(state.desired.environment);
        let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| ProvisionError::InvalidConfiguration(e.to_string()))?;

        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Provisioner for FileProvisioner {
    async fn reconcile(
        &self,
        descriptor: &EnvironmentDescriptor,
        artifact: &ArtifactRef,
        secrets: &ResolvedSecrets,
    ) -> Result<ProvisionResult, ProvisionError> {
        if let Some(quota) = self.quota
            && descriptor.desired_count > quota
        {
            return Err(ProvisionError::QuotaExceeded(format!(
                "{} tasks requested, quota is {}",
                descriptor.desired_count, quota
            )));
        }

        let desired = DesiredState::new(descriptor, artifact, secrets);
        let existing = self.read_state(descriptor.name).await?;

        if let Some(ref existing) = existing
            && existing.converged_with(&desired)
        {
            tracing::debug!(environment = %descriptor.name, "Infrastructure already converged");
            return Ok(ProvisionResult {
                state: existing.clone(),
                changed: false,
            });
        }

        let state = AppliedState {
            desired,
            revision: existing.map(|s| s.revision + 1).unwrap_or(1),
            applied_at: Utc::now(),
        };
        self.write_state(&state).await?;

        tracing::debug!(
            environment = %descriptor.name,
            revision = state.revision,
            "Applied infrastructure state"
        );

        Ok(ProvisionResult {
            state,
            changed: true,
        })
    }

    async fn current(
        &self,
        environment: EnvironmentName,
    ) -> Result<Option<AppliedState>, ProvisionError> {
        self.read_state(environment).await
    }
}

/// Reports the applied task count from the state file.
#[async_trait]
impl HealthProbe for FileProvisioner {
    async fn observe(&self, environment: EnvironmentName) -> Result<Observation, ProbeError> {
        match self.read_state(environment).await {
            Ok(Some(state)) => Ok(Observation::healthy(state.desired.desired_count)),
            Ok(None) => Ok(Observation::empty(0)),
            Err(e) => Err(ProbeError::Unreachable(e.to_string())),
        }
    }
}
