// ABOUTME: In-process provisioner that keeps applied state in memory.
// ABOUTME: Reference implementation of the reconcile contract, used by tests and embedders.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{AppliedState, DesiredState, ProvisionError, ProvisionResult, Provisioner};
use crate::config::EnvironmentDescriptor;
use crate::health::{HealthProbe, Observation, ProbeError};
use crate::secrets::ResolvedSecrets;
use crate::types::{ArtifactRef, EnvironmentName};

#[derive(Debug, Default)]
pub struct MemoryProvisioner {
    applied: Mutex<HashMap<EnvironmentName, AppliedState>>,
    quota: Option<u32>,
    calls: AtomicUsize,
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject descriptors asking for more than `instances` tasks.
    pub fn with_quota(mut self, instances: u32) -> Self {
        self.quota = Some(instances);
        self
    }

    /// Number of reconcile calls made, successful or not.
    pub fn reconcile_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of an environment's applied state.
    pub fn applied(&self, environment: EnvironmentName) -> Option<AppliedState> {
        self.applied.lock().get(&environment).cloned()
    }
}

#[async_trait]
impl Provisioner for MemoryProvisioner {
    async fn reconcile(
        &self,
        descriptor: &EnvironmentDescriptor,
        artifact: &ArtifactRef,
        secrets: &ResolvedSecrets,
    ) -> Result<ProvisionResult, ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(quota) = self.quota
            && descriptor.desired_count > quota
        {
            return Err(ProvisionError::QuotaExceeded(format!(
                "{} tasks requested, quota is {}",
                descriptor.desired_count, quota
            )));
        }

        let desired = DesiredState::new(descriptor, artifact, secrets);
        let mut applied = self.applied.lock();

        if let Some(existing) = applied.get(&descriptor.name)
            && existing.converged_with(&desired)
        {
            return Ok(ProvisionResult {
                state: existing.clone(),
                changed: false,
            });
        }

        let revision = applied
            .get(&descriptor.name)
            .map(|s| s.revision + 1)
            .unwrap_or(1);
        let state = AppliedState {
            desired,
            revision,
            applied_at: Utc::now(),
        };
        applied.insert(descriptor.name, state.clone());

        Ok(ProvisionResult {
            state,
            changed: true,
        })
    }

    async fn current(
        &self,
        environment: EnvironmentName,
    ) -> Result<Option<AppliedState>, ProvisionError> {
        Ok(self.applied(environment))
    }
}

/// Reports every applied task as running and healthy.
#[async_trait]
impl HealthProbe for MemoryProvisioner {
    async fn observe(&self, environment: EnvironmentName) -> Result<Observation, ProbeError> {
        Ok(match self.applied(environment) {
            Some(state) => Observation::healthy(state.desired.desired_count),
            None => Observation::empty(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommitSha, Digest};

    fn artifact(digest: &str) -> ArtifactRef {
        ArtifactRef::new(
            "registry.example.com/app",
            Some("v1".to_string()),
            Digest::parse(digest).unwrap(),
            CommitSha::new("abc1234").unwrap(),
        )
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let provisioner = MemoryProvisioner::new();
        let descriptor = EnvironmentDescriptor::minimal(EnvironmentName::Dev);
        let secrets = ResolvedSecrets::default();

        let first = provisioner
            .reconcile(&descriptor, &artifact("sha256:abc"), &secrets)
            .await
            .unwrap();
        let second = provisioner
            .reconcile(&descriptor, &artifact("sha256:abc"), &secrets)
            .await
            .unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.state, second.state);
    }

    #[tokio::test]
    async fn new_digest_bumps_revision() {
        let provisioner = MemoryProvisioner::new();
        let descriptor = EnvironmentDescriptor::minimal(EnvironmentName::Dev);
        let secrets = ResolvedSecrets::default();

        provisioner
            .reconcile(&descriptor, &artifact("sha256:abc"), &secrets)
            .await
            .unwrap();
        let result = provisioner
            .reconcile(&descriptor, &artifact("sha256:def"), &secrets)
            .await
            .unwrap();

        assert!(result.changed);
        assert_eq!(result.state.revision, 2);
        assert_eq!(result.state.digest().to_string(), "sha256:def");
    }

    #[tokio::test]
    async fn quota_is_enforced() {
        let provisioner = MemoryProvisioner::new().with_quota(1);
        let mut descriptor = EnvironmentDescriptor::minimal(EnvironmentName::Dev);
        descriptor.desired_count = 3;

        let err = provisioner
            .reconcile(&descriptor, &artifact("sha256:abc"), &ResolvedSecrets::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::QuotaExceeded(_)));
        assert!(provisioner.applied(EnvironmentName::Dev).is_none());
    }
}
