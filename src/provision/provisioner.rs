// ABOUTME: Provisioner trait and the observable infrastructure state it converges.
// ABOUTME: Reconcile is desired-state convergence: identical inputs change nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ProvisionError;
use crate::config::{EnvironmentDescriptor, NetworkPolicy};
use crate::secrets::ResolvedSecrets;
use crate::types::{ArtifactRef, Digest, EnvironmentName};

/// What an environment should look like after reconcile.
///
/// Secret values never appear here; only their names and a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub environment: EnvironmentName,
    pub image: String,
    pub digest: Digest,
    pub desired_count: u32,
    pub cpu: u32,
    pub memory: u32,
    pub network_policy: NetworkPolicy,
    pub variables: BTreeMap<String, String>,
    pub secret_names: Vec<String>,
    pub secrets_fingerprint: String,
}

impl DesiredState {
    pub fn new(
        descriptor: &EnvironmentDescriptor,
        artifact: &ArtifactRef,
        secrets: &ResolvedSecrets,
    ) -> Self {
        DesiredState {
            environment: descriptor.name,
            image: artifact.pinned(),
            digest: artifact.digest().clone(),
            desired_count: descriptor.desired_count,
            cpu: descriptor.cpu,
            memory: descriptor.memory,
            network_policy: descriptor.network_policy,
            variables: descriptor.variables.clone(),
            secret_names: secrets.names().map(str::to_string).collect(),
            secrets_fingerprint: secrets.fingerprint(),
        }
    }
}

/// Infrastructure as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedState {
    #[serde(flatten)]
    pub desired: DesiredState,
    /// Incremented on every apply that changed something.
    pub revision: u64,
    pub applied_at: DateTime<Utc>,
}

impl AppliedState {
    pub fn digest(&self) -> &Digest {
        &self.desired.digest
    }

    pub fn converged_with(&self, desired: &DesiredState) -> bool {
        &self.desired == desired
    }
}

/// Outcome of a successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionResult {
    pub state: AppliedState,
    /// False when the environment already matched and nothing was applied.
    pub changed: bool,
}

/// Converges an environment to run a given artifact.
///
/// Implementations must be atomic per call: on error or cancellation the
/// environment is left either fully at the new state or fully at the old one.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn reconcile(
        &self,
        descriptor: &EnvironmentDescriptor,
        artifact: &ArtifactRef,
        secrets: &ResolvedSecrets,
    ) -> Result<ProvisionResult, ProvisionError>;

    /// What is currently applied, if anything.
    async fn current(
        &self,
        environment: EnvironmentName,
    ) -> Result<Option<AppliedState>, ProvisionError>;
}
