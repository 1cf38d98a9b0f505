// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: Owns the live record; state types carry stage results.

use crate::config::EnvironmentDescriptor;
use crate::history::DeploymentRecord;
use crate::provision::AppliedState;
use crate::types::{ArtifactRef, EnvironmentName};

use super::cancel::CancelSignal;
use super::error::DeployError;
use super::state::{Failed, Healthy, Provisioned, RolledBack, Terminal, Unverified};
use crate::health::{VerificationError, VerifyReport};
use crate::types::DeploymentId;

/// A deployment in progress, parameterized by its current state.
///
/// Transitions consume `self`, so a deployment that was never admitted has
/// no `provision()` to call and a finished one cannot be rolled back.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) record: DeploymentRecord,
    pub(crate) descriptor: EnvironmentDescriptor,
    pub(crate) cancel: CancelSignal,
    /// Set once the provisioner has been asked to apply this artifact.
    pub(crate) reconciled: bool,
    pub(crate) state: S,
}

impl<S> Deployment<S> {
    pub fn record(&self) -> &DeploymentRecord {
        &self.record
    }

    pub fn environment(&self) -> EnvironmentName {
        self.record.environment
    }

    pub fn artifact(&self) -> &ArtifactRef {
        &self.record.artifact
    }

    pub fn descriptor(&self) -> &EnvironmentDescriptor {
        &self.descriptor
    }
}

impl<S: Terminal> Deployment<S> {
    /// The final record.
    pub fn into_record(self) -> DeploymentRecord {
        self.record
    }
}

impl Deployment<Provisioned> {
    pub fn applied(&self) -> &AppliedState {
        &self.state.applied
    }
}

impl Deployment<Healthy> {
    pub fn report(&self) -> &VerifyReport {
        &self.state.report
    }
}

impl Deployment<Unverified> {
    pub fn verification_error(&self) -> &VerificationError {
        &self.state.error
    }
}

impl Deployment<RolledBack> {
    /// The Healthy deployment whose artifact was restored.
    pub fn restored(&self) -> &DeploymentId {
        &self.state.target
    }
}

impl Deployment<Failed> {
    pub fn error(&self) -> &DeployError {
        &self.state.error
    }
}
