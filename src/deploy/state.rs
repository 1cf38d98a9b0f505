// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: Each marker carries the data its stage produced, so later stages cannot run early.

use super::error::DeployError;
use crate::health::{VerificationError, VerifyReport};
use crate::provision::AppliedState;
use crate::types::DeploymentId;

/// Record created and persisted, approval not yet checked.
/// Available actions: `admit()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Requested;

/// Approval granted or not required.
/// Available actions: `provision()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Admitted;

/// Infrastructure converged on the artifact.
/// Available actions: `verify()`
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub(crate) applied: AppliedState,
}

/// Verification passed. Terminal.
#[derive(Debug, Clone, Copy)]
pub struct Healthy {
    pub(crate) report: VerifyReport,
}

/// Verification failed.
/// Available actions: `rollback()`
#[derive(Debug, Clone)]
pub struct Unverified {
    pub(crate) error: VerificationError,
}

/// The previous Healthy artifact was re-applied. Terminal.
#[derive(Debug, Clone)]
pub struct RolledBack {
    pub(crate) target: DeploymentId,
}

/// Terminal failure.
#[derive(Debug)]
pub struct Failed {
    pub(crate) error: DeployError,
}

/// States in which the record no longer changes.
pub trait Terminal {}

impl Terminal for Healthy {}
impl Terminal for RolledBack {}
impl Terminal for Failed {}
