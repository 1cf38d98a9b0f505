// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports state markers, transitions, locks, approvals and the orchestrator.

mod approval;
mod cancel;
mod deployment;
mod error;
mod lock;
mod orchestrator;
mod state;
mod transitions;
mod trigger;

pub use approval::{Approval, ApprovalGate, FileApprovals};
pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use deployment::Deployment;
pub use error::{DeployError, DeployErrorKind};
pub use lock::{
    EnvironmentGuard, EnvironmentLocks, HEARTBEAT_INTERVAL, InstanceLock, LOCK_FILENAME, LockInfo,
    STALE_AFTER,
};
pub use orchestrator::{DeployRequest, EnvironmentStatus, Orchestrator, OrchestratorBuilder};
pub use state::{Admitted, Failed, Healthy, Provisioned, Requested, RolledBack, Terminal, Unverified};
pub use transitions::{DeployContext, Origin, TransitionResult, VerifyOutcome};
pub use trigger::TriggerEvent;
