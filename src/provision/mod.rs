// ABOUTME: Infrastructure provisioning: the reconcile contract and its implementations.
// ABOUTME: Exports the Provisioner trait, error kinds, retry policy and local providers.

mod backoff;
mod error;
mod file;
mod memory;
mod provisioner;

pub use backoff::{Backoff, reconcile_with_retry};
pub use error::{ProvisionError, ProvisionErrorKind};
pub use file::FileProvisioner;
pub use memory::MemoryProvisioner;
pub use provisioner::{AppliedState, DesiredState, ProvisionResult, Provisioner};
