// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod artifact;
mod commit;
mod digest;
mod environment;
mod id;
mod image_ref;
mod service_name;

pub use artifact::ArtifactRef;
pub use commit::{CommitSha, CommitShaError};
pub use digest::{Digest, DigestError};
pub use environment::{EnvironmentName, EnvironmentNameError};
pub use id::{BuildRequestId, DeploymentId, Id};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use service_name::{ServiceName, ServiceNameError};
