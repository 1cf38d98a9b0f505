// ABOUTME: Immutable reference to a built, deployable artifact.
// ABOUTME: Pairs the resolved digest with the commit and human-facing tag.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CommitSha, Digest};

/// A completed build, resolved to its content digest.
///
/// The digest is the identity: two references with the same digest describe
/// the same artifact even if their tags differ. The tag is kept for humans
/// only and is never used to re-resolve the artifact after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    registry_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    digest: Digest,
    commit_sha: CommitSha,
}

impl ArtifactRef {
    pub fn new(
        registry_address: impl Into<String>,
        tag: Option<String>,
        digest: Digest,
        commit_sha: CommitSha,
    ) -> Self {
        Self {
            registry_address: registry_address.into(),
            tag,
            digest,
            commit_sha,
        }
    }

    pub fn registry_address(&self) -> &str {
        &self.registry_address
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn commit_sha(&self) -> &CommitSha {
        &self.commit_sha
    }

    /// The digest-pinned image reference a provisioner should run.
    pub fn pinned(&self) -> String {
        format!("{}@{}", self.registry_address, self.digest)
    }

    /// Whether two references name the same built artifact.
    pub fn same_artifact(&self, other: &ArtifactRef) -> bool {
        self.digest == other.digest
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.registry_address)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        write!(f, "@{}", self.digest)
    }
}
