// ABOUTME: Source-control event that starts a deployment.
// ABOUTME: Carries the commit, ref and build request id reported by the event source.

use serde::{Deserialize, Serialize};

use crate::types::{BuildRequestId, CommitSha};

/// A completed build for a commit on a branch or tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub commit_sha: CommitSha,
    pub branch_or_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_request_id: Option<BuildRequestId>,
}

impl TriggerEvent {
    pub fn new(commit_sha: CommitSha, branch_or_tag: impl Into<String>) -> Self {
        Self {
            commit_sha,
            branch_or_tag: branch_or_tag.into(),
            build_request_id: None,
        }
    }

    pub fn with_build_request(mut self, id: BuildRequestId) -> Self {
        self.build_request_id = Some(id);
        self
    }

    /// Builds are tagged with the commit they were made from.
    pub fn image_tag(&self) -> &str {
        self.commit_sha.as_str()
    }
}
