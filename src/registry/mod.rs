// ABOUTME: Container registry boundary for tag-to-digest resolution.
// ABOUTME: Includes a static registry backed by a known tag table.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::{Digest, ImageRef};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("image not found in registry: {0}")]
    NotFound(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Resolves mutable tags to immutable digests.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Resolve the image's tag to a digest.
    ///
    /// Implementations should return the reference's own digest unchanged
    /// when it is already pinned.
    async fn resolve(&self, image: &ImageRef) -> Result<Digest, RegistryError>;
}

/// Use the digest embedded in a pinned reference, if any.
pub fn pinned_digest(image: &ImageRef) -> Option<Digest> {
    image.digest().cloned()
}

/// Registry backed by an in-process table of `repository:tag` → digest.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    tags: RwLock<HashMap<String, Digest>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with tags for a single repository, as found in the config file.
    pub fn for_repository<'a>(
        repository: &ImageRef,
        tags: impl IntoIterator<Item = (&'a String, &'a Digest)>,
    ) -> Self {
        let registry = Self::new();
        for (tag, digest) in tags {
            registry.publish(&repository.with_tag(tag), digest.clone());
        }
        registry
    }

    /// Point `image`'s tag at `digest`, replacing any previous value.
    pub fn publish(&self, image: &ImageRef, digest: Digest) {
        self.tags.write().insert(Self::key(image), digest);
    }

    fn key(image: &ImageRef) -> String {
        format!(
            "{}:{}",
            image.repository(),
            image.tag().unwrap_or("latest")
        )
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn resolve(&self, image: &ImageRef) -> Result<Digest, RegistryError> {
        if let Some(pinned) = pinned_digest(image) {
            return Ok(pinned);
        }

        self.tags
            .read()
            .get(&Self::key(image))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(image.to_string()))
    }
}
