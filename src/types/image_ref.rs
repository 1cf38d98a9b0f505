// ABOUTME: Container image references as named in config and deploy requests.
// ABOUTME: A reference is either a mutable tag or pinned to a digest.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{Digest, DigestError};

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("image reference has an empty {0}")]
    EmptyComponent(&'static str),

    #[error("invalid digest in image reference: {0}")]
    Digest(#[from] DigestError),
}

/// `[registry/]name[:tag][@digest]`.
///
/// A reference with neither tag nor digest is read as `:latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

fn is_reference_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '-' | '_' | '@')
}

/// The first path component names a registry host when it looks like one.
fn looks_like_host(component: &str) -> bool {
    component == "localhost" || component.contains('.') || component.contains(':')
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }
        if let Some(c) = input.chars().find(|c| !is_reference_char(*c)) {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (reference, digest) = match input.split_once('@') {
            Some((reference, digest)) => (reference, Some(Digest::parse(digest)?)),
            None => (input, None),
        };

        // A colon after the last slash separates the tag; earlier colons are ports.
        let last_segment = reference.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match reference[last_segment..].rfind(':') {
            Some(i) => {
                let split = last_segment + i;
                (&reference[..split], Some(&reference[split + 1..]))
            }
            None => (reference, None),
        };
        if tag == Some("") {
            return Err(ParseImageRefError::EmptyComponent("tag"));
        }

        let (registry, name) = match repository.split_once('/') {
            Some((host, rest)) if looks_like_host(host) => (Some(host), rest),
            _ => (None, repository),
        };
        if name.is_empty() {
            return Err(ParseImageRefError::EmptyComponent("name"));
        }

        let tag = match (tag, &digest) {
            (None, None) => Some("latest"),
            (tag, _) => tag,
        };

        Ok(Self {
            registry: registry.map(str::to_string),
            name: name.to_string(),
            tag: tag.map(str::to_string),
            digest,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Registry and repository name without tag or digest, e.g. `ghcr.io/org/app`.
    pub fn repository(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.digest.is_some()
    }

    /// Same repository with a different tag; any digest is dropped.
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            digest: None,
            ..self.clone()
        }
    }

    /// Same repository and tag, pinned to `digest`.
    pub fn with_digest(&self, digest: &Digest) -> Self {
        Self {
            digest: Some(digest.clone()),
            ..self.clone()
        }
    }
}

impl FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
