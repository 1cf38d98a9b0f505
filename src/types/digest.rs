// ABOUTME: Content-addressed image digest validation.
// ABOUTME: A digest is the authoritative identity of a built artifact.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("digest must have the form <algorithm>:<hex>")]
    MissingSeparator,

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("digest hex must be at least 3 characters")]
    TooShort,

    #[error("invalid character in digest: '{0}'")]
    InvalidChar(char),
}

/// An image digest such as `sha256:9f86d0...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    pub fn parse(input: &str) -> Result<Self, DigestError> {
        let (algorithm, hex) = input
            .trim()
            .split_once(':')
            .ok_or(DigestError::MissingSeparator)?;

        if algorithm != "sha256" && algorithm != "sha512" {
            return Err(DigestError::UnsupportedAlgorithm(algorithm.to_string()));
        }

        if hex.len() < 3 {
            return Err(DigestError::TooShort);
        }

        if let Some(c) = hex
            .chars()
            .find(|c| !c.is_ascii_digit() && !matches!(c, 'a'..='f'))
        {
            return Err(DigestError::InvalidChar(c));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Abbreviated form for human-facing output: `sha256:9f86d081884c`.
    pub fn short(&self) -> String {
        let end = self.hex.len().min(12);
        format!("{}:{}", self.algorithm, &self.hex[..end])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::parse(&s).map_err(serde::de::Error::custom)
    }
}
