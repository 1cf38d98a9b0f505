// ABOUTME: Name of the service being deployed.
// ABOUTME: Must be a single lowercase DNS label so it can name resources in every environment.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceNameError {
    #[error("service name cannot be empty")]
    Empty,

    #[error("service name exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("service name must start and end with a letter or digit")]
    HyphenAtEdge,

    #[error("service name must be lowercase")]
    NotLowercase,

    #[error("invalid character in service name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(value: &str) -> Result<Self, ServiceNameError> {
        match value.len() {
            0 => return Err(ServiceNameError::Empty),
            n if n > MAX_LEN => return Err(ServiceNameError::TooLong),
            _ => {}
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(ServiceNameError::HyphenAtEdge);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '-'))
        {
            return Err(if c.is_ascii_uppercase() {
                ServiceNameError::NotLowercase
            } else {
                ServiceNameError::InvalidChar(c)
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ServiceName {
    type Err = ServiceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
