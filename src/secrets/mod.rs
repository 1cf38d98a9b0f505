// ABOUTME: Secret references and the secret store boundary.
// ABOUTME: Secrets are resolved at provisioning time and never logged or persisted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Prefix for secrets looked up by name from the process environment.
pub const SECRET_ENV_PREFIX: &str = "CONVOY_SECRET_";

/// A pointer to a secret value held outside the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretRef {
    FromEnv {
        env: String,
    },
    Named {
        name: String,
    },
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretRef::FromEnv { env } => write!(f, "env:{}", env),
            SecretRef::Named { name } => write!(f, "secret:{}", name),
        }
    }
}

/// A secret value. Its `Debug` output is redacted and it cannot be serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret store unavailable: {0}")]
    Backend(String),
}

/// Reads named secrets by reference.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn read(&self, reference: &SecretRef) -> Result<Secret, SecretError>;
}

/// Secrets for one provisioning call, keyed by the variable name they are exposed as.
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    values: BTreeMap<String, Secret>,
}

impl ResolvedSecrets {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Secret> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, secret: Secret) {
        self.values.insert(name.into(), secret);
    }

    /// SHA-256 over the sorted name/value pairs. Lets a provisioner detect
    /// rotated secrets without ever storing their values.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, secret) in &self.values {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(secret.expose().as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Resolve every reference of a descriptor against a store.
pub async fn resolve_all(
    store: &dyn SecretStore,
    references: &BTreeMap<String, SecretRef>,
) -> Result<ResolvedSecrets, SecretError> {
    let mut resolved = ResolvedSecrets::default();
    for (name, reference) in references {
        let secret = store.read(reference).await?;
        resolved.insert(name.clone(), secret);
    }
    Ok(resolved)
}

/// Reads secrets from the process environment.
///
/// `{ env: VAR }` reads `VAR` directly; `{ name: db-password }` reads
/// `CONVOY_SECRET_DB_PASSWORD`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn env_var_for(name: &str) -> String {
        let normalized: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", SECRET_ENV_PREFIX, normalized)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn read(&self, reference: &SecretRef) -> Result<Secret, SecretError> {
        let var = match reference {
            SecretRef::FromEnv { env } => env.clone(),
            SecretRef::Named { name } => Self::env_var_for(name),
        };
        std::env::var(&var)
            .map(Secret::new)
            .map_err(|_| SecretError::NotFound(reference.to_string()))
    }
}

/// In-memory store keyed by env var name or secret name.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    values: parking_lot::RwLock<HashMap<String, Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), Secret::new(value));
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn read(&self, reference: &SecretRef) -> Result<Secret, SecretError> {
        let key = match reference {
            SecretRef::FromEnv { env } => env,
            SecretRef::Named { name } => name,
        };
        self.values
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(reference.to_string()))
    }
}
