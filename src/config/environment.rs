// ABOUTME: Per-environment configuration and the resolved environment descriptor.
// ABOUTME: Merges shared defaults into each environment and validates sizing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::NetworkPolicy;
use crate::secrets::SecretRef;
use crate::types::EnvironmentName;

/// Fargate CPU units and the memory (MiB) range each one supports.
const FARGATE_SIZES: [(u32, u32, u32); 5] = [
    (256, 512, 2048),
    (512, 1024, 4096),
    (1024, 2048, 8192),
    (2048, 4096, 16384),
    (4096, 8192, 30720),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("{0}: desired_count must be at least 1")]
    NoInstances(EnvironmentName),

    #[error("{env}: unsupported cpu value {cpu} (expected 256, 512, 1024, 2048 or 4096)")]
    UnsupportedCpu { env: EnvironmentName, cpu: u32 },

    #[error("{env}: memory {memory} MiB is not valid for cpu {cpu}")]
    UnsupportedMemory {
        env: EnvironmentName,
        cpu: u32,
        memory: u32,
    },

    #[error("{env}: invalid variable name '{name}'")]
    InvalidVariableName { env: EnvironmentName, name: String },

    #[error("{env}: '{name}' is defined both as a variable and a secret")]
    DuplicateName { env: EnvironmentName, name: String },
}

/// Environment settings as written in the config file. Every field is
/// optional so the same shape serves as the shared `defaults` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub desired_count: Option<u32>,

    #[serde(default)]
    pub cpu: Option<u32>,

    #[serde(default)]
    pub memory: Option<u32>,

    #[serde(default)]
    pub network_policy: Option<NetworkPolicy>,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default)]
    pub secrets: BTreeMap<String, SecretRef>,

    #[serde(default)]
    pub approval_required: Option<bool>,

    /// Plain `http://` only; TLS endpoints are rejected at load time.
    #[serde(default)]
    pub health_url: Option<String>,
}

/// Fully resolved, immutable description of one target environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentDescriptor {
    pub name: EnvironmentName,
    pub desired_count: u32,
    pub cpu: u32,
    pub memory: u32,
    pub network_policy: NetworkPolicy,
    pub variables: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, SecretRef>,
    pub approval_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
}

impl EnvironmentConfig {
    /// Resolve into a descriptor, layering this environment over `defaults`.
    ///
    /// Scalars replace, maps deep-merge. Production always requires approval.
    pub fn resolve(
        &self,
        name: EnvironmentName,
        defaults: &EnvironmentConfig,
    ) -> EnvironmentDescriptor {
        let mut variables = defaults.variables.clone();
        variables.extend(self.variables.clone());

        let mut secrets = defaults.secrets.clone();
        secrets.extend(self.secrets.clone());

        let approval_required = self
            .approval_required
            .or(defaults.approval_required)
            .unwrap_or(false)
            || name.is_production();

        EnvironmentDescriptor {
            name,
            desired_count: self.desired_count.or(defaults.desired_count).unwrap_or(1),
            cpu: self.cpu.or(defaults.cpu).unwrap_or(256),
            memory: self.memory.or(defaults.memory).unwrap_or(512),
            network_policy: self
                .network_policy
                .or(defaults.network_policy)
                .unwrap_or_default(),
            variables,
            secrets,
            approval_required,
            health_url: self.health_url.clone().or_else(|| defaults.health_url.clone()),
        }
    }
}

impl EnvironmentDescriptor {
    /// A minimal valid descriptor, used by `init` and tests.
    pub fn minimal(name: EnvironmentName) -> Self {
        EnvironmentConfig::default().resolve(name, &EnvironmentConfig::default())
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let env = self.name;

        if self.desired_count == 0 {
            return Err(DescriptorError::NoInstances(env));
        }

        let (_, min, max) = FARGATE_SIZES
            .iter()
            .copied()
            .find(|(cpu, _, _)| *cpu == self.cpu)
            .ok_or(DescriptorError::UnsupportedCpu { env, cpu: self.cpu })?;

        let memory_ok = if self.cpu == 256 {
            matches!(self.memory, 512 | 1024 | 2048)
        } else {
            (min..=max).contains(&self.memory) && self.memory % 1024 == 0
        };
        if !memory_ok {
            return Err(DescriptorError::UnsupportedMemory {
                env,
                cpu: self.cpu,
                memory: self.memory,
            });
        }

        for name in self.variables.keys().chain(self.secrets.keys()) {
            if !is_valid_variable_name(name) {
                return Err(DescriptorError::InvalidVariableName {
                    env,
                    name: name.clone(),
                });
            }
        }

        if let Some(name) = self
            .variables
            .keys()
            .find(|name| self.secrets.contains_key(*name))
        {
            return Err(DescriptorError::DuplicateName {
                env,
                name: name.clone(),
            });
        }

        Ok(())
    }
}

fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
