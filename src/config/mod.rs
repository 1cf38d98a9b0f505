// ABOUTME: Configuration types and parsing for convoy.yml.
// ABOUTME: Handles YAML parsing, defaults merging, and startup validation.

mod deserialize;
mod environment;
mod healthcheck;
mod init;
mod network_policy;
mod triggers;

pub use environment::{DescriptorError, EnvironmentConfig, EnvironmentDescriptor};
pub use healthcheck::HealthConfig;
pub use init::init_config;
pub use network_policy::NetworkPolicy;
pub use triggers::TriggerMap;

use crate::error::{Error, Result};
use crate::types::{Digest, EnvironmentName, ImageRef, ServiceName};
use deserialize::{deserialize_image_ref, deserialize_promotion_order, deserialize_service_name};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "convoy.yml";
pub const CONFIG_FILENAME_ALT: &str = "convoy.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".convoy/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_service_name")]
    pub service: ServiceName,

    /// Image repository; the tag is supplied per deployment.
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub defaults: EnvironmentConfig,

    pub environments: BTreeMap<EnvironmentName, EnvironmentConfig>,

    #[serde(default)]
    pub triggers: TriggerMap,

    #[serde(default)]
    pub promotion: PromotionConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromotionConfig {
    /// Explicit order. Unset means the configured environments in
    /// dev, staging, prod order.
    #[serde(default, deserialize_with = "deserialize_promotion_order")]
    pub order: Option<NonEmpty<EnvironmentName>>,

    /// Deploy a Healthy artifact to the next environment automatically.
    #[serde(default)]
    pub auto: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_provision_timeout", with = "humantime_serde")]
    pub provision: Duration,

    #[serde(default = "default_verify_timeout", with = "humantime_serde")]
    pub verify: Duration,

    #[serde(default = "default_approval_timeout", with = "humantime_serde")]
    pub approval: Duration,
}

fn default_provision_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_verify_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_approval_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            provision: default_provision_timeout(),
            verify: default_verify_timeout(),
            approval: default_approval_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

/// Upper bound on `retry.max_attempts`; no retry loop is unbounded.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// Emit alerts as tracing events.
    #[serde(default = "default_true")]
    pub log: bool,

    /// POST alerts as JSON to this endpoint.
    ///
    /// Must be a plain `http://` URL. The sender has no TLS stack, so `https://`
    /// is rejected when the config loads; route through a local relay instead.
    #[serde(default)]
    pub webhook: Option<String>,

    /// Run `<state_dir>/hooks/on-<state>` scripts.
    #[serde(default)]
    pub hooks: bool,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_delivery_timeout", with = "humantime_serde")]
    pub delivery_timeout: Duration,
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    256
}

fn default_delivery_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for AlertsConfig {
    fn default() -> Self {
        AlertsConfig {
            log: true,
            webhook: None,
            hooks: false,
            queue_capacity: default_queue_capacity(),
            delivery_timeout: default_delivery_timeout(),
        }
    }
}

/// Known tag → digest pairs for the static registry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub tags: BTreeMap<String, Digest>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".convoy")
}

impl Config {
    /// Parse and validate. Invalid configuration fails here, before any deploy.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        // A relative state dir lives next to the project, not the cwd.
        if config.state_dir.is_relative() {
            let base = path
                .parent()
                .map(|p| {
                    if p.ends_with(".convoy") {
                        p.parent().unwrap_or(p)
                    } else {
                        p
                    }
                })
                .unwrap_or_else(|| Path::new("."));
            config.state_dir = base.join(&config.state_dir);
        }

        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Check cross-references and descriptor sizing.
    pub fn validate(&self) -> Result<()> {
        if self.environments.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one environment must be configured".to_string(),
            ));
        }

        for name in self.environments.keys() {
            self.descriptor(*name)?
                .validate()
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        }

        for (pattern, target) in self.triggers.iter() {
            if !self.environments.contains_key(&target) {
                return Err(Error::InvalidConfig(format!(
                    "trigger '{}' targets unconfigured environment '{}'",
                    pattern, target
                )));
            }
        }

        let explicit = self.promotion.order.as_ref().map(|order| order.iter());
        for env in explicit.into_iter().flatten() {
            if !self.environments.contains_key(env) {
                return Err(Error::InvalidConfig(format!(
                    "promotion order names unconfigured environment '{}'",
                    env
                )));
            }
        }

        if !(1..=MAX_RETRY_ATTEMPTS).contains(&self.retry.max_attempts) {
            return Err(Error::InvalidConfig(format!(
                "retry.max_attempts must be between 1 and {}",
                MAX_RETRY_ATTEMPTS
            )));
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(Error::InvalidConfig(
                "retry.base_delay cannot exceed retry.max_delay".to_string(),
            ));
        }

        if self.health.healthy_threshold == 0 {
            return Err(Error::InvalidConfig(
                "health.healthy_threshold must be at least 1".to_string(),
            ));
        }

        if self.health.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "health.poll_interval must be greater than zero".to_string(),
            ));
        }

        if self.health.failure_threshold == Some(0) {
            return Err(Error::InvalidConfig(
                "health.failure_threshold must be at least 1 when set".to_string(),
            ));
        }

        if self.alerts.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "alerts.queue_capacity must be at least 1".to_string(),
            ));
        }

        if let Some(ref url) = self.alerts.webhook {
            validate_http_url("alerts.webhook", url)?;
        }

        for name in self.environments.keys() {
            if let Some(ref url) = self.descriptor(*name)?.health_url {
                validate_http_url(&format!("{}.health_url", name), url)?;
            }
        }

        Ok(())
    }

    /// Resolve the descriptor for one environment.
    pub fn descriptor(&self, name: EnvironmentName) -> Result<EnvironmentDescriptor> {
        self.environments
            .get(&name)
            .map(|env| env.resolve(name, &self.defaults))
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))
    }

    /// Resolve every configured environment.
    pub fn descriptors(&self) -> BTreeMap<EnvironmentName, EnvironmentDescriptor> {
        self.environments
            .iter()
            .map(|(name, env)| (*name, env.resolve(*name, &self.defaults)))
            .collect()
    }

    /// Environments in the order artifacts are promoted through them.
    pub fn promotion_order(&self) -> Vec<EnvironmentName> {
        match self.promotion.order {
            Some(ref order) => order.iter().copied().collect(),
            None => EnvironmentName::ALL
                .into_iter()
                .filter(|env| self.environments.contains_key(env))
                .collect(),
        }
    }

    /// The environment after `env` in the promotion order, if any.
    pub fn next_environment(&self, env: EnvironmentName) -> Option<EnvironmentName> {
        let order = self.promotion_order();
        let position = order.iter().position(|e| *e == env)?;
        order.get(position + 1).copied()
    }

    pub fn template() -> Result<Self> {
        let mut environments = BTreeMap::new();
        environments.insert(EnvironmentName::Dev, EnvironmentConfig::default());
        environments.insert(
            EnvironmentName::Staging,
            EnvironmentConfig {
                desired_count: Some(2),
                ..Default::default()
            },
        );
        environments.insert(
            EnvironmentName::Prod,
            EnvironmentConfig {
                desired_count: Some(2),
                cpu: Some(512),
                memory: Some(1024),
                network_policy: Some(NetworkPolicy::Public),
                ..Default::default()
            },
        );

        Ok(Config {
            service: ServiceName::new("hello-world")
                .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            image: ImageRef::parse("registry.example.com/hello-world")
                .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            state_dir: default_state_dir(),
            defaults: EnvironmentConfig::default(),
            environments,
            triggers: TriggerMap::new([
                ("develop".to_string(), EnvironmentName::Dev),
                ("main".to_string(), EnvironmentName::Staging),
                ("release/*".to_string(), EnvironmentName::Prod),
            ]),
            promotion: PromotionConfig::default(),
            timeouts: TimeoutsConfig::default(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            alerts: AlertsConfig::default(),
            registry: RegistryConfig::default(),
        })
    }
}

fn validate_http_url(field: &str, url: &str) -> Result<()> {
    let uri: hyper::Uri = url
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{}: invalid URL '{}': {}", field, url, e)))?;
    match uri.scheme_str() {
        Some("http") if uri.host().is_some() => Ok(()),
        _ => Err(Error::InvalidConfig(format!(
            "{}: only http:// URLs with a host are supported (https is not), got '{}'",
            field, url
        ))),
    }
}
