// ABOUTME: Test support utilities.
// ABOUTME: Provides scripted providers and a ready-wired orchestrator for integration tests.

use async_trait::async_trait;
use convoy::alert::{AlertEvent, AlertSink, MemorySink, TransportError};
use convoy::config::{Config, EnvironmentDescriptor};
use convoy::deploy::{DeployRequest, Orchestrator, OrchestratorBuilder};
use convoy::health::{HealthProbe, Observation, ProbeError};
use convoy::history::MemoryHistory;
use convoy::provision::{
    AppliedState, MemoryProvisioner, ProvisionError, ProvisionResult, Provisioner,
};
use convoy::registry::StaticRegistry;
use convoy::secrets::{MemorySecretStore, ResolvedSecrets};
use convoy::types::{ArtifactRef, CommitSha, Digest, EnvironmentName, ImageRef};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("convoy=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Three environments, short windows, tags resolved by the static registry.
#[allow(dead_code)]
pub const CONFIG: &str = r#"
service: shop
image: registry.example.com/shop

environments:
  dev: {}
  staging:
    desired_count: 2
  prod:
    desired_count: 2

triggers:
  develop: dev
  main: staging
  "release/*": prod

timeouts:
  provision: 2m
  verify: 60s
  approval: 5m

retry:
  max_attempts: 3
  base_delay: 1s
  max_delay: 4s

health:
  poll_interval: 5s
  probe_timeout: 2s
  healthy_threshold: 2
"#;

#[allow(dead_code)]
pub fn config() -> Config {
    Config::from_yaml(CONFIG).unwrap()
}

#[allow(dead_code)]
pub fn digest(value: &str) -> Digest {
    Digest::parse(value).unwrap()
}

#[allow(dead_code)]
pub fn commit() -> CommitSha {
    CommitSha::new("1a2b3c4d5e6f").unwrap()
}

/// A request pinned to `digest`, so the registry is not consulted.
#[allow(dead_code)]
pub fn request(environment: EnvironmentName, digest: &str) -> DeployRequest {
    let image = ImageRef::parse("registry.example.com/shop:build")
        .unwrap()
        .with_digest(&self::digest(digest));
    DeployRequest::new(environment, image, commit())
}

#[allow(dead_code)]
pub fn artifact(digest: &str) -> ArtifactRef {
    ArtifactRef::new(
        "registry.example.com/shop",
        Some("build".to_string()),
        self::digest(digest),
        commit(),
    )
}

/// Plays back a per-environment script of observations, repeating the last.
///
/// Environments without a script report healthy.
#[derive(Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<EnvironmentName, VecDeque<Observation>>>,
    unreachable: Mutex<HashSet<EnvironmentName>>,
    polls: Mutex<HashMap<EnvironmentName, usize>>,
}

#[allow(dead_code)]
impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, environment: EnvironmentName, observations: Vec<Observation>) {
        self.scripts
            .lock()
            .insert(environment, observations.into_iter().collect());
    }

    /// Report unhealthy forever.
    pub fn fail(&self, environment: EnvironmentName) {
        self.script(environment, vec![Observation::unhealthy(1, 1)]);
    }

    /// Fail every probe call, as if the health endpoint were down.
    pub fn unreachable(&self, environment: EnvironmentName) {
        self.unreachable.lock().insert(environment);
    }

    pub fn clear(&self, environment: EnvironmentName) {
        self.scripts.lock().remove(&environment);
        self.unreachable.lock().remove(&environment);
    }

    pub fn polls(&self, environment: EnvironmentName) -> usize {
        self.polls.lock().get(&environment).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn observe(&self, environment: EnvironmentName) -> Result<Observation, ProbeError> {
        *self.polls.lock().entry(environment).or_default() += 1;
        if self.unreachable.lock().contains(&environment) {
            return Err(ProbeError::Unreachable("connection refused".to_string()));
        }
        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.get_mut(&environment) else {
            return Ok(Observation::healthy(1));
        };
        let observation = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        Ok(observation.unwrap_or_else(|| Observation::healthy(1)))
    }
}

/// Fails queued errors first, then delegates to a [`MemoryProvisioner`].
#[derive(Default)]
pub struct FlakyProvisioner {
    inner: MemoryProvisioner,
    failures: Mutex<VecDeque<ProvisionError>>,
    calls: AtomicUsize,
    digests: Mutex<Vec<Digest>>,
}

#[allow(dead_code)]
impl FlakyProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: ProvisionError) {
        self.failures.lock().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Digest of every reconcile call, in order.
    pub fn reconciled(&self) -> Vec<Digest> {
        self.digests.lock().clone()
    }

    pub fn applied(&self, environment: EnvironmentName) -> Option<AppliedState> {
        self.inner.applied(environment)
    }
}

#[async_trait]
impl Provisioner for FlakyProvisioner {
    async fn reconcile(
        &self,
        descriptor: &EnvironmentDescriptor,
        artifact: &ArtifactRef,
        secrets: &ResolvedSecrets,
    ) -> Result<ProvisionResult, ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.digests.lock().push(artifact.digest().clone());
        let failure = self.failures.lock().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        self.inner.reconcile(descriptor, artifact, secrets).await
    }

    async fn current(
        &self,
        environment: EnvironmentName,
    ) -> Result<Option<AppliedState>, ProvisionError> {
        self.inner.current(environment).await
    }
}

/// Alert sink that always fails.
pub struct FailingSink;

#[async_trait]
impl AlertSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deliver(&self, _event: &AlertEvent) -> Result<(), TransportError> {
        Err(TransportError::Status(503))
    }
}

/// An orchestrator wired to in-memory fakes the test can inspect.
#[allow(dead_code)]
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub provisioner: Arc<FlakyProvisioner>,
    pub probe: Arc<ScriptedProbe>,
    pub history: Arc<MemoryHistory>,
    pub registry: Arc<StaticRegistry>,
    pub alerts: Arc<MemorySink>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with(config, |builder| builder)
    }

    /// Build with extra builder configuration. Must run inside a tokio runtime.
    pub fn with(
        config: Config,
        extra: impl FnOnce(OrchestratorBuilder) -> OrchestratorBuilder,
    ) -> Self {
        let provisioner = Arc::new(FlakyProvisioner::new());
        let probe = Arc::new(ScriptedProbe::new());
        let history = Arc::new(MemoryHistory::new());
        let registry = Arc::new(StaticRegistry::new());
        let alerts = Arc::new(MemorySink::new());

        let builder = Orchestrator::builder(config)
            .registry(registry.clone())
            .provisioner(provisioner.clone())
            .probe(probe.clone())
            .secrets(Arc::new(MemorySecretStore::new()))
            .history(history.clone())
            .without_config_sinks()
            .sink(alerts.clone());

        Self {
            orchestrator: Arc::new(extra(builder).build().unwrap()),
            provisioner,
            probe,
            history,
            registry,
            alerts,
        }
    }
}
