// ABOUTME: Orchestrator sequencing requests through approval, provisioning, verification and rollback.
// ABOUTME: Owns environment locks, in-flight cancellation handles and promotion rules.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::alert::{AlertDispatcher, AlertEvent, AlertSink, HookSink, LogSink, WebhookSink};
use crate::config::Config;
use crate::health::{HealthProbe, HealthVerifier};
use crate::history::{
    DeploymentRecord, DeploymentState, HistoryStore, MemoryHistory, RecordedError,
};
use crate::provision::{Backoff, Provisioner};
use crate::registry::Registry;
use crate::secrets::{EnvSecretStore, SecretStore};
use crate::types::{
    ArtifactRef, BuildRequestId, CommitSha, DeploymentId, Digest, EnvironmentName, ImageRef,
};

use super::approval::{Approval, ApprovalGate, FileApprovals};
use super::cancel::{CancelHandle, CancelSignal, cancel_pair};
use super::error::DeployError;
use super::lock::EnvironmentLocks;
use super::Deployment;
use super::state::Requested;
use super::transitions::{DeployContext, Origin, VerifyOutcome};
use super::trigger::TriggerEvent;

/// A request to deploy an image to one environment.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub environment: EnvironmentName,
    /// Tagged or digest-pinned image; resolved to a digest before anything runs.
    pub image: ImageRef,
    pub commit_sha: CommitSha,
    pub build_request_id: Option<BuildRequestId>,
    /// Cancel the environment's in-flight deployment instead of queueing behind it.
    pub supersede: bool,
}

impl DeployRequest {
    pub fn new(environment: EnvironmentName, image: ImageRef, commit_sha: CommitSha) -> Self {
        Self {
            environment,
            image,
            commit_sha,
            build_request_id: None,
            supersede: false,
        }
    }

    pub fn superseding(mut self) -> Self {
        self.supersede = true;
        self
    }

    pub fn with_build_request(mut self, id: BuildRequestId) -> Self {
        self.build_request_id = Some(id);
        self
    }
}

/// Current view of one environment.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub environment: EnvironmentName,
    pub in_flight: bool,
    pub latest: Option<DeploymentRecord>,
    /// Most recent Healthy deployment, the rollback target for the next failure.
    pub last_healthy: Option<DeploymentRecord>,
}

struct InFlight {
    deployment: DeploymentId,
    cancel: CancelHandle,
}

/// Sequences deployments. Distinct environments may deploy concurrently; each
/// environment runs at most one deployment at a time.
pub struct Orchestrator {
    config: Config,
    registry: Arc<dyn Registry>,
    context: DeployContext,
    locks: EnvironmentLocks,
    in_flight: Mutex<HashMap<EnvironmentName, InFlight>>,
    watcher: Mutex<Option<(CancelHandle, JoinHandle<()>)>>,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Deploy the build for a branch or tag per the trigger table.
    ///
    /// Returns the triggered record followed by any automatic promotions.
    pub async fn handle_trigger(
        &self,
        event: TriggerEvent,
    ) -> Result<Vec<DeploymentRecord>, DeployError> {
        let environment = self
            .config
            .triggers
            .resolve(&event.branch_or_tag)
            .ok_or_else(|| DeployError::UnmappedTrigger(event.branch_or_tag.clone()))?;

        tracing::info!(
            branch = %event.branch_or_tag,
            commit = %event.commit_sha.short(),
            %environment,
            "Trigger received"
        );

        let mut request = DeployRequest::new(
            environment,
            self.config.image.with_tag(event.image_tag()),
            event.commit_sha,
        );
        request.build_request_id = event.build_request_id;

        let record = self.deploy(request).await?;
        self.auto_promote(record).await
    }

    /// Resolve the image digest and run one deployment to completion.
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeploymentRecord, DeployError> {
        let registry_digest = self.registry.resolve(&request.image).await?;
        let artifact = ArtifactRef::new(
            request.image.repository(),
            request.image.tag().map(str::to_string),
            registry_digest,
            request.commit_sha,
        );
        let origin = Origin {
            build_request_id: request.build_request_id,
            promoted_from: None,
        };
        self.execute(request.environment, artifact, origin, request.supersede)
            .await
    }

    /// Deploy the latest Healthy artifact of `from` to the next environment.
    ///
    /// The artifact is reused as recorded; its digest is never re-resolved.
    pub async fn promote(&self, from: EnvironmentName) -> Result<DeploymentRecord, DeployError> {
        let next = self
            .config
            .next_environment(from)
            .ok_or(DeployError::NoNextEnvironment(from))?;

        let source = self.history_store().latest(from).await?.ok_or_else(|| {
            DeployError::PromotionNotAllowed(format!("{} has no deployments", from))
        })?;

        if source.state != DeploymentState::Healthy {
            return Err(DeployError::PromotionNotAllowed(format!(
                "latest {} deployment {} is {}, not healthy",
                from,
                source.id.short(),
                source.state
            )));
        }

        tracing::info!(
            %from,
            to = %next,
            digest = %source.artifact.digest(),
            "Promoting"
        );

        let origin = Origin {
            build_request_id: source.build_request_id.clone(),
            promoted_from: Some(source.id.clone()),
        };
        self.execute(next, source.artifact, origin, false).await
    }

    /// Record an approval for the next gated deployment to `environment`.
    pub fn approve(
        &self,
        environment: EnvironmentName,
        approver: impl Into<String>,
        digest: Option<Digest>,
    ) {
        self.context
            .approvals
            .approve(environment, Approval::new(approver, digest));
    }

    /// Cancel the environment's in-flight deployment. Returns false if idle.
    pub fn abort(&self, environment: EnvironmentName) -> bool {
        match self.in_flight.lock().get(&environment) {
            Some(current) => {
                tracing::warn!(
                    %environment,
                    deployment = %current.deployment.short(),
                    "Aborting deployment"
                );
                current.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn history(
        &self,
        environment: EnvironmentName,
    ) -> Result<Vec<DeploymentRecord>, DeployError> {
        Ok(self.history_store().records(environment).await?)
    }

    pub async fn status(&self) -> Result<Vec<EnvironmentStatus>, DeployError> {
        let in_flight: Vec<EnvironmentName> = self.in_flight.lock().keys().copied().collect();
        let mut statuses = Vec::new();
        for environment in self.config.environments.keys().copied() {
            let records = self.history_store().records(environment).await?;
            statuses.push(EnvironmentStatus {
                environment,
                in_flight: in_flight.contains(&environment),
                last_healthy: records
                    .iter()
                    .rev()
                    .find(|r| r.state == DeploymentState::Healthy)
                    .cloned(),
                latest: records.last().cloned(),
            });
        }
        Ok(statuses)
    }

    /// Stop the approval watcher and deliver queued alerts.
    pub async fn shutdown(&self) {
        let watcher = self.watcher.lock().take();
        if let Some((stop, handle)) = watcher {
            stop.cancel();
            if let Err(e) = handle.await {
                tracing::warn!("approval watcher ended abnormally: {}", e);
            }
        }
        self.context.alerts.shutdown().await;
    }

    fn history_store(&self) -> &dyn HistoryStore {
        self.context.history.as_ref()
    }

    async fn auto_promote(
        &self,
        first: DeploymentRecord,
    ) -> Result<Vec<DeploymentRecord>, DeployError> {
        let mut records = vec![first];
        if !self.config.promotion.auto {
            return Ok(records);
        }
        while let Some(last) = records.last()
            && last.state == DeploymentState::Healthy
            && self.config.next_environment(last.environment).is_some()
        {
            let from = last.environment;
            let promoted = self.promote(from).await?;
            records.push(promoted);
        }
        Ok(records)
    }

    async fn execute(
        &self,
        environment: EnvironmentName,
        artifact: ArtifactRef,
        origin: Origin,
        supersede: bool,
    ) -> Result<DeploymentRecord, DeployError> {
        let descriptor = self
            .config
            .descriptor(environment)
            .map_err(|e| DeployError::Configuration(e.to_string()))?;

        if supersede {
            self.abort(environment);
        }

        let guard = match self.locks.try_acquire(environment) {
            Some(guard) => guard,
            None => {
                tracing::info!(%environment, "Waiting for in-flight deployment to finish");
                self.locks.acquire(environment).await
            }
        };

        if let Err(e) = self.close_interrupted(environment).await {
            drop(guard);
            return Err(e);
        }

        let (cancel, signal) = cancel_pair();
        let requested =
            match Deployment::request(&self.context, descriptor, artifact, origin, signal).await {
                Ok(requested) => requested,
                Err(e) => {
                    drop(guard);
                    return Err(e);
                }
            };

        self.in_flight.lock().insert(
            environment,
            InFlight {
                deployment: requested.record().id.clone(),
                cancel,
            },
        );

        let record = self.run(requested).await;

        self.in_flight.lock().remove(&environment);
        drop(guard);

        Ok(record)
    }

    /// Fail records a stopped orchestrator left open.
    ///
    /// Must run under the environment lock: only then is every open record
    /// known to be abandoned.
    async fn close_interrupted(&self, environment: EnvironmentName) -> Result<(), DeployError> {
        let history = self.history_store();
        let open = history
            .records(environment)
            .await?
            .into_iter()
            .filter(|record| !record.is_terminal());

        for mut record in open {
            let from = record.advance(DeploymentState::Failed)?;
            let error = DeployError::Interrupted(from);
            record.error = Some(RecordedError::from(&error));
            record.requires_intervention = from != DeploymentState::Pending;
            history.append(&record).await?;
            self.context
                .alerts
                .notify(AlertEvent::from_record(&record, Some(from)));
            tracing::warn!(
                %environment,
                deployment = %record.id.short(),
                digest = %record.artifact.digest(),
                requires_intervention = record.requires_intervention,
                "Closed deployment interrupted while {}",
                from
            );
        }
        Ok(())
    }

    async fn run(&self, requested: Deployment<Requested>) -> DeploymentRecord {
        let ctx = &self.context;

        let admitted = match requested.admit(ctx).await {
            Ok(admitted) => admitted,
            Err(failed) => return failed.into_record(),
        };

        let provisioned = match admitted.provision(ctx).await {
            Ok(provisioned) => provisioned,
            Err(failed) => return failed.into_record(),
        };

        match provisioned.verify(ctx).await {
            VerifyOutcome::Healthy(healthy) => healthy.into_record(),
            VerifyOutcome::Failed(failed) => failed.into_record(),
            VerifyOutcome::Unverified(unverified) => match unverified.rollback(ctx).await {
                Ok(rolled_back) => rolled_back.into_record(),
                Err(failed) => failed.into_record(),
            },
        }
    }
}

/// Assembles an [`Orchestrator`] from its external collaborators.
pub struct OrchestratorBuilder {
    config: Config,
    registry: Option<Arc<dyn Registry>>,
    provisioner: Option<Arc<dyn Provisioner>>,
    probe: Option<Arc<dyn HealthProbe>>,
    secrets: Option<Arc<dyn SecretStore>>,
    history: Option<Arc<dyn HistoryStore>>,
    sinks: Vec<Arc<dyn AlertSink>>,
    config_sinks: bool,
    approvals: Option<Arc<ApprovalGate>>,
    approval_files: Option<Duration>,
}

impl OrchestratorBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            registry: None,
            provisioner: None,
            probe: None,
            secrets: None,
            history: None,
            sinks: Vec::new(),
            config_sinks: true,
            approvals: None,
            approval_files: None,
        }
    }

    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Defaults to [`EnvSecretStore`].
    pub fn secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Defaults to [`MemoryHistory`].
    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Add a sink on top of those the `alerts` config section enables.
    pub fn sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Use only the sinks added with [`sink`](Self::sink).
    pub fn without_config_sinks(mut self) -> Self {
        self.config_sinks = false;
        self
    }

    pub fn approvals(mut self, gate: Arc<ApprovalGate>) -> Self {
        self.approvals = Some(gate);
        self
    }

    /// Poll `<state_dir>/approvals` for approval files at `interval`.
    pub fn watch_approval_files(mut self, interval: Duration) -> Self {
        self.approval_files = Some(interval);
        self
    }

    /// Validate the configuration and start background workers.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Result<Orchestrator, DeployError> {
        self.config
            .validate()
            .map_err(|e| DeployError::Configuration(e.to_string()))?;

        let registry = self
            .registry
            .ok_or_else(|| DeployError::Configuration("no registry configured".to_string()))?;
        let provisioner = self
            .provisioner
            .ok_or_else(|| DeployError::Configuration("no provisioner configured".to_string()))?;
        let probe = self
            .probe
            .ok_or_else(|| DeployError::Configuration("no health probe configured".to_string()))?;

        let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();
        if self.config_sinks {
            let alerts = &self.config.alerts;
            if alerts.log {
                sinks.push(Arc::new(LogSink));
            }
            if let Some(ref url) = alerts.webhook {
                let webhook = WebhookSink::new(url)
                    .map_err(|e| DeployError::Configuration(e.to_string()))?;
                sinks.push(Arc::new(webhook));
            }
            if alerts.hooks {
                sinks.push(Arc::new(HookSink::new(&self.config.state_dir)));
            }
        }
        sinks.extend(self.sinks);

        let alerts = Arc::new(AlertDispatcher::new(
            sinks,
            self.config.alerts.queue_capacity,
            self.config.alerts.delivery_timeout,
        ));
        let approvals = self.approvals.unwrap_or_default();

        let watcher = self.approval_files.map(|interval| {
            let (stop, signal): (CancelHandle, CancelSignal) = cancel_pair();
            let handle = FileApprovals::new(&self.config.state_dir)
                .expiring_after(self.config.timeouts.approval)
                .watch(approvals.clone(), interval, signal);
            (stop, handle)
        });

        let context = DeployContext {
            provisioner,
            verifier: HealthVerifier::new(probe, &self.config.health),
            secrets: self.secrets.unwrap_or_else(|| Arc::new(EnvSecretStore)),
            history: self
                .history
                .unwrap_or_else(|| Arc::new(MemoryHistory::new())),
            alerts,
            approvals,
            timeouts: self.config.timeouts.clone(),
            backoff: Backoff::from_config(&self.config.retry),
            poll_interval: self.config.health.poll_interval,
        };

        Ok(Orchestrator {
            config: self.config,
            registry,
            context,
            locks: EnvironmentLocks::new(),
            in_flight: Mutex::new(HashMap::new()),
            watcher: Mutex::new(watcher),
        })
    }
}
