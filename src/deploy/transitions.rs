// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self, persists the record snapshot and emits an alert.

use std::sync::Arc;
use std::time::Duration;

use crate::alert::{AlertDispatcher, AlertEvent};
use crate::config::{EnvironmentDescriptor, TimeoutsConfig};
use crate::health::HealthVerifier;
use crate::history::{ApprovalRecord, DeploymentRecord, DeploymentState, HistoryStore, RecordedError};
use crate::provision::{Backoff, ProvisionError, ProvisionResult, Provisioner, reconcile_with_retry};
use crate::secrets::{self, SecretStore};
use crate::types::{ArtifactRef, BuildRequestId, DeploymentId};

use super::Deployment;
use super::approval::ApprovalGate;
use super::cancel::CancelSignal;
use super::error::DeployError;
use super::state::{Admitted, Failed, Healthy, Provisioned, Requested, RolledBack, Unverified};

/// Result type for transitions whose only failure path is a terminal failure.
pub type TransitionResult<T> = Result<Deployment<T>, Deployment<Failed>>;

/// Collaborators and limits every transition needs.
pub struct DeployContext {
    pub(crate) provisioner: Arc<dyn Provisioner>,
    pub(crate) verifier: HealthVerifier,
    pub(crate) secrets: Arc<dyn SecretStore>,
    pub(crate) history: Arc<dyn HistoryStore>,
    pub(crate) alerts: Arc<AlertDispatcher>,
    pub(crate) approvals: Arc<ApprovalGate>,
    pub(crate) timeouts: TimeoutsConfig,
    pub(crate) backoff: Backoff,
    pub(crate) poll_interval: Duration,
}

/// Where a new deployment came from.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    pub build_request_id: Option<BuildRequestId>,
    pub promoted_from: Option<DeploymentId>,
}

/// Outcome of health verification.
#[derive(Debug)]
pub enum VerifyOutcome {
    Healthy(Deployment<Healthy>),
    /// Verification failed; call `rollback()`.
    Unverified(Deployment<Unverified>),
    /// Cancelled or could not persist.
    Failed(Deployment<Failed>),
}

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<S> {
    /// Internal helper to move to the next type state.
    fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            record: self.record,
            descriptor: self.descriptor,
            cancel: self.cancel,
            reconciled: self.reconciled,
            state,
        }
    }

    /// Advance the record, persist the snapshot and notify.
    async fn enter(&mut self, ctx: &DeployContext, next: DeploymentState) -> Result<(), DeployError> {
        let from = self.record.advance(next)?;
        ctx.history.append(&self.record).await?;
        ctx.alerts
            .notify(AlertEvent::from_record(&self.record, Some(from)));
        tracing::info!(
            environment = %self.record.environment,
            deployment = %self.record.id.short(),
            digest = %self.record.artifact.digest(),
            "{} -> {}",
            from,
            next
        );
        Ok(())
    }

    /// End the deployment as Failed.
    ///
    /// Manual intervention is flagged whenever the provisioner touched the
    /// environment, since no rollback restored a Healthy artifact.
    async fn fail(mut self, ctx: &DeployContext, error: DeployError) -> Deployment<Failed> {
        self.record.error = Some(RecordedError::from(&error));
        self.record.requires_intervention = self.reconciled;

        match self.record.advance(DeploymentState::Failed) {
            Ok(from) => {
                if let Err(e) = ctx.history.append(&self.record).await {
                    tracing::error!(
                        environment = %self.record.environment,
                        deployment = %self.record.id.short(),
                        "Failed to persist failed deployment: {}",
                        e
                    );
                }
                ctx.alerts
                    .notify(AlertEvent::from_record(&self.record, Some(from)));
            }
            Err(e) => tracing::error!("{}", e),
        }

        tracing::error!(
            environment = %self.record.environment,
            deployment = %self.record.id.short(),
            digest = %self.record.artifact.digest(),
            attempt = self.record.attempt,
            requires_intervention = self.record.requires_intervention,
            "Deployment failed: {}",
            error
        );

        self.transition(Failed { error })
    }

    /// Reconcile under the provisioning timeout, honouring cancellation.
    async fn reconcile(
        &mut self,
        ctx: &DeployContext,
        artifact: &ArtifactRef,
        attempts: &mut u32,
    ) -> Result<ProvisionResult, DeployError> {
        let resolved = secrets::resolve_all(ctx.secrets.as_ref(), &self.descriptor.secrets).await?;
        let limit = ctx.timeouts.provision;
        self.reconciled = true;

        let outcome = {
            let apply = reconcile_with_retry(
                ctx.provisioner.as_ref(),
                &self.descriptor,
                artifact,
                &resolved,
                &ctx.backoff,
                attempts,
            );
            tokio::select! {
                result = tokio::time::timeout(limit, apply) => Some(result),
                _ = self.cancel.cancelled() => None,
            }
        };

        match outcome {
            None => Err(DeployError::Cancelled),
            Some(Err(_elapsed)) => Err(DeployError::ProvisionTimeout(limit)),
            Some(Ok(Err(source))) => Err(DeployError::Provision {
                source,
                attempts: *attempts,
            }),
            Some(Ok(Ok(result))) => Ok(result),
        }
    }

    /// Log what the provider reports after a failed apply.
    async fn report_residual_state(&self, ctx: &DeployContext) {
        match ctx.provisioner.current(self.record.environment).await {
            Ok(Some(state)) => tracing::warn!(
                environment = %self.record.environment,
                digest = %state.digest(),
                revision = state.revision,
                "Environment left at provider-reported state"
            ),
            Ok(None) => tracing::warn!(
                environment = %self.record.environment,
                "Provider reports nothing applied"
            ),
            Err(e) => tracing::warn!(
                environment = %self.record.environment,
                "Could not read provider state: {}",
                e
            ),
        }
    }
}

// =============================================================================
// New deployment
// =============================================================================

impl Deployment<Requested> {
    /// Create and persist a Pending record.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::History` if the record cannot be persisted; in
    /// that case no deployment exists.
    pub async fn request(
        ctx: &DeployContext,
        descriptor: EnvironmentDescriptor,
        artifact: ArtifactRef,
        origin: Origin,
        cancel: CancelSignal,
    ) -> Result<Self, DeployError> {
        let mut record = DeploymentRecord::new(descriptor.name, artifact);
        record.build_request_id = origin.build_request_id;
        record.promoted_from = origin.promoted_from;

        ctx.history.append(&record).await?;
        ctx.alerts.notify(AlertEvent::from_record(&record, None));
        tracing::info!(
            environment = %record.environment,
            deployment = %record.id.short(),
            digest = %record.artifact.digest(),
            "Deployment requested"
        );

        Ok(Deployment {
            record,
            descriptor,
            cancel,
            reconciled: false,
            state: Requested,
        })
    }

    /// Pass the approval gate.
    ///
    /// Production and environments with `approval_required` wait here, in
    /// Pending, for an approval covering this digest. The approval is written
    /// to history before the deployment may provision.
    #[must_use = "deployment state must be used"]
    pub async fn admit(mut self, ctx: &DeployContext) -> TransitionResult<Admitted> {
        let environment = self.record.environment;
        let gated = self.descriptor.approval_required || environment.is_production();

        if !gated {
            if self.cancel.is_cancelled() {
                return Err(self.fail(ctx, DeployError::Cancelled).await);
            }
            return Ok(self.transition(Admitted));
        }

        tracing::info!(
            %environment,
            deployment = %self.record.id.short(),
            timeout_secs = ctx.timeouts.approval.as_secs(),
            "Awaiting approval"
        );

        let digest = self.record.artifact.digest().clone();
        let approval = ctx
            .approvals
            .wait(environment, &digest, ctx.timeouts.approval, &mut self.cancel)
            .await;

        match approval {
            Ok(approval) => {
                self.record.approval = Some(ApprovalRecord {
                    approver: approval.approver,
                    approved_at: approval.approved_at,
                });
                if let Err(e) = ctx.history.append(&self.record).await {
                    return Err(self.fail(ctx, e.into()).await);
                }
                Ok(self.transition(Admitted))
            }
            Err(e) => Err(self.fail(ctx, e).await),
        }
    }
}

// =============================================================================
// Admitted -> Provisioned
// =============================================================================

impl Deployment<Admitted> {
    /// Converge the environment on the artifact.
    ///
    /// Only `TransientUnavailable` is retried, with jittered backoff; the whole
    /// operation is bounded by the provisioning timeout.
    #[must_use = "deployment state must be used"]
    pub async fn provision(mut self, ctx: &DeployContext) -> TransitionResult<Provisioned> {
        if let Err(e) = self.enter(ctx, DeploymentState::Provisioning).await {
            return Err(self.fail(ctx, e).await);
        }

        let artifact = self.record.artifact.clone();
        let mut attempts = 0;
        let result = self.reconcile(ctx, &artifact, &mut attempts).await;
        self.record.attempt = attempts;

        let applied = match result {
            Ok(result) => result,
            Err(e) => {
                if self.reconciled {
                    self.report_residual_state(ctx).await;
                }
                return Err(self.fail(ctx, e).await);
            }
        };

        tracing::debug!(
            environment = %self.record.environment,
            revision = applied.state.revision,
            changed = applied.changed,
            "Provisioned"
        );

        if let Err(e) = self.enter(ctx, DeploymentState::Verifying).await {
            return Err(self.fail(ctx, e).await);
        }
        Ok(self.transition(Provisioned {
            applied: applied.state,
        }))
    }
}

// =============================================================================
// Provisioned -> Healthy | Unverified
// =============================================================================

impl Deployment<Provisioned> {
    /// Poll health until it passes or the verification window closes.
    #[must_use = "deployment state must be used"]
    pub async fn verify(mut self, ctx: &DeployContext) -> VerifyOutcome {
        let environment = self.record.environment;
        let outcome = tokio::select! {
            result = ctx.verifier.verify(environment, ctx.timeouts.verify, ctx.poll_interval) => Some(result),
            _ = self.cancel.cancelled() => None,
        };

        match outcome {
            None => VerifyOutcome::Failed(self.fail(ctx, DeployError::Cancelled).await),
            Some(Ok(report)) => {
                if let Err(e) = self.enter(ctx, DeploymentState::Healthy).await {
                    return VerifyOutcome::Failed(self.fail(ctx, e).await);
                }
                VerifyOutcome::Healthy(self.transition(Healthy { report }))
            }
            Some(Err(error)) => {
                tracing::warn!(
                    %environment,
                    deployment = %self.record.id.short(),
                    reason = %error.reason,
                    polls = error.polls,
                    "Verification failed"
                );
                VerifyOutcome::Unverified(self.transition(Unverified { error }))
            }
        }
    }
}

// =============================================================================
// Unverified -> RolledBack | Failed
// =============================================================================

impl Deployment<Unverified> {
    /// Re-apply the most recent other Healthy artifact for this environment.
    ///
    /// With no Healthy history the deployment fails and is flagged for
    /// manual intervention.
    #[must_use = "deployment state must be used"]
    pub async fn rollback(mut self, ctx: &DeployContext) -> TransitionResult<RolledBack> {
        let environment = self.record.environment;
        let cause = self.state.error.clone();

        let target = match ctx.history.last_healthy(environment, &self.record.id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                let error = DeployError::NoRollbackTarget { environment, cause };
                return Err(self.fail(ctx, error).await);
            }
            Err(e) => return Err(self.fail(ctx, e.into()).await),
        };

        tracing::warn!(
            %environment,
            deployment = %self.record.id.short(),
            target = %target.id.short(),
            digest = %target.artifact.digest(),
            "Rolling back"
        );

        let mut attempts = 0;
        match self.reconcile(ctx, &target.artifact, &mut attempts).await {
            Ok(_) => {}
            Err(DeployError::Cancelled) => {
                return Err(self.fail(ctx, DeployError::Cancelled).await);
            }
            Err(e) => {
                self.report_residual_state(ctx).await;
                let reason = match e {
                    DeployError::Provision { source, .. } => rollback_reason(&source),
                    other => other.to_string(),
                };
                let error = DeployError::RollbackFailed {
                    cause,
                    target: target.artifact.digest().to_string(),
                    reason,
                };
                return Err(self.fail(ctx, error).await);
            }
        }

        self.record.rolled_back_to = Some(target.artifact.clone());
        self.record.error = Some(RecordedError::from(&DeployError::Verification(cause)));
        self.record.requires_intervention = false;

        if let Err(e) = self.enter(ctx, DeploymentState::RolledBack).await {
            return Err(self.fail(ctx, e).await);
        }
        Ok(self.transition(RolledBack { target: target.id }))
    }
}

fn rollback_reason(source: &ProvisionError) -> String {
    format!("{} ({})", source, source.kind())
}
