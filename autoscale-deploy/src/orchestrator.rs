//! C10: the one-shot deployment orchestrator (spec §4.10). Drives a
//! `Deployment` through its ten linear steps, persisting progress after
//! every transition and streaming structured messages to subscribers.

use crate::error_taxonomy;
use crate::estimates;
use crate::provisioner::{Provisioner, StepContext};
use crate::store::DeploymentStore;
use crate::stream::{DeploymentEventHub, StreamMessage};
use crate::types::{DeploymentProgress, DeploymentRequest, RetryInfo, StepId, StepStatus};
use autoscale_core::utils::Clock;
use autoscale_core::{AutoscaleError, DeploymentId, Result};
use autoscale_providers::Credentials;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

/// Per-deployment overrides accepted by `retry` (spec §4.10).
#[derive(Default)]
pub struct RetryConfig {
    pub credentials: Option<Credentials>,
}

/// Resumable, progress-streamed multi-step cloud install (spec §4.10).
pub struct DeploymentOrchestrator {
    store: Arc<dyn DeploymentStore>,
    provisioner: Arc<dyn Provisioner>,
    hub: Arc<DeploymentEventHub>,
    clock: Arc<dyn Clock>,
    /// Credentials are kept in process memory only, never persisted or
    /// logged (spec §6 "adapters must not log secrets"); lost on restart,
    /// which only matters for a deployment that needs `retry` after a
    /// process restart — an acceptable gap given credentials would need to
    /// be re-supplied by the caller in that case anyway.
    requests: Mutex<HashMap<DeploymentId, DeploymentRequest>>,
    cancellations: Mutex<HashMap<DeploymentId, watch::Sender<bool>>>,
}

impl DeploymentOrchestrator {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        provisioner: Arc<dyn Provisioner>,
        hub: Arc<DeploymentEventHub>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            provisioner,
            hub,
            clock,
            requests: Mutex::new(HashMap::new()),
            cancellations: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a new deployment and kicks off the step loop in the
    /// background, returning immediately with its id (spec §4.10).
    pub async fn start_deployment(self: &Arc<Self>, request: DeploymentRequest) -> Result<DeploymentId> {
        let id = DeploymentId::new();
        let now = self.clock.now();
        let progress = DeploymentProgress::new(id, &request, now);
        self.store.upsert(progress).await?;
        self.requests.lock().await.insert(id, request);

        let (tx, rx) = watch::channel(false);
        self.cancellations.lock().await.insert(id, tx);

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_from(id, 0, rx).await;
        });

        Ok(id)
    }

    pub async fn get_progress(&self, id: DeploymentId) -> Result<DeploymentProgress> {
        self.store.get(id).await
    }

    pub async fn list_deployments(&self) -> Result<Vec<DeploymentProgress>> {
        self.store.list().await
    }

    pub fn subscribe(&self, id: DeploymentId) -> tokio::sync::broadcast::Receiver<StreamMessage> {
        self.hub.subscribe(id)
    }

    /// Cancels the in-flight provisioner operation; the in-flight step call
    /// is allowed to complete (it is not safely cancellable), but no further
    /// step begins (spec §5). The recorded resource list remains the
    /// best-effort teardown instruction set.
    pub async fn cancel(&self, id: DeploymentId) -> Result<()> {
        let cancellations = self.cancellations.lock().await;
        if let Some(tx) = cancellations.get(&id) {
            let _ = tx.send(true);
        }
        Ok(())
    }

    /// Whether a failed step exists, is in the retryable step set, and its
    /// recorded error is itself retryable (spec §4.10).
    pub async fn get_retry_info(&self, id: DeploymentId) -> Result<RetryInfo> {
        let progress = self.store.get(id).await?;
        let info = match progress.failed_step() {
            Some(step) => RetryInfo {
                can_retry: step.id.is_retryable_kind()
                    && step.error.as_ref().map(|e| e.retryable).unwrap_or(false),
                failed_step_id: Some(step.id),
            },
            None => RetryInfo {
                can_retry: false,
                failed_step_id: None,
            },
        };
        Ok(info)
    }

    /// Rejects if any step is `in_progress`. Resets the failed step and
    /// every later step to `pending`, clears their errors, then resumes the
    /// loop from the failed step (spec §4.10).
    pub async fn retry(self: &Arc<Self>, id: DeploymentId, cfg: RetryConfig) -> Result<()> {
        let mut progress = self.store.get(id).await?;

        if progress.steps.iter().any(|s| s.status == StepStatus::InProgress) {
            return Err(AutoscaleError::conflict("deployment has a step in progress"));
        }

        let Some(failed_index) = progress.steps.iter().position(|s| s.status == StepStatus::Failed) else {
            return Err(AutoscaleError::conflict("no failed step to retry"));
        };

        for step in &mut progress.steps[failed_index..] {
            step.status = StepStatus::Pending;
            step.started_at = None;
            step.completed_at = None;
            step.elapsed_ms = None;
            step.error = None;
            step.sub_steps.clear();
        }
        progress.can_retry = false;
        progress.cancelled = false;
        progress.updated_at = self.clock.now();
        self.store.upsert(progress).await?;

        if let Some(credentials) = cfg.credentials {
            if let Some(request) = self.requests.lock().await.get_mut(&id) {
                request.credentials = credentials;
            }
        }

        let (tx, rx) = watch::channel(false);
        self.cancellations.lock().await.insert(id, tx);

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_from(id, failed_index, rx).await;
        });

        Ok(())
    }

    async fn run_from(self: Arc<Self>, id: DeploymentId, start_index: usize, cancel_rx: watch::Receiver<bool>) {
        for index in start_index..StepId::ALL.len() {
            if *cancel_rx.borrow() {
                self.mark_cancelled(id).await;
                return;
            }

            let step_id = StepId::ALL[index];
            if let Err(e) = self.run_step(id, index, step_id).await {
                error!(deployment_id = %id, step = step_id.as_str(), "deployment step failed: {e}");
                return;
            }
        }
        info!(deployment_id = %id, "deployment reached ready");
    }

    async fn mark_cancelled(&self, id: DeploymentId) {
        if let Ok(mut progress) = self.store.get(id).await {
            progress.cancelled = true;
            progress.updated_at = self.clock.now();
            let _ = self.store.upsert(progress).await;
        }
        self.hub.publish(StreamMessage::status(id, "canceled", self.clock.now()));
    }

    async fn run_step(&self, id: DeploymentId, index: usize, step_id: StepId) -> Result<()> {
        let mut progress = self.store.get(id).await?;
        let now = self.clock.now();

        progress.current_step_index = index;
        progress.steps[index].status = StepStatus::InProgress;
        progress.steps[index].started_at = Some(now);
        progress.updated_at = now;
        self.store.upsert(progress.clone()).await?;
        self.hub.publish(StreamMessage::step(id, progress.steps[index].clone(), now));

        let requests = self.requests.lock().await;
        let Some(request) = requests.get(&id).cloned() else {
            drop(requests);
            return Err(AutoscaleError::Fatal(format!("no request recorded for deployment {id}")));
        };
        drop(requests);

        let ctx = StepContext {
            deployment_id: id,
            request: &request,
            resources_so_far: &progress.resources,
        };

        match self.provisioner.run_step(step_id, &ctx).await {
            Ok(outcome) => {
                let completed_at = self.clock.now();
                let elapsed_ms = progress.steps[index]
                    .started_at
                    .map(|started| (completed_at - started).num_milliseconds().max(0) as u64);

                progress.steps[index].status = StepStatus::Completed;
                progress.steps[index].completed_at = Some(completed_at);
                progress.steps[index].elapsed_ms = elapsed_ms;
                progress.steps[index].sub_steps = outcome.sub_steps;
                progress.resources.extend(outcome.resources);

                let completed_count = progress.steps.iter().filter(|s| s.status == StepStatus::Completed).count();
                progress.overall_percent = ((completed_count * 100) / StepId::ALL.len()) as u8;
                progress.estimated_remaining_ms =
                    estimates::estimated_remaining_ms(&progress.provider, &progress.steps, |_| 0);
                progress.updated_at = completed_at;
                self.store.upsert(progress.clone()).await?;

                self.hub.publish(StreamMessage::step(id, progress.steps[index].clone(), completed_at));
                self.hub.publish(StreamMessage::progress(id, progress.overall_percent, completed_at));
                Ok(())
            }
            Err(e) => {
                let error_info = error_taxonomy::classify(&e.to_string(), step_id);
                let failed_at = self.clock.now();

                progress.steps[index].status = StepStatus::Failed;
                progress.steps[index].completed_at = Some(failed_at);
                progress.steps[index].error = Some(error_info.clone());
                progress.can_retry = step_id.is_retryable_kind() && error_info.retryable;
                progress.updated_at = failed_at;
                self.store.upsert(progress.clone()).await?;

                self.hub.publish(StreamMessage::error(id, step_id, error_info.clone(), failed_at));
                warn!(deployment_id = %id, step = step_id.as_str(), code = ?error_info.code, "step failed");
                Err(AutoscaleError::provider(
                    autoscale_core::error::ProviderErrorKind::Provider,
                    error_info.message,
                ))
            }
        }
    }
}
