//! The pluggable surface each deployment step runs through. A production
//! implementation would drive `autoscale-providers` (compute) and
//! `autoscale-cluster` (k8s/health); this crate ships a deterministic mock
//! so the orchestrator's state machine is fully testable without a live
//! cloud account, mirroring `autoscale-providers::MockProvider`.

use crate::types::{CreatedResource, DeploymentRequest, StepId, SubStep};
use async_trait::async_trait;
use autoscale_core::{AutoscaleError, DeploymentId, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Everything a step needs to know about the deployment it belongs to.
pub struct StepContext<'a> {
    pub deployment_id: DeploymentId,
    pub request: &'a DeploymentRequest,
    pub resources_so_far: &'a [CreatedResource],
}

/// What running one step produced.
pub struct StepOutcome {
    pub resources: Vec<CreatedResource>,
    pub sub_steps: Vec<SubStep>,
}

impl StepOutcome {
    pub fn simple(resource: CreatedResource) -> Self {
        Self {
            resources: vec![resource],
            sub_steps: vec![],
        }
    }
}

/// Executes exactly one step of the install workflow (spec §4.10). Errors
/// propagate as a plain message; the orchestrator runs it through
/// `error_taxonomy::classify` before recording it.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn run_step(&self, step: StepId, ctx: &StepContext<'_>) -> Result<StepOutcome>;
}

/// Deterministic in-memory provisioner for tests and local development.
/// Each step "creates" one resource; `compute` additionally reports
/// sub-step progress for a control plane plus N workers, per spec §4.10.
pub struct MockProvisioner {
    worker_count: u32,
    fail_step: Mutex<Option<StepId>>,
    fail_message: Mutex<String>,
}

impl MockProvisioner {
    pub fn new(worker_count: u32) -> Self {
        Self {
            worker_count,
            fail_step: Mutex::new(None),
            fail_message: Mutex::new(String::new()),
        }
    }

    /// Makes the given step fail the next time it runs, with `message`.
    pub fn fail_next(&self, step: StepId, message: impl Into<String>) {
        *self.fail_step.lock().unwrap() = Some(step);
        *self.fail_message.lock().unwrap() = message.into();
    }

    fn maybe_fail(&self, step: StepId) -> Result<()> {
        let mut fail_step = self.fail_step.lock().unwrap();
        if *fail_step == Some(step) {
            *fail_step = None;
            let message = self.fail_message.lock().unwrap().clone();
            return Err(AutoscaleError::Transport(message));
        }
        Ok(())
    }

    fn resource_kind(step: StepId) -> &'static str {
        match step {
            StepId::Auth => "credential-check",
            StepId::Network => "vpc",
            StepId::Compute => "node-group",
            StepId::K8s => "cluster",
            StepId::Storage => "bucket",
            StepId::Catalog => "catalog-service",
            StepId::App => "app-deployment",
            StepId::Health => "health-probe",
            StepId::Ssl => "certificate",
            StepId::Ready => "ready-marker",
        }
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn run_step(&self, step: StepId, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        self.maybe_fail(step)?;

        if step == StepId::Compute {
            let mut sub_steps = vec![SubStep {
                name: "control-plane".to_string(),
                status: crate::types::StepStatus::Completed,
                current: 1,
                total: 1,
                details: None,
            }];
            for i in 1..=self.worker_count {
                sub_steps.push(SubStep {
                    name: format!("worker-{i}"),
                    status: crate::types::StepStatus::Completed,
                    current: i,
                    total: self.worker_count,
                    details: Some(format!("worker {i} of {}", self.worker_count)),
                });
            }
            let resource = CreatedResource {
                resource_type: Self::resource_kind(step).to_string(),
                name: format!("{}-node-group", ctx.request.provider),
                id: autoscale_core::utils::generate_short_id("ng"),
                region: ctx.request.region.clone(),
            };
            return Ok(StepOutcome {
                resources: vec![resource],
                sub_steps,
            });
        }

        let resource = CreatedResource {
            resource_type: Self::resource_kind(step).to_string(),
            name: format!("{}-{}", ctx.request.provider, step.as_str()),
            id: autoscale_core::utils::generate_short_id(step.as_str()),
            region: ctx.request.region.clone(),
        };
        Ok(StepOutcome::simple(resource))
    }
}

/// Size-choice presets, expanded to a worker count the provisioner can use.
/// Spec §4.10 names "size choice" as an input but leaves the mapping to the
/// implementer.
pub fn worker_count_for_size(size: &str) -> u32 {
    let table: HashMap<&str, u32> = HashMap::from([("small", 1), ("medium", 3), ("large", 6)]);
    *table.get(size).unwrap_or(&1)
}
