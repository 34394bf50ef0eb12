use autoscale_core::DeploymentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The ten linear steps of a deployment (spec §4.10). Order is significant:
/// index in this array is index in `DeploymentProgress.steps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Auth,
    Network,
    Compute,
    K8s,
    Storage,
    Catalog,
    App,
    Health,
    Ssl,
    Ready,
}

impl StepId {
    pub const ALL: [StepId; 10] = [
        StepId::Auth,
        StepId::Network,
        StepId::Compute,
        StepId::K8s,
        StepId::Storage,
        StepId::Catalog,
        StepId::App,
        StepId::Health,
        StepId::Ssl,
        StepId::Ready,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Auth => "auth",
            StepId::Network => "network",
            StepId::Compute => "compute",
            StepId::K8s => "k8s",
            StepId::Storage => "storage",
            StepId::Catalog => "catalog",
            StepId::App => "app",
            StepId::Health => "health",
            StepId::Ssl => "ssl",
            StepId::Ready => "ready",
        }
    }

    pub fn index(&self) -> usize {
        StepId::ALL.iter().position(|s| s == self).expect("StepId::ALL is exhaustive")
    }

    /// `ready` is a terminal marker step, not something `retry` can target
    /// (spec §4.10 retry set).
    pub fn is_retryable_kind(&self) -> bool {
        !matches!(self, StepId::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// One granular progress unit inside a step, e.g. `compute` expanding into
/// `control-plane` + `worker-i of N` (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubStep {
    pub name: String,
    pub status: StepStatus,
    pub current: u32,
    pub total: u32,
    pub details: Option<String>,
}

impl SubStep {
    pub fn new(name: impl Into<String>, total: u32) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            current: 0,
            total,
            details: None,
        }
    }
}

/// A resource the provisioner created, retained so `cancel`'s teardown
/// instruction set survives a step boundary (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResource {
    pub resource_type: String,
    pub name: String,
    pub id: String,
    pub region: String,
}

/// Per-step bookkeeping inside one `DeploymentProgress` (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: StepId,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<u64>,
    pub sub_steps: Vec<SubStep>,
    pub error: Option<ErrorInfo>,
}

impl StepRecord {
    pub fn pending(id: StepId) -> Self {
        Self {
            id,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            elapsed_ms: None,
            sub_steps: Vec::new(),
            error: None,
        }
    }
}

/// Fixed error taxonomy codes (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthFailed,
    QuotaExceeded,
    Timeout,
    NetworkError,
    PermissionDenied,
    ResourceNotFound,
    ResourceConflict,
    RateLimited,
    ProviderError,
    SshError,
    K8sError,
    StorageError,
    SslError,
    UnknownError,
}

/// User-visible failure shape, streamed as an `error` event or returned as a
/// structured API error (spec §4.10, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
    pub suggestions: Vec<String>,
    pub retryable: bool,
    pub docs_url: Option<String>,
}

/// Input to `start_deployment`: credentials + size choice (spec §4.10).
#[derive(Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub provider: String,
    pub region: String,
    pub size: String,
    pub credentials: autoscale_providers::Credentials,
}

impl std::fmt::Debug for DeploymentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentRequest")
            .field("provider", &self.provider)
            .field("region", &self.region)
            .field("size", &self.size)
            .finish()
    }
}

/// Full workflow state for one install (spec §4.10 `DeploymentProgress`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentProgress {
    pub id: DeploymentId,
    pub provider: String,
    pub region: String,
    pub size: String,
    pub overall_percent: u8,
    pub current_step_index: usize,
    pub steps: Vec<StepRecord>,
    pub resources: Vec<CreatedResource>,
    pub estimated_remaining_ms: u64,
    pub can_retry: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentProgress {
    pub fn new(id: DeploymentId, request: &DeploymentRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            provider: request.provider.clone(),
            region: request.region.clone(),
            size: request.size.clone(),
            overall_percent: 0,
            current_step_index: 0,
            steps: StepId::ALL.iter().map(|s| StepRecord::pending(*s)).collect(),
            resources: Vec::new(),
            estimated_remaining_ms: 0,
            can_retry: false,
            cancelled: false,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}

/// Whether a failed deployment can be retried, and which step it failed at
/// (spec §4.10 `get_retry_info`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryInfo {
    pub can_retry: bool,
    pub failed_step_id: Option<StepId>,
}
