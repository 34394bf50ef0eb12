use autoscale_core::{NodeId, NodePoolId, OperationId, PolicyId, RuleId, ScheduleId};
use autoscale_core::{Operator, TargetType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declarative scaling intent (spec §3 `Policy`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    pub target_type: TargetType,
    pub target_id: Option<String>,
    pub min_replicas: i64,
    pub max_replicas: i64,
    pub cooldown_seconds: i64,
    pub max_hourly_cost: Option<f64>,
    pub scale_to_zero: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_replicas < 0 {
            return Err("min_replicas must be >= 0".to_string());
        }
        if self.max_replicas < 1 {
            return Err("max_replicas must be >= 1".to_string());
        }
        if self.min_replicas > self.max_replicas {
            return Err("min_replicas must be <= max_replicas".to_string());
        }
        if self.cooldown_seconds < 0 {
            return Err("cooldown_seconds must be >= 0".to_string());
        }
        Ok(())
    }
}

/// Which side of the scale a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleDirection {
    ScaleUp,
    ScaleDown,
}

/// A metric condition attached to a policy (spec §3 `Rule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub policy_id: PolicyId,
    pub direction: RuleDirection,
    pub metric: String,
    pub operator: Operator,
    pub threshold: f64,
    pub duration_seconds: i64,
    pub scale_by: i64,
}

impl Rule {
    /// `scale_by=0` is invalid at creation; sign must agree with direction
    /// (spec §3 `Rule`: "positive for scale-up rules, negative for
    /// scale-down rules").
    pub fn validate(&self) -> Result<(), String> {
        if self.scale_by == 0 {
            return Err("scale_by must be nonzero".to_string());
        }
        match self.direction {
            RuleDirection::ScaleUp if self.scale_by < 0 => {
                Err("scale_by must be positive for a scale-up rule".to_string())
            }
            RuleDirection::ScaleDown if self.scale_by > 0 => {
                Err("scale_by must be negative for a scale-down rule".to_string())
            }
            _ => Ok(()),
        }?;
        if self.duration_seconds < 0 {
            return Err("duration_seconds must be >= 0".to_string());
        }
        Ok(())
    }
}

/// Cron-driven replica override (spec §3 `Schedule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub policy_id: PolicyId,
    pub cron_expression: String,
    pub timezone: String,
    pub desired_replicas: i64,
    pub enabled: bool,
    /// When this schedule last fired; used to make cron matching
    /// edge-triggered rather than level-triggered (see SPEC_FULL open
    /// question on schedule semantics).
    pub last_fire_time: Option<DateTime<Utc>>,
}

/// Per-policy runtime state, one row per policy (spec §3 `State`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyState {
    pub policy_id: PolicyId,
    pub current_replicas: i64,
    pub last_scale_time: Option<DateTime<Utc>>,
    pub last_scale_action: Option<String>,
    pub pending_conditions: HashMap<RuleId, DateTime<Utc>>,
}

impl PolicyState {
    pub fn new(policy_id: PolicyId, current_replicas: i64) -> Self {
        Self {
            policy_id,
            current_replicas,
            last_scale_time: None,
            last_scale_action: None,
            pending_conditions: HashMap::new(),
        }
    }
}

/// Append-only audit record of an executed (or dry-run) scaling action
/// (spec §3 `History`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: uuid::Uuid,
    pub policy_name: String,
    pub action: String,
    pub target_type: TargetType,
    pub target_id: Option<String>,
    pub previous_replicas: i64,
    pub new_replicas: i64,
    pub reason: String,
    pub triggered_by: String,
    pub dry_run: bool,
    pub executed_at: DateTime<Utc>,
}

/// A homogeneous group of cloud machines (spec §3 `NodePool`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePool {
    pub id: NodePoolId,
    pub name: String,
    pub provider: String,
    pub region: String,
    pub instance_type: String,
    pub image: String,
    pub min_nodes: i64,
    pub max_nodes: i64,
    pub current_nodes: i64,
    pub labels: HashMap<String, String>,
    pub taints: Vec<String>,
    pub user_data_template: Option<String>,
    pub ssh_key_id: Option<String>,
    pub network_id: Option<String>,
    pub firewall_id: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Creating,
    Joining,
    Ready,
    Draining,
    Deleting,
    Deleted,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Deleted | NodeStatus::Failed)
    }
}

/// One machine inside a pool (spec §3 `Node`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub pool_id: NodePoolId,
    pub provider_id: String,
    pub node_name: Option<String>,
    pub status: NodeStatus,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub hourly_cost: Option<f64>,
    pub is_spot: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Canceled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Canceled
        )
    }
}

/// Audit record of a node-count change (spec §3 `ScalingOperation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingOperation {
    pub id: OperationId,
    pub pool_id: NodePoolId,
    pub policy_id: Option<PolicyId>,
    pub action: ScalingAction,
    pub previous_count: i64,
    pub target_count: i64,
    pub actual_count: Option<i64>,
    pub status: OperationStatus,
    pub affected_node_ids: Vec<NodeId>,
    pub cost_change_estimate: f64,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Cached (provider, instance_type, region) pricing (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTypePricingRecord {
    pub provider: String,
    pub instance_type: String,
    pub region: String,
    pub hourly_cost: f64,
    pub cpu: f64,
    pub memory_gb: f64,
    pub disk_gb: f64,
    pub spot_available: bool,
    pub cached_at: DateTime<Utc>,
}

/// Per-policy activity tracker (spec §3 `IdleState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleState {
    pub policy_id: PolicyId,
    pub last_activity_at: DateTime<Utc>,
    pub idle_since: Option<DateTime<Utc>>,
    pub is_scaled_to_zero: bool,
    pub scaled_to_zero_at: Option<DateTime<Utc>>,
    pub last_wake_at: Option<DateTime<Utc>>,
    pub wake_reason: Option<String>,
}

impl IdleState {
    pub fn new(policy_id: PolicyId, now: DateTime<Utc>) -> Self {
        Self {
            policy_id,
            last_activity_at: now,
            idle_since: None,
            is_scaled_to_zero: false,
            scaled_to_zero_at: None,
            last_wake_at: None,
            wake_reason: None,
        }
    }
}

/// Per (policy, date) savings accumulator (spec §3 `DailySavings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySavings {
    pub policy_id: PolicyId,
    pub date: chrono::NaiveDate,
    pub idle_seconds: i64,
    pub scaled_to_zero_seconds: i64,
    pub savings_cents: i64,
}
