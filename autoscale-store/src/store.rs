use crate::entities::*;
use async_trait::async_trait;
use autoscale_core::{NodeId, NodePoolId, OperationId, PolicyId, RuleId, ScheduleId};
use autoscale_core::Result;

/// Filters accepted by `list_nodes` / `list_node_pools`-style queries.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub active_only: bool,
}

/// CRUD and query operations over every entity in the data model (spec §3,
/// §4.4). A relational implementation is assumed in production; this crate
/// ships an in-memory one for tests and small deployments.
#[async_trait]
pub trait ScalingStore: Send + Sync {
    async fn create_policy(&self, policy: Policy) -> Result<Policy>;
    async fn get_policy(&self, id: PolicyId) -> Result<Policy>;
    async fn get_policy_by_name(&self, name: &str) -> Result<Option<Policy>>;
    async fn list_policies(&self) -> Result<Vec<Policy>>;
    async fn update_policy(&self, policy: Policy) -> Result<Policy>;
    /// Deletes the policy along with its rules, schedules, state and
    /// pending history reference (spec §3 `Policy` invariant).
    async fn delete_policy(&self, id: PolicyId) -> Result<()>;

    async fn add_rule(&self, rule: Rule) -> Result<Rule>;
    async fn list_rules(&self, policy_id: PolicyId) -> Result<Vec<Rule>>;
    async fn delete_rule(&self, id: RuleId) -> Result<()>;

    async fn add_schedule(&self, schedule: Schedule) -> Result<Schedule>;
    async fn list_schedules(&self, policy_id: PolicyId) -> Result<Vec<Schedule>>;
    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule>;

    /// Atomically creates or updates by `policy_id` (spec §4.4).
    async fn upsert_state(&self, state: PolicyState) -> Result<PolicyState>;
    async fn get_state(&self, policy_id: PolicyId) -> Result<Option<PolicyState>>;

    async fn append_history(&self, entry: HistoryEntry) -> Result<HistoryEntry>;
    async fn list_history(&self, policy_id: PolicyId, limit: usize) -> Result<Vec<HistoryEntry>>;

    async fn create_node_pool(&self, pool: NodePool) -> Result<NodePool>;
    async fn get_node_pool(&self, id: NodePoolId) -> Result<NodePool>;
    async fn list_node_pools(&self) -> Result<Vec<NodePool>>;
    async fn update_node_pool(&self, pool: NodePool) -> Result<NodePool>;

    async fn create_node(&self, node: Node) -> Result<Node>;
    async fn get_node(&self, id: NodeId) -> Result<Node>;
    async fn list_nodes(&self, pool_id: NodePoolId, opts: &ListOptions) -> Result<Vec<Node>>;
    async fn update_node(&self, node: Node) -> Result<Node>;
    /// Sets `status=deleted`, `deleted_at=now` (spec §4.4).
    async fn soft_delete_node(&self, id: NodeId) -> Result<Node>;
    /// Excludes soft-deleted/failed nodes (spec §4.4).
    async fn count_active_nodes(&self, pool_id: NodePoolId) -> Result<i64>;

    async fn create_operation(&self, operation: ScalingOperation) -> Result<ScalingOperation>;
    async fn get_operation(&self, id: OperationId) -> Result<ScalingOperation>;
    /// Sets `completed_at` iff `status` is terminal (spec §4.4).
    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
        actual_count: Option<i64>,
        error: Option<String>,
        affected_node_ids: Vec<NodeId>,
    ) -> Result<ScalingOperation>;
    async fn list_operations(&self, pool_id: NodePoolId) -> Result<Vec<ScalingOperation>>;

    async fn cache_pricing(&self, pricing: InstanceTypePricingRecord) -> Result<()>;
    async fn get_pricing(
        &self,
        provider: &str,
        instance_type: &str,
        region: &str,
    ) -> Result<Option<InstanceTypePricingRecord>>;

    async fn upsert_idle_state(&self, state: IdleState) -> Result<IdleState>;
    async fn get_idle_state(&self, policy_id: PolicyId) -> Result<Option<IdleState>>;

    async fn accumulate_daily_savings(&self, delta: DailySavings) -> Result<DailySavings>;
    async fn list_daily_savings(&self, policy_id: PolicyId) -> Result<Vec<DailySavings>>;
}
