use crate::entities::*;
use crate::store::{ListOptions, ScalingStore};
use async_trait::async_trait;
use autoscale_core::{AutoscaleError, NodeId, NodePoolId, OperationId, PolicyId, RuleId, ScheduleId};
use autoscale_core::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    policies: HashMap<PolicyId, Policy>,
    rules: HashMap<RuleId, Rule>,
    schedules: HashMap<ScheduleId, Schedule>,
    states: HashMap<PolicyId, PolicyState>,
    history: Vec<HistoryEntry>,
    node_pools: HashMap<NodePoolId, NodePool>,
    nodes: HashMap<NodeId, Node>,
    operations: HashMap<OperationId, ScalingOperation>,
    pricing: Vec<InstanceTypePricingRecord>,
    idle_states: HashMap<PolicyId, IdleState>,
    daily_savings: Vec<DailySavings>,
}

/// Single-process store backed by an in-memory snapshot, optionally
/// mirrored to a JSON file on every mutation (spec §4.4). Mirrors the
/// teacher's "load on construction, write-through on change" pattern.
pub struct InMemoryScalingStore {
    state: RwLock<Snapshot>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryScalingStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Snapshot::default()),
            snapshot_path: None,
        }
    }

    /// Loads an existing snapshot from `path` if present, and persists to
    /// it after every mutation.
    pub fn with_snapshot_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            Snapshot::default()
        };
        Ok(Self {
            state: RwLock::new(snapshot),
            snapshot_path: Some(path),
        })
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for InMemoryScalingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScalingStore for InMemoryScalingStore {
    async fn create_policy(&self, mut policy: Policy) -> Result<Policy> {
        let mut state = self.state.write().unwrap();
        if state.policies.values().any(|p| p.name == policy.name) {
            return Err(AutoscaleError::conflict(format!(
                "policy name already exists: {}",
                policy.name
            )));
        }
        policy.validate().map_err(|e| AutoscaleError::validation("policy", e))?;
        state.policies.insert(policy.id, policy.clone());
        self.persist(&state)?;
        Ok(policy)
    }

    async fn get_policy(&self, id: PolicyId) -> Result<Policy> {
        self.state
            .read()
            .unwrap()
            .policies
            .get(&id)
            .cloned()
            .ok_or_else(|| AutoscaleError::not_found(format!("policy not found: {id}")))
    }

    async fn get_policy_by_name(&self, name: &str) -> Result<Option<Policy>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .policies
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        Ok(self.state.read().unwrap().policies.values().cloned().collect())
    }

    async fn update_policy(&self, policy: Policy) -> Result<Policy> {
        policy.validate().map_err(|e| AutoscaleError::validation("policy", e))?;
        let mut state = self.state.write().unwrap();
        if !state.policies.contains_key(&policy.id) {
            return Err(AutoscaleError::not_found(format!("policy not found: {}", policy.id)));
        }
        if state
            .policies
            .values()
            .any(|p| p.id != policy.id && p.name == policy.name)
        {
            return Err(AutoscaleError::conflict(format!(
                "policy name already exists: {}",
                policy.name
            )));
        }
        state.policies.insert(policy.id, policy.clone());
        self.persist(&state)?;
        Ok(policy)
    }

    async fn delete_policy(&self, id: PolicyId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.policies.remove(&id);
        state.rules.retain(|_, r| r.policy_id != id);
        state.schedules.retain(|_, s| s.policy_id != id);
        state.states.remove(&id);
        self.persist(&state)?;
        Ok(())
    }

    async fn add_rule(&self, rule: Rule) -> Result<Rule> {
        rule.validate().map_err(|e| AutoscaleError::validation("rule", e))?;
        let mut state = self.state.write().unwrap();
        state.rules.insert(rule.id, rule.clone());
        self.persist(&state)?;
        Ok(rule)
    }

    async fn list_rules(&self, policy_id: PolicyId) -> Result<Vec<Rule>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .rules
            .values()
            .filter(|r| r.policy_id == policy_id)
            .cloned()
            .collect())
    }

    async fn delete_rule(&self, id: RuleId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.rules.remove(&id);
        self.persist(&state)?;
        Ok(())
    }

    async fn add_schedule(&self, schedule: Schedule) -> Result<Schedule> {
        let mut state = self.state.write().unwrap();
        state.schedules.insert(schedule.id, schedule.clone());
        self.persist(&state)?;
        Ok(schedule)
    }

    async fn list_schedules(&self, policy_id: PolicyId) -> Result<Vec<Schedule>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .schedules
            .values()
            .filter(|s| s.policy_id == policy_id)
            .cloned()
            .collect())
    }

    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule> {
        let mut state = self.state.write().unwrap();
        state.schedules.insert(schedule.id, schedule.clone());
        self.persist(&state)?;
        Ok(schedule)
    }

    async fn upsert_state(&self, policy_state: PolicyState) -> Result<PolicyState> {
        let mut state = self.state.write().unwrap();
        state.states.insert(policy_state.policy_id, policy_state.clone());
        self.persist(&state)?;
        Ok(policy_state)
    }

    async fn get_state(&self, policy_id: PolicyId) -> Result<Option<PolicyState>> {
        Ok(self.state.read().unwrap().states.get(&policy_id).cloned())
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<HistoryEntry> {
        let mut state = self.state.write().unwrap();
        state.history.push(entry.clone());
        self.persist(&state)?;
        Ok(entry)
    }

    async fn list_history(&self, policy_id: PolicyId, limit: usize) -> Result<Vec<HistoryEntry>> {
        let state = self.state.read().unwrap();
        let policy_name = state.policies.get(&policy_id).map(|p| p.name.clone());
        let Some(policy_name) = policy_name else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<HistoryEntry> = state
            .history
            .iter()
            .filter(|h| h.policy_name == policy_name)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn create_node_pool(&self, mut pool: NodePool) -> Result<NodePool> {
        let mut state = self.state.write().unwrap();
        if state.node_pools.values().any(|p| p.name == pool.name) {
            return Err(AutoscaleError::conflict(format!(
                "node pool name already exists: {}",
                pool.name
            )));
        }
        if pool.min_nodes > pool.max_nodes {
            return Err(AutoscaleError::validation("min_nodes", "must be <= max_nodes"));
        }
        pool.current_nodes = pool.current_nodes.clamp(pool.min_nodes, pool.max_nodes);
        state.node_pools.insert(pool.id, pool.clone());
        self.persist(&state)?;
        Ok(pool)
    }

    async fn get_node_pool(&self, id: NodePoolId) -> Result<NodePool> {
        self.state
            .read()
            .unwrap()
            .node_pools
            .get(&id)
            .cloned()
            .ok_or_else(|| AutoscaleError::not_found(format!("node pool not found: {id}")))
    }

    async fn list_node_pools(&self) -> Result<Vec<NodePool>> {
        Ok(self.state.read().unwrap().node_pools.values().cloned().collect())
    }

    async fn update_node_pool(&self, pool: NodePool) -> Result<NodePool> {
        let mut state = self.state.write().unwrap();
        if !state.node_pools.contains_key(&pool.id) {
            return Err(AutoscaleError::not_found(format!("node pool not found: {}", pool.id)));
        }
        state.node_pools.insert(pool.id, pool.clone());
        self.persist(&state)?;
        Ok(pool)
    }

    async fn create_node(&self, node: Node) -> Result<Node> {
        let mut state = self.state.write().unwrap();
        state.nodes.insert(node.id, node.clone());
        self.persist(&state)?;
        Ok(node)
    }

    async fn get_node(&self, id: NodeId) -> Result<Node> {
        self.state
            .read()
            .unwrap()
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| AutoscaleError::not_found(format!("node not found: {id}")))
    }

    async fn list_nodes(&self, pool_id: NodePoolId, opts: &ListOptions) -> Result<Vec<Node>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .nodes
            .values()
            .filter(|n| n.pool_id == pool_id)
            .filter(|n| !opts.active_only || !n.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn update_node(&self, node: Node) -> Result<Node> {
        let mut state = self.state.write().unwrap();
        state.nodes.insert(node.id, node.clone());
        self.persist(&state)?;
        Ok(node)
    }

    async fn soft_delete_node(&self, id: NodeId) -> Result<Node> {
        let mut state = self.state.write().unwrap();
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or_else(|| AutoscaleError::not_found(format!("node not found: {id}")))?;
        node.status = NodeStatus::Deleted;
        node.deleted_at = Some(Utc::now());
        let result = node.clone();
        self.persist(&state)?;
        Ok(result)
    }

    async fn count_active_nodes(&self, pool_id: NodePoolId) -> Result<i64> {
        Ok(self
            .state
            .read()
            .unwrap()
            .nodes
            .values()
            .filter(|n| n.pool_id == pool_id && !n.status.is_terminal())
            .count() as i64)
    }

    async fn create_operation(&self, operation: ScalingOperation) -> Result<ScalingOperation> {
        let mut state = self.state.write().unwrap();
        state.operations.insert(operation.id, operation.clone());
        self.persist(&state)?;
        Ok(operation)
    }

    async fn get_operation(&self, id: OperationId) -> Result<ScalingOperation> {
        self.state
            .read()
            .unwrap()
            .operations
            .get(&id)
            .cloned()
            .ok_or_else(|| AutoscaleError::not_found(format!("operation not found: {id}")))
    }

    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
        actual_count: Option<i64>,
        error: Option<String>,
        affected_node_ids: Vec<NodeId>,
    ) -> Result<ScalingOperation> {
        let mut state = self.state.write().unwrap();
        let operation = state
            .operations
            .get_mut(&id)
            .ok_or_else(|| AutoscaleError::not_found(format!("operation not found: {id}")))?;
        operation.status = status;
        if actual_count.is_some() {
            operation.actual_count = actual_count;
        }
        if error.is_some() {
            operation.error = error;
        }
        if !affected_node_ids.is_empty() {
            operation.affected_node_ids = affected_node_ids;
        }
        if status.is_terminal() {
            operation.completed_at = Some(Utc::now());
        }
        let result = operation.clone();
        self.persist(&state)?;
        Ok(result)
    }

    async fn list_operations(&self, pool_id: NodePoolId) -> Result<Vec<ScalingOperation>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .operations
            .values()
            .filter(|o| o.pool_id == pool_id)
            .cloned()
            .collect())
    }

    async fn cache_pricing(&self, pricing: InstanceTypePricingRecord) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.pricing.retain(|p| {
            !(p.provider == pricing.provider
                && p.instance_type == pricing.instance_type
                && p.region == pricing.region)
        });
        state.pricing.push(pricing);
        self.persist(&state)?;
        Ok(())
    }

    async fn get_pricing(
        &self,
        provider: &str,
        instance_type: &str,
        region: &str,
    ) -> Result<Option<InstanceTypePricingRecord>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .pricing
            .iter()
            .find(|p| p.provider == provider && p.instance_type == instance_type && p.region == region)
            .cloned())
    }

    async fn upsert_idle_state(&self, idle_state: IdleState) -> Result<IdleState> {
        let mut state = self.state.write().unwrap();
        state.idle_states.insert(idle_state.policy_id, idle_state.clone());
        self.persist(&state)?;
        Ok(idle_state)
    }

    async fn get_idle_state(&self, policy_id: PolicyId) -> Result<Option<IdleState>> {
        Ok(self.state.read().unwrap().idle_states.get(&policy_id).cloned())
    }

    async fn accumulate_daily_savings(&self, delta: DailySavings) -> Result<DailySavings> {
        let mut state = self.state.write().unwrap();
        let existing = state
            .daily_savings
            .iter_mut()
            .find(|d| d.policy_id == delta.policy_id && d.date == delta.date);
        let result = match existing {
            Some(entry) => {
                entry.idle_seconds += delta.idle_seconds;
                entry.scaled_to_zero_seconds += delta.scaled_to_zero_seconds;
                entry.savings_cents += delta.savings_cents;
                entry.clone()
            }
            None => {
                state.daily_savings.push(delta.clone());
                delta
            }
        };
        self.persist(&state)?;
        Ok(result)
    }

    async fn list_daily_savings(&self, policy_id: PolicyId) -> Result<Vec<DailySavings>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .daily_savings
            .iter()
            .filter(|d| d.policy_id == policy_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscale_core::TargetType;

    fn sample_policy(name: &str) -> Policy {
        Policy {
            id: PolicyId::new(),
            name: name.to_string(),
            target_type: TargetType::WorkloadKindA,
            target_id: None,
            min_replicas: 1,
            max_replicas: 10,
            cooldown_seconds: 60,
            max_hourly_cost: None,
            scale_to_zero: false,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_policy_name_is_rejected() {
        let store = InMemoryScalingStore::new();
        store.create_policy(sample_policy("cdc-worker")).await.unwrap();
        let err = store.create_policy(sample_policy("cdc-worker")).await.unwrap_err();
        assert!(matches!(err, AutoscaleError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_policy_cascades_rules_and_state() {
        let store = InMemoryScalingStore::new();
        let policy = store.create_policy(sample_policy("cdc-worker")).await.unwrap();
        store
            .add_rule(Rule {
                id: RuleId::new(),
                policy_id: policy.id,
                direction: RuleDirection::ScaleUp,
                metric: "lag".to_string(),
                operator: autoscale_core::Operator::GreaterThan,
                threshold: 100.0,
                duration_seconds: 60,
                scale_by: 1,
            })
            .await
            .unwrap();
        store
            .upsert_state(PolicyState::new(policy.id, 1))
            .await
            .unwrap();

        store.delete_policy(policy.id).await.unwrap();

        assert!(store.list_rules(policy.id).await.unwrap().is_empty());
        assert!(store.get_state(policy.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn soft_deleted_nodes_are_excluded_from_active_count() {
        let store = InMemoryScalingStore::new();
        let pool = store
            .create_node_pool(NodePool {
                id: NodePoolId::new(),
                name: "workers".to_string(),
                provider: "hetzner".to_string(),
                region: "eu-central".to_string(),
                instance_type: "cx31".to_string(),
                image: "ubuntu-22.04".to_string(),
                min_nodes: 0,
                max_nodes: 5,
                current_nodes: 2,
                labels: Default::default(),
                taints: vec![],
                user_data_template: None,
                ssh_key_id: None,
                network_id: None,
                firewall_id: None,
                enabled: true,
            })
            .await
            .unwrap();

        let node = store
            .create_node(Node {
                id: NodeId::new(),
                pool_id: pool.id,
                provider_id: "srv-1".to_string(),
                node_name: None,
                status: NodeStatus::Ready,
                public_ip: None,
                private_ip: None,
                hourly_cost: None,
                is_spot: false,
                failure_reason: None,
                created_at: Utc::now(),
                deleted_at: None,
            })
            .await
            .unwrap();

        assert_eq!(store.count_active_nodes(pool.id).await.unwrap(), 1);
        store.soft_delete_node(node.id).await.unwrap();
        assert_eq!(store.count_active_nodes(pool.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn operation_completion_sets_completed_at() {
        let store = InMemoryScalingStore::new();
        let operation = store
            .create_operation(ScalingOperation {
                id: OperationId::new(),
                pool_id: NodePoolId::new(),
                policy_id: None,
                action: ScalingAction::ScaleUp,
                previous_count: 1,
                target_count: 2,
                actual_count: None,
                status: OperationStatus::InProgress,
                affected_node_ids: vec![],
                cost_change_estimate: 0.0,
                dry_run: false,
                created_at: Utc::now(),
                completed_at: None,
                error: None,
            })
            .await
            .unwrap();

        let updated = store
            .update_operation_status(operation.id, OperationStatus::Completed, Some(2), None, vec![])
            .await
            .unwrap();
        assert!(updated.completed_at.is_some());
    }

    #[tokio::test]
    async fn snapshot_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = InMemoryScalingStore::with_snapshot_file(&path).unwrap();
            store.create_policy(sample_policy("cdc-worker")).await.unwrap();
        }
        let reloaded = InMemoryScalingStore::with_snapshot_file(&path).unwrap();
        assert!(reloaded.get_policy_by_name("cdc-worker").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn zero_scale_by_rule_is_rejected() {
        let store = InMemoryScalingStore::new();
        let policy = store.create_policy(sample_policy("cdc-worker")).await.unwrap();
        let err = store
            .add_rule(Rule {
                id: RuleId::new(),
                policy_id: policy.id,
                direction: RuleDirection::ScaleUp,
                metric: "lag".to_string(),
                operator: autoscale_core::Operator::GreaterThan,
                threshold: 100.0,
                duration_seconds: 60,
                scale_by: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AutoscaleError::Validation(_)));
    }

    #[tokio::test]
    async fn mismatched_sign_rule_is_rejected() {
        let store = InMemoryScalingStore::new();
        let policy = store.create_policy(sample_policy("cdc-worker-2")).await.unwrap();
        let err = store
            .add_rule(Rule {
                id: RuleId::new(),
                policy_id: policy.id,
                direction: RuleDirection::ScaleDown,
                metric: "lag".to_string(),
                operator: autoscale_core::Operator::LessThan,
                threshold: 10.0,
                duration_seconds: 60,
                scale_by: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AutoscaleError::Validation(_)));
    }
}
