//! Applies a desired replica count to a workload (C7) or a node pool (C8).
//! Both implement the same `Executor` capability so the scaling manager can
//! dispatch without knowing which kind of target it is (spec §9).

use async_trait::async_trait;
use autoscale_cluster::{ClusterPlane, DrainOptions, DrainOutcome, WorkloadKind};
use autoscale_core::utils::Clock;
use autoscale_core::{AutoscaleError, NodeId, NodePoolId, OperationId, Result};
use autoscale_providers::{ProviderRegistry, ServerOpts};
use autoscale_store::{
    Node, NodePool, NodeStatus, OperationStatus, ScalingAction, ScalingOperation, ScalingStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Uniform create/read/scale surface the scaling manager dispatches
/// through, keyed by `TargetType` (spec §4.7, §4.8, §9).
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;
    async fn get_current_replicas(&self, target: &str) -> Result<i64>;
    async fn scale(&self, target: &str, replicas: i64, dry_run: bool) -> Result<()>;

    /// Highest replica count affordable under `max_hourly_cost`, used by the
    /// rule evaluator's cost cap (spec §4.5 step 6, §4.8). Workload executors
    /// have no per-unit cost signal, so the default is "uncapped"; `NodeExecutor`
    /// overrides this with pool pricing.
    async fn max_affordable(&self, _target: &str, _max_hourly_cost: f64) -> Result<i64> {
        Ok(i64::MAX)
    }
}

/// C7: scales a cluster workload by delegating straight to the cluster
/// plane. Blocking until the plane acknowledges the new spec, not until
/// pods are ready (spec §4.7).
pub struct WorkloadExecutor {
    cluster: Arc<dyn ClusterPlane>,
    kind: WorkloadKind,
}

impl WorkloadExecutor {
    pub fn new(cluster: Arc<dyn ClusterPlane>, kind: WorkloadKind) -> Self {
        Self { cluster, kind }
    }
}

#[async_trait]
impl Executor for WorkloadExecutor {
    fn name(&self) -> &str {
        "workload"
    }

    async fn get_current_replicas(&self, target: &str) -> Result<i64> {
        if target.is_empty() {
            return Err(AutoscaleError::not_found("workload target_id is required"));
        }
        Ok(self.cluster.get_deployment_replicas(self.kind, target).await? as i64)
    }

    async fn scale(&self, target: &str, replicas: i64, dry_run: bool) -> Result<()> {
        if target.is_empty() {
            return Err(AutoscaleError::not_found("workload target_id is required"));
        }
        if replicas < 0 {
            return Err(AutoscaleError::Fatal("replicas must be >= 0".to_string()));
        }
        if dry_run {
            return Ok(());
        }
        self.cluster.scale_deployment(self.kind, target, replicas as u32).await
    }
}

/// Registry of per-pool mutexes, created lazily on first use and guarded by
/// its own lock (spec §4.8, §5). Readers copy the `Arc<Mutex<()>>` under a
/// read lock then operate on it unlocked, same pattern as the cluster
/// lock-registry idiom.
#[derive(Default)]
pub struct PoolLockRegistry {
    locks: std::sync::RwLock<HashMap<NodePoolId, Arc<Mutex<()>>>>,
}

impl PoolLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, pool_id: NodePoolId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().unwrap().get(&pool_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write().unwrap();
        Arc::clone(locks.entry(pool_id).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}

/// C8: the most intricate executor. Provisions or drains+deletes nodes in a
/// pool to reach a target count, serialized per pool (spec §4.8).
pub struct NodeExecutor {
    store: Arc<dyn ScalingStore>,
    cluster: Arc<dyn ClusterPlane>,
    providers: Arc<ProviderRegistry>,
    clock: Arc<dyn Clock>,
    pool_locks: Arc<PoolLockRegistry>,
    node_ready_timeout: std::time::Duration,
    drain_timeout: std::time::Duration,
    drain_grace: std::time::Duration,
    max_op_age: chrono::Duration,
}

impl NodeExecutor {
    pub fn new(
        store: Arc<dyn ScalingStore>,
        cluster: Arc<dyn ClusterPlane>,
        providers: Arc<ProviderRegistry>,
        clock: Arc<dyn Clock>,
        pool_locks: Arc<PoolLockRegistry>,
        node_ready_timeout: std::time::Duration,
        drain_timeout: std::time::Duration,
        drain_grace: std::time::Duration,
        max_op_age: chrono::Duration,
    ) -> Self {
        Self {
            store,
            cluster,
            providers,
            clock,
            pool_locks,
            node_ready_timeout,
            drain_timeout,
            drain_grace,
            max_op_age,
        }
    }

    async fn pool_by_name_or_id(&self, target: &str) -> Result<NodePool> {
        let pools = self.store.list_node_pools().await?;
        pools
            .into_iter()
            .find(|p| p.name == target || p.id.to_string() == target)
            .ok_or_else(|| AutoscaleError::not_found(format!("node pool not found: {target}")))
    }

    /// `estimate_pool_cost` helper for the rule evaluator's cost cap (spec
    /// §4.8). Unknown pricing returns 0 and a warning, never an error.
    pub async fn estimate_pool_cost(&self, pool: &NodePool, target_count: i64) -> f64 {
        match self
            .store
            .get_pricing(&pool.provider, &pool.instance_type, &pool.region)
            .await
        {
            Ok(Some(pricing)) => pricing.hourly_cost * target_count as f64,
            _ => {
                warn!(pool = %pool.name, "no cached pricing; cost estimate is 0");
                0.0
            }
        }
    }

    /// Recomputes `current_nodes` from the live node table under the pool
    /// lock (spec §4.8).
    pub async fn reconcile_pool_node_count(&self, pool_id: NodePoolId) -> Result<i64> {
        let lock = self.pool_locks.lock_for(pool_id);
        let _guard = lock.lock().await;
        let count = self.store.count_active_nodes(pool_id).await?;
        let mut pool = self.store.get_node_pool(pool_id).await?;
        pool.current_nodes = count;
        self.store.update_node_pool(pool).await?;
        Ok(count)
    }

    /// Marks any `in_progress` operation older than `max_op_age` as failed
    /// (spec §4.8 stale-op sweeper).
    pub async fn sweep_stale_operations(&self, pool_id: NodePoolId) -> Result<()> {
        let now = self.clock.now();
        for op in self.store.list_operations(pool_id).await? {
            if op.status == OperationStatus::InProgress && now - op.created_at > self.max_op_age {
                self.store
                    .update_operation_status(
                        op.id,
                        OperationStatus::Failed,
                        op.actual_count,
                        Some("operation timed out".to_string()),
                        vec![],
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn scale_up(&self, pool: &NodePool, target: i64) -> Result<()> {
        let provider = self.providers.get(&pool.provider)?;
        let op = self
            .store
            .create_operation(ScalingOperation {
                id: OperationId::new(),
                pool_id: pool.id,
                policy_id: None,
                action: ScalingAction::ScaleUp,
                previous_count: pool.current_nodes,
                target_count: target,
                actual_count: None,
                status: OperationStatus::InProgress,
                affected_node_ids: vec![],
                cost_change_estimate: self.estimate_pool_cost(pool, target - pool.current_nodes).await,
                dry_run: false,
                created_at: self.clock.now(),
                completed_at: None,
                error: None,
            })
            .await?;

        let to_create = target - pool.current_nodes;
        let mut created = Vec::new();
        for i in 0..to_create {
            let opts = ServerOpts {
                name: format!("{}-{}", pool.name, autoscale_core::utils::generate_short_id("n")),
                region: pool.region.clone(),
                instance_type: pool.instance_type.clone(),
                image: pool.image.clone(),
                ssh_key_ids: pool.ssh_key_id.clone().into_iter().collect(),
                user_data: pool.user_data_template.clone(),
                labels: pool.labels.clone(),
                network_id: pool.network_id.clone(),
                firewall_id: pool.firewall_id.clone(),
                is_spot: false,
            };
            match provider.create_server(&opts).await {
                Ok(server) => {
                    let node = self
                        .store
                        .create_node(Node {
                            id: NodeId::new(),
                            pool_id: pool.id,
                            provider_id: server.provider_id.clone(),
                            node_name: None,
                            status: NodeStatus::Joining,
                            public_ip: server.public_ip,
                            private_ip: server.private_ip,
                            hourly_cost: None,
                            is_spot: server.is_spot,
                            failure_reason: None,
                            created_at: self.clock.now(),
                            deleted_at: None,
                        })
                        .await?;
                    created.push(node.id);
                    self.watch_readiness(node.id);
                }
                Err(e) => {
                    error!(pool = %pool.name, attempt = i, "create_server failed: {e}");
                }
            }
        }

        let mut updated_pool = pool.clone();
        updated_pool.current_nodes = pool.current_nodes + created.len() as i64;
        self.store.update_node_pool(updated_pool).await?;

        let final_status = if created.len() as i64 == to_create {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };
        self.store
            .update_operation_status(op.id, final_status, Some(created.len() as i64), None, created.clone())
            .await?;
        Ok(())
    }

    /// Spawns a fire-and-forget readiness watcher; failures to reach ready
    /// within `node_ready_timeout` mark the node `failed` (spec §4.8).
    fn watch_readiness(&self, node_id: NodeId) {
        let store = Arc::clone(&self.store);
        let cluster = Arc::clone(&self.cluster);
        let timeout = self.node_ready_timeout;
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if tokio::time::Instant::now() >= deadline {
                    if let Ok(mut node) = store.get_node(node_id).await {
                        node.status = NodeStatus::Failed;
                        node.failure_reason = Some("timeout".to_string());
                        let _ = store.update_node(node).await;
                    }
                    return;
                }
                let Ok(mut node) = store.get_node(node_id).await else {
                    return;
                };
                let Ok(cluster_nodes) = cluster.list_nodes().await else {
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                };
                let matched = cluster_nodes.iter().find(|n| {
                    n.addresses.iter().any(|addr| {
                        node.public_ip.as_deref() == Some(addr.as_str())
                            || node.private_ip.as_deref() == Some(addr.as_str())
                    })
                });
                if let Some(cluster_node) = matched {
                    if cluster_node.is_ready() {
                        node.node_name = Some(cluster_node.name.clone());
                        node.status = NodeStatus::Ready;
                        let _ = store.update_node(node).await;
                        return;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        });
    }

    async fn scale_down(&self, pool: &NodePool, target: i64) -> Result<()> {
        let to_remove = pool.current_nodes - target;
        let op = self
            .store
            .create_operation(ScalingOperation {
                id: OperationId::new(),
                pool_id: pool.id,
                policy_id: None,
                action: ScalingAction::ScaleDown,
                previous_count: pool.current_nodes,
                target_count: target,
                actual_count: None,
                status: OperationStatus::InProgress,
                affected_node_ids: vec![],
                cost_change_estimate: -self.estimate_pool_cost(pool, to_remove).await,
                dry_run: false,
                created_at: self.clock.now(),
                completed_at: None,
                error: None,
            })
            .await?;

        let candidates = self.select_scale_down_targets(pool, to_remove as usize).await?;
        let provider = self.providers.get(&pool.provider)?;
        let mut deleted = Vec::new();

        for node in candidates {
            let mut node = node;
            node.status = NodeStatus::Draining;
            self.store.update_node(node.clone()).await?;

            if let Some(name) = &node.node_name {
                let _ = self.cluster.cordon(name).await;
                let drain_opts = DrainOptions {
                    timeout: self.drain_timeout,
                    grace_period: self.drain_grace,
                    ..Default::default()
                };
                match self.cluster.drain(name, &drain_opts).await {
                    Ok(DrainOutcome::Drained) => {}
                    Ok(DrainOutcome::TimedOut) => {
                        warn!(node = %name, "drain timed out; deletion proceeds anyway");
                    }
                    Err(e) => {
                        warn!(node = %name, "drain failed: {e}; deletion proceeds anyway");
                    }
                }
            }

            node.status = NodeStatus::Deleting;
            self.store.update_node(node.clone()).await?;

            match provider.delete_server(&node.provider_id).await {
                Ok(()) => {
                    if let Some(name) = &node.node_name {
                        let _ = self.cluster.delete_node(name).await;
                    }
                    self.store.soft_delete_node(node.id).await?;
                    deleted.push(node.id);
                }
                Err(e) => {
                    error!(node = %node.provider_id, "delete_server failed: {e}");
                    node.status = NodeStatus::Failed;
                    node.failure_reason = Some(e.to_string());
                    self.store.update_node(node).await?;
                }
            }
        }

        let mut updated_pool = pool.clone();
        updated_pool.current_nodes = self.store.count_active_nodes(pool.id).await?;
        self.store.update_node_pool(updated_pool).await?;

        let final_status = if deleted.len() == to_remove as usize {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };
        self.store
            .update_operation_status(op.id, final_status, Some(deleted.len() as i64), None, deleted.clone())
            .await?;
        Ok(())
    }

    /// Preferred selector: cluster plane ranking. Fallback: newest nodes
    /// first from the store (spec §4.8, decided open question).
    async fn select_scale_down_targets(&self, pool: &NodePool, count: usize) -> Result<Vec<Node>> {
        let active = self
            .store
            .list_nodes(pool.id, &autoscale_store::ListOptions { active_only: true })
            .await?;

        if let (Ok(cluster_nodes), Ok(utilization)) =
            (self.cluster.list_nodes().await, self.cluster.node_utilization().await)
        {
            let names = autoscale_cluster::select_scale_down_candidates(
                &cluster_nodes,
                &utilization,
                &pool.labels,
                count,
            );
            if !names.is_empty() {
                return Ok(active
                    .into_iter()
                    .filter(|n| n.node_name.as_deref().map(|name| names.contains(&name.to_string())).unwrap_or(false))
                    .collect());
            }
        }

        let mut by_age: Vec<Node> = active.into_iter().filter(|n| n.status == NodeStatus::Ready).collect();
        by_age.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        by_age.truncate(count);
        Ok(by_age)
    }
}

#[async_trait]
impl Executor for NodeExecutor {
    fn name(&self) -> &str {
        "node"
    }

    async fn get_current_replicas(&self, target: &str) -> Result<i64> {
        let pool = self.pool_by_name_or_id(target).await?;
        self.reconcile_pool_node_count(pool.id).await
    }

    async fn scale(&self, target: &str, replicas: i64, dry_run: bool) -> Result<()> {
        let pool = self.pool_by_name_or_id(target).await?;
        if dry_run {
            return Ok(());
        }
        let lock = self.pool_locks.lock_for(pool.id);
        let _guard = lock.lock().await;

        let current = self.store.count_active_nodes(pool.id).await?;
        if replicas > current {
            self.scale_up(&pool, replicas).await
        } else if replicas < current {
            self.scale_down(&pool, replicas).await
        } else {
            Ok(())
        }
    }

    /// `max_hourly_cost` enforcement for node pools (spec §4.5 step 6, §9 open
    /// question): floor(max_hourly_cost / per-node hourly cost). Unknown
    /// pricing means no cap can be computed, so this returns uncapped rather
    /// than silently blocking all scale-up.
    async fn max_affordable(&self, target: &str, max_hourly_cost: f64) -> Result<i64> {
        let pool = self.pool_by_name_or_id(target).await?;
        let per_node = self.estimate_pool_cost(&pool, 1).await;
        if per_node <= 0.0 {
            return Ok(i64::MAX);
        }
        Ok((max_hourly_cost / per_node).floor() as i64)
    }
}
