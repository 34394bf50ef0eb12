//! The periodic evaluation loop that drives the whole control plane
//! (spec §4.6).

use crate::executor::Executor;
use crate::rule_evaluator::{self, Decision, MetricResolver};
use autoscale_core::utils::Clock;
use autoscale_core::{AutoscaleError, Result, TargetType};
use autoscale_metrics::MetricsGateway;
use autoscale_store::{HistoryEntry, PolicyState, ScalingStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// A pre-resolved snapshot of metric values for one tick, keyed by query
/// string, so the pure evaluator never performs I/O.
pub struct ResolvedMetrics(pub HashMap<String, f64>);

impl MetricResolver for ResolvedMetrics {
    fn resolve(&self, metric: &str) -> Option<f64> {
        self.0.get(metric).copied()
    }
}

/// Periodic control loop that orchestrates evaluation and dispatches
/// execution (spec §4.6). `start`/`stop` are idempotent; `stop` blocks until
/// the in-flight tick returns.
pub struct ScalingManager {
    store: Arc<dyn ScalingStore>,
    metrics: Arc<MetricsGateway>,
    executors: HashMap<TargetType, Arc<dyn Executor>>,
    clock: Arc<dyn Clock>,
    evaluation_interval: std::time::Duration,
    cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl ScalingManager {
    pub fn new(
        store: Arc<dyn ScalingStore>,
        metrics: Arc<MetricsGateway>,
        executors: HashMap<TargetType, Arc<dyn Executor>>,
        clock: Arc<dyn Clock>,
        evaluation_interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            executors,
            clock,
            evaluation_interval,
            cancel: Mutex::new(None),
        }
    }

    /// Starts the tick loop as a background task. Idempotent: calling start
    /// twice while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut guard = self.cancel.lock().await;
        if guard.is_some() {
            return;
        }
        let (tx, mut rx) = watch::channel(false);
        *guard = Some(tx);
        drop(guard);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.evaluation_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        manager.run_tick().await;
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Signals the loop to stop and blocks until it acknowledges.
    pub async fn stop(&self) {
        let mut guard = self.cancel.lock().await;
        if let Some(tx) = guard.take() {
            let _ = tx.send(true);
        }
    }

    async fn run_tick(&self) {
        let policies = match self.store.list_policies().await {
            Ok(p) => p,
            Err(e) => {
                error!("failed to list policies for tick: {e}");
                return;
            }
        };

        for policy in policies.into_iter().filter(|p| p.enabled) {
            if let Err(e) = self.tick_policy(&policy.id, false).await {
                error!(policy_id = %policy.id, "evaluation failed: {e}");
            }
        }
    }

    /// Runs the evaluation pipeline once for a single policy by name.
    /// In `dry_run`, records history with `dry_run=true` and skips the
    /// executor (spec §4.6).
    pub async fn evaluate_now(&self, policy_name: &str, dry_run: bool) -> Result<Decision> {
        let policy = self
            .store
            .get_policy_by_name(policy_name)
            .await?
            .ok_or_else(|| AutoscaleError::not_found(format!("policy not found: {policy_name}")))?;
        self.tick_policy(&policy.id, dry_run).await
    }

    async fn tick_policy(
        &self,
        policy_id: &autoscale_core::PolicyId,
        dry_run: bool,
    ) -> Result<Decision> {
        let policy = self.store.get_policy(*policy_id).await?;
        let rules = self.store.list_rules(policy.id).await?;
        let mut schedules = self.store.list_schedules(policy.id).await?;
        let previous_fire_times: Vec<Option<chrono::DateTime<chrono::Utc>>> =
            schedules.iter().map(|s| s.last_fire_time).collect();
        let mut state = self
            .store
            .get_state(policy.id)
            .await?
            .unwrap_or_else(|| PolicyState::new(policy.id, policy.min_replicas));

        let executor = self
            .executors
            .get(&policy.target_type)
            .cloned()
            .ok_or_else(|| AutoscaleError::Fatal(format!("no executor for {:?}", policy.target_type)))?;

        let target = policy.target_id.clone().unwrap_or_default();
        let current_replicas = executor
            .get_current_replicas(&target)
            .await
            .unwrap_or(state.current_replicas);

        let mut values = HashMap::new();
        for rule in &rules {
            if let Ok(value) = self.metrics.get_scalar_value(&rule.metric).await {
                values.insert(rule.metric.clone(), value);
            }
        }
        let resolver = ResolvedMetrics(values);

        let pool_cost_cap = match policy.max_hourly_cost {
            Some(cap) => match executor.max_affordable(&target, cap).await {
                Ok(max_affordable) => Some((max_affordable, cap)),
                Err(e) => {
                    warn!(policy = %policy.name, "cost cap lookup failed, ignoring cap: {e}");
                    None
                }
            },
            None => None,
        };

        let decision = rule_evaluator::evaluate(
            &policy,
            &rules,
            &mut schedules,
            &mut state,
            current_replicas,
            &resolver,
            &self.clock,
            pool_cost_cap,
        );

        // Dry runs are a preview: skip the executor entirely and leave
        // `PolicyState` untouched, including a freshly materialized default
        // row for a policy that has never ticked before (spec §4.6).
        if !dry_run {
            self.store.upsert_state(state.clone()).await.ok();
        }
        for (schedule, previous) in schedules.into_iter().zip(previous_fire_times) {
            if schedule.last_fire_time != previous {
                if let Err(e) = self.store.update_schedule(schedule).await {
                    warn!("failed to persist schedule last_fire_time (best-effort): {e}");
                }
            }
        }

        if !decision.should_execute {
            return Ok(decision);
        }

        if dry_run {
            self.record_history(&policy, &decision, true).await;
            return Ok(decision);
        }

        match executor.scale(&target, decision.desired, false).await {
            Ok(()) => {
                state.current_replicas = decision.desired;
                state.last_scale_time = Some(self.clock.now());
                state.last_scale_action = Some(decision.triggered_by.clone());
                for rule in &rules {
                    if rule_evaluator::pending_condition_for(&state, rule.id).is_some()
                        && decision.triggered_by == format!("rule:{}", rule.id)
                    {
                        state.pending_conditions.remove(&rule.id);
                    }
                }
                self.store.upsert_state(state).await.ok();
                self.record_history(&policy, &decision, false).await;
                info!(
                    policy = %policy.name,
                    from = decision.current,
                    to = decision.desired,
                    "scaling executed"
                );
            }
            Err(e) => {
                warn!(policy = %policy.name, "executor failed: {e}");
                return Err(e);
            }
        }

        Ok(decision)
    }

    async fn record_history(&self, policy: &autoscale_store::Policy, decision: &Decision, dry_run: bool) {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            policy_name: policy.name.clone(),
            action: decision
                .action
                .map(|a| format!("{a:?}"))
                .unwrap_or_else(|| "none".to_string()),
            target_type: policy.target_type,
            target_id: policy.target_id.clone(),
            previous_replicas: decision.current,
            new_replicas: decision.desired,
            reason: decision.reason.clone(),
            triggered_by: decision.triggered_by.clone(),
            dry_run,
            executed_at: self.clock.now(),
        };
        if let Err(e) = self.store.append_history(entry).await {
            warn!("failed to record history (best-effort): {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::WorkloadExecutor;
    use autoscale_cluster::{ClusterPlane, MockClusterPlane, WorkloadKind};
    use autoscale_core::utils::TestClock;
    use autoscale_store::{InMemoryScalingStore, Policy, Schedule};
    use chrono::Utc;
    use std::time::Duration;

    fn policy(target_id: &str) -> Policy {
        Policy {
            id: autoscale_core::PolicyId::new(),
            name: "cdc-worker".to_string(),
            target_type: TargetType::WorkloadKindA,
            target_id: Some(target_id.to_string()),
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

    fn always_firing_schedule(policy_id: autoscale_core::PolicyId, desired_replicas: i64) -> Schedule {
        Schedule {
            id: autoscale_core::ScheduleId::new(),
            policy_id,
            cron_expression: "* * * * * * *".to_string(),
            timezone: "UTC".to_string(),
            desired_replicas,
            enabled: true,
            last_fire_time: None,
        }
    }

    fn manager(store: Arc<dyn ScalingStore>, cluster: Arc<MockClusterPlane>) -> ScalingManager {
        let mut executors: HashMap<TargetType, Arc<dyn Executor>> = HashMap::new();
        let cluster_plane: Arc<dyn ClusterPlane> = cluster;
        executors.insert(
            TargetType::WorkloadKindA,
            Arc::new(WorkloadExecutor::new(cluster_plane, WorkloadKind::Deployment)),
        );
        let metrics = Arc::new(MetricsGateway::new("http://127.0.0.1:1", Duration::from_millis(50)));
        let clock: Arc<dyn Clock> = TestClock::new(Utc::now());
        ScalingManager::new(store, metrics, executors, clock, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn evaluate_now_fails_for_unknown_policy() {
        let store: Arc<dyn ScalingStore> = Arc::new(InMemoryScalingStore::new());
        let cluster = Arc::new(MockClusterPlane::new());
        let mgr = manager(store, cluster);
        assert!(mgr.evaluate_now("does-not-exist", false).await.is_err());
    }

    #[tokio::test]
    async fn schedule_driven_tick_scales_workload_and_records_history() {
        let store: Arc<dyn ScalingStore> = Arc::new(InMemoryScalingStore::new());
        let cluster = Arc::new(MockClusterPlane::new());
        cluster.set_replicas("Deployment/cdc-worker-1", 2);

        let p = store.create_policy(policy("cdc-worker-1")).await.unwrap();
        store.add_schedule(always_firing_schedule(p.id, 6)).await.unwrap();

        let mgr = manager(Arc::clone(&store), Arc::clone(&cluster));
        let decision = mgr.evaluate_now(&p.name, false).await.unwrap();

        assert!(decision.should_execute);
        assert_eq!(decision.desired, 6);
        assert_eq!(
            cluster.get_deployment_replicas(WorkloadKind::Deployment, "cdc-worker-1").await.unwrap(),
            6
        );

        let state = store.get_state(p.id).await.unwrap().unwrap();
        assert_eq!(state.current_replicas, 6);
        assert!(state.last_scale_time.is_some());

        let history = store.list_history(p.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].dry_run);
    }

    #[tokio::test]
    async fn dry_run_records_history_without_scaling_or_state_change() {
        let store: Arc<dyn ScalingStore> = Arc::new(InMemoryScalingStore::new());
        let cluster = Arc::new(MockClusterPlane::new());
        cluster.set_replicas("Deployment/cdc-worker-1", 2);

        let p = store.create_policy(policy("cdc-worker-1")).await.unwrap();
        store.add_schedule(always_firing_schedule(p.id, 6)).await.unwrap();

        let mgr = manager(Arc::clone(&store), Arc::clone(&cluster));
        let decision = mgr.evaluate_now(&p.name, true).await.unwrap();

        assert!(decision.should_execute);
        assert_eq!(
            cluster.get_deployment_replicas(WorkloadKind::Deployment, "cdc-worker-1").await.unwrap(),
            2,
            "dry run must not call the executor"
        );
        assert!(store.get_state(p.id).await.unwrap().is_none());

        let history = store.list_history(p.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].dry_run);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_clears_it() {
        let store: Arc<dyn ScalingStore> = Arc::new(InMemoryScalingStore::new());
        let cluster = Arc::new(MockClusterPlane::new());
        let mgr = Arc::new(manager(store, cluster));

        mgr.start().await;
        mgr.start().await;
        assert!(mgr.cancel.lock().await.is_some());

        mgr.stop().await;
        assert!(mgr.cancel.lock().await.is_none());
    }
}
