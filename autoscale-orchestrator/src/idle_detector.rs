//! Tracks activity per policy, scales to zero on idleness, wakes on demand,
//! and accumulates cost savings (spec §4.9).

use crate::executor::Executor;
use autoscale_core::utils::Clock;
use autoscale_core::{PolicyId, Result, TargetType};
use autoscale_store::{DailySavings, IdleState, ScalingStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How long a policy may sit idle before it is eligible for scale-to-zero.
/// Carried on the policy in a full system; kept as an explicit parameter
/// here so the detector stays independent of policy schema growth.
pub struct IdleWindowConfig {
    pub idle_window: chrono::Duration,
    pub idle_grace: chrono::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    Woke,
    AlreadyRunning,
    Failed,
}

/// Second periodic loop over the same store the scaling manager reads,
/// emitting wake events consumed by the executors (spec §4.9).
pub struct IdleDetector {
    store: Arc<dyn ScalingStore>,
    executors: HashMap<TargetType, Arc<dyn Executor>>,
    clock: Arc<dyn Clock>,
    policy_locks: Mutex<HashMap<PolicyId, Arc<Mutex<()>>>>,
}

impl IdleDetector {
    pub fn new(
        store: Arc<dyn ScalingStore>,
        executors: HashMap<TargetType, Arc<dyn Executor>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            executors,
            clock,
            policy_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, policy_id: PolicyId) -> Arc<Mutex<()>> {
        let mut locks = self.policy_locks.lock().await;
        Arc::clone(locks.entry(policy_id).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// Stamps `last_activity_at=now` and clears `idle_since` (spec §4.9).
    pub async fn record_activity(&self, policy_id: PolicyId) -> Result<()> {
        let now = self.clock.now();
        let mut idle_state = self
            .store
            .get_idle_state(policy_id)
            .await?
            .unwrap_or_else(|| IdleState::new(policy_id, now));
        idle_state.last_activity_at = now;
        idle_state.idle_since = None;
        self.store.upsert_idle_state(idle_state).await?;
        Ok(())
    }

    /// One pass over every policy's `IdleState`. Runs on `idle_check_interval`.
    pub async fn run_idle_tick(&self, windows: &HashMap<PolicyId, IdleWindowConfig>) -> Result<()> {
        let now = self.clock.now();
        for policy in self.store.list_policies().await? {
            if !policy.enabled || !policy.scale_to_zero {
                continue;
            }
            let Some(window) = windows.get(&policy.id) else {
                continue;
            };
            let mut idle_state = self
                .store
                .get_idle_state(policy.id)
                .await?
                .unwrap_or_else(|| IdleState::new(policy.id, now));

            let idle_for = now - idle_state.last_activity_at;
            if idle_for >= window.idle_window {
                if idle_state.idle_since.is_none() {
                    idle_state.idle_since = Some(now);
                }
                let grace_elapsed = idle_state
                    .idle_since
                    .map(|since| now - since >= window.idle_grace)
                    .unwrap_or(false);

                if grace_elapsed && !idle_state.is_scaled_to_zero {
                    if let Some(executor) = self.executors.get(&policy.target_type) {
                        let target = policy.target_id.clone().unwrap_or_default();
                        match executor.scale(&target, 0, false).await {
                            Ok(()) => {
                                idle_state.is_scaled_to_zero = true;
                                idle_state.scaled_to_zero_at = Some(now);
                                info!(policy = %policy.name, "scaled to zero after idle window");
                            }
                            Err(e) => {
                                warn!(policy = %policy.name, "scale-to-zero failed: {e}");
                            }
                        }
                    }
                }
            }

            self.store.upsert_idle_state(idle_state.clone()).await?;
            let hourly_cost = self.policy_hourly_cost(&policy).await;
            self.accumulate_savings(&policy.id, &idle_state, now, hourly_cost).await.ok();
        }
        Ok(())
    }

    /// Hourly cost avoided by sitting at zero instead of `min_replicas`
    /// (spec §4.9 "seconds × pool.hourly_cost / 3600 cents"). Only
    /// node-pool-targeted policies have a cost signal; workload policies
    /// share nodes with other workloads and have no isolated per-replica
    /// cost, so they accrue idle time but no savings.
    async fn policy_hourly_cost(&self, policy: &autoscale_store::Policy) -> f64 {
        if policy.target_type != TargetType::Nodes {
            return 0.0;
        }
        let Some(target) = &policy.target_id else {
            return 0.0;
        };
        let Ok(pools) = self.store.list_node_pools().await else {
            return 0.0;
        };
        let Some(pool) = pools.into_iter().find(|p| &p.name == target || p.id.to_string() == *target) else {
            return 0.0;
        };
        let per_node = match self.store.get_pricing(&pool.provider, &pool.instance_type, &pool.region).await {
            Ok(Some(pricing)) => pricing.hourly_cost,
            _ => 0.0,
        };
        per_node * policy.min_replicas.max(1) as f64
    }

    async fn accumulate_savings(
        &self,
        policy_id: &PolicyId,
        idle_state: &IdleState,
        now: chrono::DateTime<chrono::Utc>,
        hourly_cost: f64,
    ) -> Result<DailySavings> {
        let elapsed = chrono::Duration::seconds(60);
        let savings_cents = (elapsed.num_seconds() as f64 * hourly_cost / 3600.0 * 100.0) as i64;
        self.store
            .accumulate_daily_savings(DailySavings {
                policy_id: *policy_id,
                date: now.date_naive(),
                idle_seconds: elapsed.num_seconds(),
                scaled_to_zero_seconds: if idle_state.is_scaled_to_zero {
                    elapsed.num_seconds()
                } else {
                    0
                },
                savings_cents: if idle_state.is_scaled_to_zero { savings_cents } else { 0 },
            })
            .await
    }

    /// Scales back to `min_replicas` (or 1). Idempotent: waking an
    /// already-running policy returns `AlreadyRunning` with no extra scale
    /// call (spec §4.9).
    pub async fn wake(&self, policy_id: PolicyId, reason: &str) -> Result<WakeResult> {
        let lock = self.lock_for(policy_id).await;
        let _guard = lock.lock().await;

        let policy = self.store.get_policy(policy_id).await?;
        let mut idle_state = self
            .store
            .get_idle_state(policy_id)
            .await?
            .unwrap_or_else(|| IdleState::new(policy_id, self.clock.now()));

        if !idle_state.is_scaled_to_zero {
            return Ok(WakeResult::AlreadyRunning);
        }

        let Some(executor) = self.executors.get(&policy.target_type) else {
            return Ok(WakeResult::Failed);
        };
        let target = policy.target_id.clone().unwrap_or_default();
        let wake_replicas = policy.min_replicas.max(1);

        match executor.scale(&target, wake_replicas, false).await {
            Ok(()) => {
                idle_state.is_scaled_to_zero = false;
                idle_state.scaled_to_zero_at = None;
                idle_state.idle_since = None;
                idle_state.last_activity_at = self.clock.now();
                idle_state.last_wake_at = Some(self.clock.now());
                idle_state.wake_reason = Some(reason.to_string());
                self.store.upsert_idle_state(idle_state).await?;
                info!(policy = %policy.name, reason, "woke policy");
                Ok(WakeResult::Woke)
            }
            Err(e) => {
                warn!(policy = %policy.name, "wake failed: {e}");
                Ok(WakeResult::Failed)
            }
        }
    }

    /// Fans out one `wake` per policy id; never short-circuits on error
    /// (spec §4.9).
    pub async fn wake_all(&self, ids: &[PolicyId], reason: &str) -> Vec<(PolicyId, WakeResult)> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.wake(*id, reason).await.unwrap_or(WakeResult::Failed);
            results.push((*id, outcome));
        }
        results
    }

    /// Sums the daily savings rows for `policy_id` that fall within
    /// `[start, end]` inclusive (spec §4.9).
    pub async fn get_cost_savings(
        &self,
        policy_id: PolicyId,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> Result<i64> {
        let rows = self.store.list_daily_savings(policy_id).await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.date >= start && row.date <= end)
            .map(|row| row.savings_cents)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autoscale_core::utils::TestClock;
    use autoscale_core::TargetType;
    use autoscale_store::{InMemoryScalingStore, Policy};
    use chrono::Utc;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FakeExecutor {
        current: AtomicI64,
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        fn name(&self) -> &str {
            "fake"
        }
        async fn get_current_replicas(&self, _target: &str) -> Result<i64> {
            Ok(self.current.load(Ordering::SeqCst))
        }
        async fn scale(&self, _target: &str, replicas: i64, _dry_run: bool) -> Result<()> {
            self.current.store(replicas, Ordering::SeqCst);
            Ok(())
        }
    }

    fn policy() -> Policy {
        Policy {
            id: PolicyId::new(),
            name: "cdc-worker".to_string(),
            target_type: TargetType::WorkloadKindA,
            target_id: Some("wk-1".to_string()),
            min_replicas: 1,
            max_replicas: 5,
            cooldown_seconds: 0,
            max_hourly_cost: None,
            scale_to_zero: true,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn build_detector(executor: Arc<FakeExecutor>) -> (IdleDetector, Arc<dyn ScalingStore>, Arc<TestClock>) {
        let store: Arc<dyn ScalingStore> = Arc::new(InMemoryScalingStore::new());
        let clock = TestClock::new(Utc::now());
        let mut executors: HashMap<TargetType, Arc<dyn Executor>> = HashMap::new();
        executors.insert(TargetType::WorkloadKindA, executor);
        let detector = IdleDetector::new(Arc::clone(&store), executors, clock.clone());
        (detector, store, clock)
    }

    #[tokio::test]
    async fn idle_past_window_and_grace_scales_to_zero() {
        let executor = Arc::new(FakeExecutor { current: AtomicI64::new(2) });
        let (detector, store, clock) = build_detector(Arc::clone(&executor)).await;
        let p = store.create_policy(policy()).await.unwrap();

        let mut windows = HashMap::new();
        windows.insert(
            p.id,
            IdleWindowConfig {
                idle_window: chrono::Duration::minutes(5),
                idle_grace: chrono::Duration::zero(),
            },
        );

        clock.advance(chrono::Duration::minutes(6));
        detector.run_idle_tick(&windows).await.unwrap();

        let idle_state = store.get_idle_state(p.id).await.unwrap().unwrap();
        assert!(idle_state.is_scaled_to_zero);
        assert_eq!(executor.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn waking_a_running_policy_is_a_no_op() {
        let executor = Arc::new(FakeExecutor { current: AtomicI64::new(2) });
        let (detector, store, _clock) = build_detector(Arc::clone(&executor)).await;
        let p = store.create_policy(policy()).await.unwrap();

        let result = detector.wake(p.id, "manual").await.unwrap();
        assert_eq!(result, WakeResult::AlreadyRunning);
        assert_eq!(executor.current.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn wake_restores_min_replicas_and_clears_flags() {
        let executor = Arc::new(FakeExecutor { current: AtomicI64::new(0) });
        let (detector, store, _clock) = build_detector(Arc::clone(&executor)).await;
        let p = store.create_policy(policy()).await.unwrap();
        let mut idle_state = IdleState::new(p.id, Utc::now());
        idle_state.is_scaled_to_zero = true;
        store.upsert_idle_state(idle_state).await.unwrap();

        let result = detector.wake(p.id, "manual").await.unwrap();
        assert_eq!(result, WakeResult::Woke);
        assert_eq!(executor.current.load(Ordering::SeqCst), 1);

        let idle_state = store.get_idle_state(p.id).await.unwrap().unwrap();
        assert!(!idle_state.is_scaled_to_zero);
        assert_eq!(idle_state.wake_reason.as_deref(), Some("manual"));
    }

    #[tokio::test]
    async fn cost_savings_sums_rows_in_range() {
        let executor = Arc::new(FakeExecutor { current: AtomicI64::new(0) });
        let (detector, store, _clock) = build_detector(Arc::clone(&executor)).await;
        let p = store.create_policy(policy()).await.unwrap();

        let today = Utc::now().date_naive();
        store
            .accumulate_daily_savings(DailySavings {
                policy_id: p.id,
                date: today,
                idle_seconds: 60,
                scaled_to_zero_seconds: 60,
                savings_cents: 42,
            })
            .await
            .unwrap();
        store
            .accumulate_daily_savings(DailySavings {
                policy_id: p.id,
                date: today - chrono::Duration::days(10),
                idle_seconds: 60,
                scaled_to_zero_seconds: 60,
                savings_cents: 1000,
            })
            .await
            .unwrap();

        let total = detector.get_cost_savings(p.id, today, today).await.unwrap();
        assert_eq!(total, 42, "out-of-range row must not be summed");
    }

    #[tokio::test]
    async fn wake_all_never_short_circuits() {
        let executor = Arc::new(FakeExecutor { current: AtomicI64::new(0) });
        let (detector, store, _clock) = build_detector(Arc::clone(&executor)).await;
        let p1 = store.create_policy(policy()).await.unwrap();
        let mut other = policy();
        other.name = "cdc-worker-2".to_string();
        let p2 = store.create_policy(other).await.unwrap();

        let results = detector.wake_all(&[p1.id, p2.id], "manual").await;
        assert_eq!(results.len(), 2);
    }
}
