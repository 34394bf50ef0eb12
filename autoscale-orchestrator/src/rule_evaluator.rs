//! Turns (policy, current replicas, metric values, pending-condition state)
//! into a `Decision`. Pure aside from the metric lookup the caller supplies.

use autoscale_core::utils::Clock;
use autoscale_core::{Operator, PolicyId, RuleId};
use autoscale_store::{Policy, PolicyState, Rule, RuleDirection, Schedule};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// What kind of event produced a `Decision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
}

/// Outcome of one evaluation of a policy (spec §4.5).
#[derive(Debug, Clone)]
pub struct Decision {
    pub policy_id: PolicyId,
    pub should_execute: bool,
    pub action: Option<ScalingAction>,
    pub current: i64,
    pub desired: i64,
    pub triggered_by: String,
    pub reason: String,
    pub cooldown_remaining: Option<chrono::Duration>,
}

impl Decision {
    fn no_op(policy_id: PolicyId, current: i64, reason: impl Into<String>) -> Self {
        Self {
            policy_id,
            should_execute: false,
            action: None,
            current,
            desired: current,
            triggered_by: String::new(),
            reason: reason.into(),
            cooldown_remaining: None,
        }
    }
}

/// Resolves one rule's metric query to a value; a missing series is `None`
/// (spec §4.1/§4.5: missing and NaN are both treated as condition-false).
pub trait MetricResolver {
    fn resolve(&self, metric: &str) -> Option<f64>;
}

/// A rule whose condition held continuously for `duration_seconds`.
struct FiredRule<'a> {
    rule: &'a Rule,
}

/// Evaluates one policy tick. `now` comes from `clock` so tests can control
/// time; `state.pending_conditions` is mutated in place to reflect newly
/// set/cleared timestamps, mirroring the store write the caller must persist.
pub fn evaluate(
    policy: &Policy,
    rules: &[Rule],
    schedules: &mut [Schedule],
    state: &mut PolicyState,
    current_replicas: i64,
    metrics: &dyn MetricResolver,
    clock: &Arc<dyn Clock>,
    pool_cost_cap: Option<(i64, f64)>,
) -> Decision {
    let now = clock.now();

    if let Some(last_scale) = state.last_scale_time {
        let elapsed = now - last_scale;
        let cooldown = chrono::Duration::seconds(policy.cooldown_seconds);
        if elapsed < cooldown {
            let mut decision = Decision::no_op(policy.id, current_replicas, "in cooldown");
            decision.cooldown_remaining = Some(cooldown - elapsed);
            return decision;
        }
    }

    if let Some(index) = find_firing_schedule(schedules, now) {
        let schedule = &mut schedules[index];
        // Edge-triggered: consume this cron boundary now so the next tick
        // doesn't see the same window as still-firing, whether or not it
        // ends up changing replicas (spec §9 open question).
        schedule.last_fire_time = Some(now);
        let desired = clamp_replicas(policy, schedule.desired_replicas);
        if desired != current_replicas {
            return Decision {
                policy_id: policy.id,
                should_execute: true,
                action: Some(if desired > current_replicas {
                    ScalingAction::ScaleUp
                } else {
                    ScalingAction::ScaleDown
                }),
                current: current_replicas,
                desired,
                triggered_by: format!("schedule:{}", schedule.id),
                reason: format!("schedule {} fired", schedule.cron_expression),
                cooldown_remaining: None,
            };
        }
    }

    let mut fired_up: Vec<&Rule> = Vec::new();
    let mut fired_down: Vec<&Rule> = Vec::new();

    for rule in rules {
        let value = metrics.resolve(&rule.metric).filter(|v| !v.is_nan());
        let condition_true = value
            .map(|v| rule.operator.evaluate(v, rule.threshold))
            .unwrap_or(false);

        if condition_true {
            let since = *state.pending_conditions.entry(rule.id).or_insert(now);
            let held_for = now - since;
            if held_for >= chrono::Duration::seconds(rule.duration_seconds) {
                match rule.direction {
                    RuleDirection::ScaleUp => fired_up.push(rule),
                    RuleDirection::ScaleDown => fired_down.push(rule),
                }
            }
        } else {
            state.pending_conditions.remove(&rule.id);
        }
    }

    let winner = pick_winner(&fired_up, &fired_down);

    let Some(FiredRule { rule }) = winner else {
        return Decision::no_op(policy.id, current_replicas, "no rule fired");
    };

    let mut desired = clamp_replicas(policy, current_replicas + rule.scale_by);
    let mut reason = format!("rule {} fired (scale_by={})", rule.id, rule.scale_by);

    if let Some((max_affordable, hourly_cap)) = pool_cost_cap {
        if desired > current_replicas && desired > max_affordable {
            desired = max_affordable.max(current_replicas);
            reason = format!("{reason}; capped at {max_affordable} by max_hourly_cost={hourly_cap}");
        }
    }

    if desired == current_replicas {
        return Decision::no_op(policy.id, current_replicas, "desired equals current after clamping");
    }

    Decision {
        policy_id: policy.id,
        should_execute: true,
        action: Some(if desired > current_replicas {
            ScalingAction::ScaleUp
        } else {
            ScalingAction::ScaleDown
        }),
        current: current_replicas,
        desired,
        triggered_by: format!("rule:{}", rule.id),
        reason,
        cooldown_remaining: None,
    }
}

fn clamp_replicas(policy: &Policy, value: i64) -> i64 {
    let floor = if policy.scale_to_zero {
        policy.min_replicas
    } else {
        policy.min_replicas.max(1)
    };
    value.clamp(floor, policy.max_replicas)
}

/// Among fired scale-up rules pick the largest `scale_by`; among
/// scale-down rules the most negative. Scale-up wins ties with scale-down.
/// Ties within a direction break by rule id, lexicographically, stably.
fn pick_winner<'a>(up: &[&'a Rule], down: &[&'a Rule]) -> Option<FiredRule<'a>> {
    let best_up = up.iter().max_by(|a, b| {
        a.scale_by
            .cmp(&b.scale_by)
            .then_with(|| b.id.to_string().cmp(&a.id.to_string()))
    });
    if let Some(rule) = best_up {
        return Some(FiredRule { rule });
    }
    down.iter()
        .min_by(|a, b| {
            a.scale_by
                .cmp(&b.scale_by)
                .then_with(|| b.id.to_string().cmp(&a.id.to_string()))
        })
        .map(|rule| FiredRule { rule })
}

/// A schedule "fires" once per cron boundary it crosses, tracked via
/// `last_fire_time` so re-evaluating within the same minute is a no-op.
/// Returns the index into `schedules` rather than a reference so the caller
/// can take a mutable borrow to stamp `last_fire_time`.
fn find_firing_schedule(schedules: &[Schedule], now: DateTime<Utc>) -> Option<usize> {
    use std::str::FromStr;

    schedules.iter().position(|schedule| {
        if !schedule.enabled {
            return false;
        }
        let Ok(tz): Result<chrono_tz::Tz, _> = schedule.timezone.parse() else {
            return false;
        };
        let Ok(cron_schedule) = cron::Schedule::from_str(&schedule.cron_expression) else {
            return false;
        };
        let local_now = now.with_timezone(&tz);
        let window_start = schedule.last_fire_time.unwrap_or(now - chrono::Duration::minutes(1));
        cron_schedule
            .after(&window_start.with_timezone(&tz))
            .next()
            .map(|next_fire| next_fire <= local_now)
            .unwrap_or(false)
    })
}

pub fn pending_condition_for(state: &PolicyState, rule_id: RuleId) -> Option<DateTime<Utc>> {
    state.pending_conditions.get(&rule_id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscale_core::utils::TestClock;
    use autoscale_core::TargetType;
    use chrono::Utc;
    use std::collections::HashMap;

    struct FixedMetrics(HashMap<String, f64>);
    impl MetricResolver for FixedMetrics {
        fn resolve(&self, metric: &str) -> Option<f64> {
            self.0.get(metric).copied()
        }
    }

    fn policy() -> Policy {
        Policy {
            id: PolicyId::new(),
            name: "cdc-worker".to_string(),
            target_type: TargetType::WorkloadKindA,
            target_id: None,
            min_replicas: 1,
            max_replicas: 5,
            cooldown_seconds: 60,
            max_hourly_cost: None,
            scale_to_zero: false,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rule(direction: RuleDirection, scale_by: i64, duration_seconds: i64) -> Rule {
        Rule {
            id: RuleId::new(),
            policy_id: PolicyId::new(),
            direction,
            metric: "cpu".to_string(),
            operator: Operator::GreaterThan,
            threshold: 0.8,
            duration_seconds,
            scale_by,
        }
    }

    #[test]
    fn cooldown_blocks_execution() {
        let clock = TestClock::new(Utc::now());
        let p = policy();
        let mut state = PolicyState::new(p.id, 2);
        state.last_scale_time = Some(clock.now() - chrono::Duration::seconds(10));
        let metrics = FixedMetrics(HashMap::from([("cpu".to_string(), 0.95)]));
        let clock_dyn: Arc<dyn Clock> = clock.clone();

        let decision = evaluate(&p, &[], &mut [], &mut state, 2, &metrics, &clock_dyn, None);
        assert!(!decision.should_execute);
        assert!(decision.cooldown_remaining.is_some());
    }

    #[test]
    fn rule_fires_after_duration_elapses() {
        let clock = TestClock::new(Utc::now());
        let p = policy();
        let mut state = PolicyState::new(p.id, 2);
        let r = rule(RuleDirection::ScaleUp, 1, 30);
        let metrics = FixedMetrics(HashMap::from([("cpu".to_string(), 0.95)]));
        let clock_dyn: Arc<dyn Clock> = clock.clone();

        let decision = evaluate(&p, &[r.clone()], &mut [], &mut state, 2, &metrics, &clock_dyn, None);
        assert!(!decision.should_execute, "condition just became true, not yet held long enough");
        assert!(state.pending_conditions.contains_key(&r.id));

        clock.advance(chrono::Duration::seconds(31));
        let decision = evaluate(&p, &[r.clone()], &mut [], &mut state, 2, &metrics, &clock_dyn, None);
        assert!(decision.should_execute);
        assert_eq!(decision.desired, 3);
    }

    #[test]
    fn scale_up_wins_over_simultaneous_scale_down() {
        let clock = TestClock::new(Utc::now());
        let p = policy();
        let mut state = PolicyState::new(p.id, 2);
        let up = rule(RuleDirection::ScaleUp, 3, 0);
        let down = rule(RuleDirection::ScaleDown, -1, 0);
        let metrics = FixedMetrics(HashMap::from([("cpu".to_string(), 0.95)]));
        let clock_dyn: Arc<dyn Clock> = clock.clone();

        let decision = evaluate(&p, &[up, down], &mut [], &mut state, 2, &metrics, &clock_dyn, None);
        assert!(decision.should_execute);
        assert_eq!(decision.desired, 5);
    }

    #[test]
    fn scale_to_zero_false_floors_at_one() {
        let clock = TestClock::new(Utc::now());
        let mut p = policy();
        p.scale_to_zero = false;
        p.min_replicas = 0;
        let mut state = PolicyState::new(p.id, 1);
        let down = rule(RuleDirection::ScaleDown, -5, 0);
        let metrics = FixedMetrics(HashMap::from([("cpu".to_string(), 0.95)]));
        let clock_dyn: Arc<dyn Clock> = clock.clone();

        let decision = evaluate(&p, &[down], &mut [], &mut state, 1, &metrics, &clock_dyn, None);
        assert!(!decision.should_execute, "current is already at the floor of 1");
    }

    #[test]
    fn missing_metric_does_not_fire() {
        let clock = TestClock::new(Utc::now());
        let p = policy();
        let mut state = PolicyState::new(p.id, 2);
        let r = rule(RuleDirection::ScaleUp, 1, 0);
        let metrics = FixedMetrics(HashMap::new());
        let clock_dyn: Arc<dyn Clock> = clock.clone();

        let decision = evaluate(&p, &[r], &mut [], &mut state, 2, &metrics, &clock_dyn, None);
        assert!(!decision.should_execute);
    }

    #[test]
    fn cost_cap_limits_scale_up() {
        let clock = TestClock::new(Utc::now());
        let p = policy();
        let mut state = PolicyState::new(p.id, 2);
        let r = rule(RuleDirection::ScaleUp, 3, 0);
        let metrics = FixedMetrics(HashMap::from([("cpu".to_string(), 0.95)]));
        let clock_dyn: Arc<dyn Clock> = clock.clone();

        let decision = evaluate(
            &p,
            &[r],
            &mut [],
            &mut state,
            2,
            &metrics,
            &clock_dyn,
            Some((3, 10.0)),
        );
        assert!(decision.should_execute);
        assert_eq!(decision.desired, 3, "capped below the rule's uncapped target of 5");
        assert!(decision.reason.contains("max_hourly_cost"));
    }

    #[test]
    fn schedule_fires_once_then_stamps_last_fire_time() {
        let clock = TestClock::new(Utc::now());
        let p = policy();
        let mut state = PolicyState::new(p.id, 2);
        let metrics = FixedMetrics(HashMap::new());
        let clock_dyn: Arc<dyn Clock> = clock.clone();

        let mut schedules = vec![Schedule {
            id: autoscale_core::ScheduleId::new(),
            policy_id: p.id,
            cron_expression: "* * * * * * *".to_string(),
            timezone: "UTC".to_string(),
            desired_replicas: 4,
            enabled: true,
            last_fire_time: None,
        }];

        let decision = evaluate(&p, &[], &mut schedules, &mut state, 2, &metrics, &clock_dyn, None);
        assert!(decision.should_execute);
        assert_eq!(decision.desired, 4);
        assert_eq!(decision.triggered_by, format!("schedule:{}", schedules[0].id));
        assert!(schedules[0].last_fire_time.is_some(), "firing must stamp last_fire_time");
    }
}
