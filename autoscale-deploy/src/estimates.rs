//! Per-provider step time estimates, used to compute `estimated_remaining_ms`
//! (spec §4.10: "time estimates per provider are a table of milliseconds per
//! step; total estimate is their sum; remaining is sum of pending plus
//! (estimate − elapsed) for in-progress").

use crate::types::{StepId, StepRecord, StepStatus};
use std::collections::HashMap;

/// Returns the step→milliseconds table for `provider`, falling back to a
/// generic table for an unrecognized provider id so estimates degrade
/// gracefully instead of failing the deployment.
pub fn step_estimates_ms(provider: &str) -> HashMap<StepId, u64> {
    let base: &[(StepId, u64)] = match provider {
        "aws" => &[
            (StepId::Auth, 5_000),
            (StepId::Network, 45_000),
            (StepId::Compute, 120_000),
            (StepId::K8s, 180_000),
            (StepId::Storage, 30_000),
            (StepId::Catalog, 20_000),
            (StepId::App, 60_000),
            (StepId::Health, 30_000),
            (StepId::Ssl, 40_000),
            (StepId::Ready, 2_000),
        ],
        "hetzner" => &[
            (StepId::Auth, 3_000),
            (StepId::Network, 20_000),
            (StepId::Compute, 60_000),
            (StepId::K8s, 150_000),
            (StepId::Storage, 15_000),
            (StepId::Catalog, 20_000),
            (StepId::App, 50_000),
            (StepId::Health, 25_000),
            (StepId::Ssl, 35_000),
            (StepId::Ready, 2_000),
        ],
        "gcp" => &[
            (StepId::Auth, 6_000),
            (StepId::Network, 40_000),
            (StepId::Compute, 100_000),
            (StepId::K8s, 200_000),
            (StepId::Storage, 25_000),
            (StepId::Catalog, 20_000),
            (StepId::App, 60_000),
            (StepId::Health, 30_000),
            (StepId::Ssl, 40_000),
            (StepId::Ready, 2_000),
        ],
        _ => &[
            (StepId::Auth, 5_000),
            (StepId::Network, 30_000),
            (StepId::Compute, 90_000),
            (StepId::K8s, 180_000),
            (StepId::Storage, 20_000),
            (StepId::Catalog, 20_000),
            (StepId::App, 55_000),
            (StepId::Health, 30_000),
            (StepId::Ssl, 40_000),
            (StepId::Ready, 2_000),
        ],
    };
    base.iter().copied().collect()
}

pub fn total_estimate_ms(provider: &str) -> u64 {
    step_estimates_ms(provider).values().sum()
}

/// Sum of pending steps' full estimate plus, for the in-progress step,
/// `(estimate − elapsed)` clamped at zero (spec §4.10).
pub fn estimated_remaining_ms(provider: &str, steps: &[StepRecord], now_ms: impl Fn(&StepRecord) -> u64) -> u64 {
    let estimates = step_estimates_ms(provider);
    steps
        .iter()
        .map(|step| {
            let estimate = *estimates.get(&step.id).unwrap_or(&0);
            match step.status {
                StepStatus::Pending => estimate,
                StepStatus::InProgress => estimate.saturating_sub(now_ms(step)),
                StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped => 0,
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn unknown_provider_falls_back_to_generic_table() {
        let estimates = step_estimates_ms("does-not-exist");
        assert_eq!(estimates.len(), StepId::ALL.len());
    }

    #[test]
    fn remaining_sums_pending_plus_inflight_delta() {
        let mut steps: Vec<StepRecord> = StepId::ALL.iter().map(|s| StepRecord::pending(*s)).collect();
        steps[0].status = StepStatus::Completed;
        steps[1].status = StepStatus::InProgress;
        steps[1].started_at = Some(Utc::now());

        let remaining = estimated_remaining_ms("hetzner", &steps, |_| 5_000);
        let estimates = step_estimates_ms("hetzner");
        let expected: u64 = estimates[&StepId::Network].saturating_sub(5_000)
            + StepId::ALL[2..].iter().map(|s| estimates[s]).sum::<u64>();
        assert_eq!(remaining, expected);
    }
}
