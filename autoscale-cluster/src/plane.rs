use crate::types::{ClusterNode, DrainOptions, DrainOutcome, NodeUtilization, PendingPodSummary, WorkloadKind};
use async_trait::async_trait;
use autoscale_core::Result;

/// Everything the engine needs from the container cluster (spec §4.3).
#[async_trait]
pub trait ClusterPlane: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>>;

    async fn is_ready(&self, node_name: &str) -> Result<bool>;

    async fn cordon(&self, node_name: &str) -> Result<()>;

    async fn uncordon(&self, node_name: &str) -> Result<()>;

    /// Synchronous: returns once the node has no non-daemon pods left, or
    /// `opts.timeout` has elapsed, whichever comes first.
    async fn drain(&self, node_name: &str, opts: &DrainOptions) -> Result<DrainOutcome>;

    async fn delete_node(&self, node_name: &str) -> Result<()>;

    async fn get_deployment_replicas(&self, kind: WorkloadKind, id: &str) -> Result<u32>;

    async fn scale_deployment(&self, kind: WorkloadKind, id: &str, replicas: u32) -> Result<()>;

    async fn list_pending_pods(&self) -> Result<PendingPodSummary>;

    async fn node_utilization(&self) -> Result<Vec<NodeUtilization>>;
}

/// Ranks ready nodes matching `pool_labels` by (fewest pods, newest, lowest
/// utilization) and returns up to `count` names (spec §4.3).
///
/// Callers must treat the result as advisory: a node may disappear between
/// selection and drain, and adapters are expected to tolerate that.
pub fn select_scale_down_candidates(
    nodes: &[ClusterNode],
    utilization: &[NodeUtilization],
    pool_labels: &std::collections::HashMap<String, String>,
    count: usize,
) -> Vec<String> {
    let util_by_name: std::collections::HashMap<&str, &NodeUtilization> = utilization
        .iter()
        .map(|u| (u.node_name.as_str(), u))
        .collect();

    let mut candidates: Vec<&ClusterNode> = nodes
        .iter()
        .filter(|n| n.is_ready())
        .filter(|n| pool_labels.iter().all(|(k, v)| n.labels.get(k) == Some(v)))
        .collect();

    candidates.sort_by(|a, b| {
        a.pod_count
            .cmp(&b.pod_count)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| {
                let ua = util_by_name.get(a.name.as_str()).map(|u| u.cpu_fraction()).unwrap_or(0.0);
                let ub = util_by_name.get(b.name.as_str()).map(|u| u.cpu_fraction()).unwrap_or(0.0);
                ua.partial_cmp(&ub).unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    candidates
        .into_iter()
        .take(count)
        .map(|n| n.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    fn node(name: &str, pods: u32, age_secs: i64, ready: bool) -> ClusterNode {
        ClusterNode {
            name: name.to_string(),
            addresses: vec![],
            labels: HashMap::new(),
            conditions: vec![crate::types::NodeCondition {
                kind: "Ready".to_string(),
                status: ready,
                reason: None,
            }],
            pod_count: pods,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn fewest_pods_wins_first() {
        let nodes = vec![node("a", 5, 100, true), node("b", 1, 100, true), node("c", 3, 100, true)];
        let selected = select_scale_down_candidates(&nodes, &[], &HashMap::new(), 1);
        assert_eq!(selected, vec!["b".to_string()]);
    }

    #[test]
    fn not_ready_nodes_are_excluded() {
        let nodes = vec![node("a", 1, 100, false), node("b", 2, 100, true)];
        let selected = select_scale_down_candidates(&nodes, &[], &HashMap::new(), 5);
        assert_eq!(selected, vec!["b".to_string()]);
    }

    #[test]
    fn ties_broken_by_newest_first() {
        let nodes = vec![node("old", 1, 1000, true), node("new", 1, 10, true)];
        let selected = select_scale_down_candidates(&nodes, &[], &HashMap::new(), 1);
        assert_eq!(selected, vec!["new".to_string()]);
    }
}
