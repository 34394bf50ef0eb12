use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node as reported by the cluster control plane (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    pub name: String,
    pub addresses: Vec<String>,
    pub labels: HashMap<String, String>,
    pub conditions: Vec<NodeCondition>,
    pub pod_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCondition {
    pub kind: String,
    pub status: bool,
    pub reason: Option<String>,
}

impl ClusterNode {
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status)
    }
}

/// Options for `drain` (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainOptions {
    pub grace_period: std::time::Duration,
    pub delete_empty_dir_data: bool,
    pub ignore_daemonsets: bool,
    pub timeout: std::time::Duration,
    pub force: bool,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            grace_period: std::time::Duration::from_secs(30),
            delete_empty_dir_data: true,
            ignore_daemonsets: true,
            timeout: std::time::Duration::from_secs(300),
            force: false,
        }
    }
}

/// Result of a drain call: whether the node reached zero non-daemon pods
/// before `timeout` elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrainOutcome {
    Drained,
    TimedOut,
}

/// Summary returned by `list_pending_pods` (spec §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingPodSummary {
    pub total: u32,
    pub unschedulable: u32,
    pub waiting: u32,
    pub oldest_pending: Option<chrono::DateTime<chrono::Utc>>,
    pub by_reason: HashMap<String, u32>,
    pub resource_requests: ResourceRequests,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequests {
    pub cpu: f64,
    pub memory_gb: f64,
}

/// Per-node allocation/request snapshot returned by `node_utilization`
/// (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUtilization {
    pub node_name: String,
    pub cpu_alloc: f64,
    pub mem_alloc: f64,
    pub cpu_req: f64,
    pub mem_req: f64,
}

impl NodeUtilization {
    /// Fraction of allocatable CPU actually requested; used to rank
    /// scale-down candidates (spec §4.3, lowest first).
    pub fn cpu_fraction(&self) -> f64 {
        if self.cpu_alloc <= 0.0 {
            0.0
        } else {
            self.cpu_req / self.cpu_alloc
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    ReplicaSet,
}
