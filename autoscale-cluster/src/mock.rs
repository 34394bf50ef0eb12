use crate::plane::ClusterPlane;
use crate::types::{
    ClusterNode, DrainOptions, DrainOutcome, NodeCondition, NodeUtilization, PendingPodSummary,
    WorkloadKind,
};
use async_trait::async_trait;
use autoscale_core::{AutoscaleError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory cluster plane used for orchestrator tests (spec §4.3).
pub struct MockClusterPlane {
    nodes: Mutex<HashMap<String, ClusterNode>>,
    cordoned: Mutex<std::collections::HashSet<String>>,
    replicas: Mutex<HashMap<String, u32>>,
    pending_pods: Mutex<PendingPodSummary>,
    utilization: Mutex<HashMap<String, NodeUtilization>>,
    fail_drain: Mutex<std::collections::HashSet<String>>,
}

impl MockClusterPlane {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            cordoned: Mutex::new(Default::default()),
            replicas: Mutex::new(HashMap::new()),
            pending_pods: Mutex::new(PendingPodSummary::default()),
            utilization: Mutex::new(HashMap::new()),
            fail_drain: Mutex::new(Default::default()),
        }
    }

    pub fn add_node(&self, node: ClusterNode) {
        self.nodes.lock().unwrap().insert(node.name.clone(), node);
    }

    pub fn set_replicas(&self, key: impl Into<String>, count: u32) {
        self.replicas.lock().unwrap().insert(key.into(), count);
    }

    pub fn set_pending_pods(&self, summary: PendingPodSummary) {
        *self.pending_pods.lock().unwrap() = summary;
    }

    pub fn set_utilization(&self, utilization: NodeUtilization) {
        self.utilization
            .lock()
            .unwrap()
            .insert(utilization.node_name.clone(), utilization);
    }

    /// Makes `drain` on `node_name` always time out, to exercise the
    /// "drain failure does not block deletion" path (spec §4.8).
    pub fn make_drain_time_out(&self, node_name: &str) {
        self.fail_drain.lock().unwrap().insert(node_name.to_string());
    }
}

impl Default for MockClusterPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterPlane for MockClusterPlane {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        Ok(self.nodes.lock().unwrap().values().cloned().collect())
    }

    async fn is_ready(&self, node_name: &str) -> Result<bool> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .get(node_name)
            .map(|n| n.is_ready())
            .unwrap_or(false))
    }

    async fn cordon(&self, node_name: &str) -> Result<()> {
        self.cordoned.lock().unwrap().insert(node_name.to_string());
        Ok(())
    }

    async fn uncordon(&self, node_name: &str) -> Result<()> {
        self.cordoned.lock().unwrap().remove(node_name);
        Ok(())
    }

    async fn drain(&self, node_name: &str, _opts: &DrainOptions) -> Result<DrainOutcome> {
        if self.fail_drain.lock().unwrap().contains(node_name) {
            return Ok(DrainOutcome::TimedOut);
        }
        if let Some(node) = self.nodes.lock().unwrap().get_mut(node_name) {
            node.pod_count = 0;
        }
        Ok(DrainOutcome::Drained)
    }

    async fn delete_node(&self, node_name: &str) -> Result<()> {
        self.nodes
            .lock()
            .unwrap()
            .remove(node_name)
            .map(|_| ())
            .ok_or_else(|| AutoscaleError::not_found(format!("node not found: {node_name}")))
    }

    async fn get_deployment_replicas(&self, kind: WorkloadKind, id: &str) -> Result<u32> {
        Ok(*self
            .replicas
            .lock()
            .unwrap()
            .get(&format!("{kind:?}/{id}"))
            .unwrap_or(&0))
    }

    async fn scale_deployment(&self, kind: WorkloadKind, id: &str, replicas: u32) -> Result<()> {
        self.replicas
            .lock()
            .unwrap()
            .insert(format!("{kind:?}/{id}"), replicas);
        Ok(())
    }

    async fn list_pending_pods(&self) -> Result<PendingPodSummary> {
        Ok(self.pending_pods.lock().unwrap().clone())
    }

    async fn node_utilization(&self) -> Result<Vec<NodeUtilization>> {
        Ok(self.utilization.lock().unwrap().values().cloned().collect())
    }
}
