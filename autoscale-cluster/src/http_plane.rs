use crate::plane::ClusterPlane;
use crate::types::{
    ClusterNode, DrainOptions, DrainOutcome, NodeUtilization, PendingPodSummary, WorkloadKind,
};
use async_trait::async_trait;
use autoscale_core::Result;
use serde::Serialize;
use std::time::Duration;

/// REST-backed cluster plane for clusters exposing a control-plane API
/// (spec §4.3). Talks to a single base URL; concrete deployments point it
/// at their cluster's management endpoint.
pub struct HttpClusterPlane {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClusterPlane {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client builds with static config"),
            base_url: base_url.into(),
        }
    }
}

#[derive(Serialize)]
struct ScaleBody {
    replicas: u32,
}

#[async_trait]
impl ClusterPlane for HttpClusterPlane {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        let response = self
            .client
            .get(format!("{}/nodes", self.base_url))
            .send()
            .await?;
        Ok(response.json().await?)
    }

    async fn is_ready(&self, node_name: &str) -> Result<bool> {
        let nodes = self.list_nodes().await?;
        Ok(nodes.iter().any(|n| n.name == node_name && n.is_ready()))
    }

    async fn cordon(&self, node_name: &str) -> Result<()> {
        self.client
            .post(format!("{}/nodes/{}/cordon", self.base_url, node_name))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn uncordon(&self, node_name: &str) -> Result<()> {
        self.client
            .post(format!("{}/nodes/{}/uncordon", self.base_url, node_name))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn drain(&self, node_name: &str, opts: &DrainOptions) -> Result<DrainOutcome> {
        let response = self
            .client
            .post(format!("{}/nodes/{}/drain", self.base_url, node_name))
            .json(opts)
            .timeout(opts.timeout)
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => Ok(DrainOutcome::Drained),
            Ok(r) => Err(r.error_for_status().unwrap_err().into()),
            Err(e) if e.is_timeout() => Ok(DrainOutcome::TimedOut),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_node(&self, node_name: &str) -> Result<()> {
        self.client
            .delete(format!("{}/nodes/{}", self.base_url, node_name))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn get_deployment_replicas(&self, kind: WorkloadKind, id: &str) -> Result<u32> {
        let response = self
            .client
            .get(format!("{}/workloads/{:?}/{}/replicas", self.base_url, kind, id))
            .send()
            .await?;
        Ok(response.json().await?)
    }

    async fn scale_deployment(&self, kind: WorkloadKind, id: &str, replicas: u32) -> Result<()> {
        self.client
            .put(format!("{}/workloads/{:?}/{}/replicas", self.base_url, kind, id))
            .json(&ScaleBody { replicas })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_pending_pods(&self) -> Result<PendingPodSummary> {
        let response = self
            .client
            .get(format!("{}/pods/pending", self.base_url))
            .send()
            .await?;
        Ok(response.json().await?)
    }

    async fn node_utilization(&self) -> Result<Vec<NodeUtilization>> {
        let response = self
            .client
            .get(format!("{}/nodes/utilization", self.base_url))
            .send()
            .await?;
        Ok(response.json().await?)
    }
}
