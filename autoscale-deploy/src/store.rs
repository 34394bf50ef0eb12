//! Persists `DeploymentProgress` so a restarted process can still answer
//! `get_progress`/`get_retry_info` for installs that survived a crash
//! mid-run. Shaped the same way `autoscale_store::ScalingStore` is (an
//! async trait plus one in-memory reference implementation) but kept as its
//! own small trait rather than folded into `ScalingStore`, since a
//! deployment's persistence needs (one big JSON blob per row) are simpler
//! than the rest of the data model's relational CRUD.

use crate::types::DeploymentProgress;
use async_trait::async_trait;
use autoscale_core::{AutoscaleError, DeploymentId, Result};
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn upsert(&self, progress: DeploymentProgress) -> Result<DeploymentProgress>;
    async fn get(&self, id: DeploymentId) -> Result<DeploymentProgress>;
    async fn list(&self) -> Result<Vec<DeploymentProgress>>;
}

#[derive(Default)]
pub struct InMemoryDeploymentStore {
    deployments: RwLock<HashMap<DeploymentId, DeploymentProgress>>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for InMemoryDeploymentStore {
    async fn upsert(&self, progress: DeploymentProgress) -> Result<DeploymentProgress> {
        self.deployments.write().unwrap().insert(progress.id, progress.clone());
        Ok(progress)
    }

    async fn get(&self, id: DeploymentId) -> Result<DeploymentProgress> {
        self.deployments
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AutoscaleError::not_found(format!("deployment not found: {id}")))
    }

    async fn list(&self) -> Result<Vec<DeploymentProgress>> {
        Ok(self.deployments.read().unwrap().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeploymentRequest;
    use autoscale_providers::Credentials;
    use chrono::Utc;

    fn request() -> DeploymentRequest {
        DeploymentRequest {
            provider: "hetzner".to_string(),
            region: "eu-central".to_string(),
            size: "small".to_string(),
            credentials: Credentials(HashMap::new()),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = InMemoryDeploymentStore::new();
        let id = DeploymentId::new();
        let progress = DeploymentProgress::new(id, &request(), Utc::now());
        store.upsert(progress).await.unwrap();
        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn get_missing_deployment_fails() {
        let store = InMemoryDeploymentStore::new();
        assert!(store.get(DeploymentId::new()).await.is_err());
    }
}
