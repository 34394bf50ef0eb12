use crate::provider::CloudProvider;
use crate::types::{InstanceTypePricing, Server, ServerFilter, ServerOpts};
use async_trait::async_trait;
use autoscale_core::utils::generate_short_id;
use autoscale_core::{AutoscaleError, Result};
use chrono::Utc;
use std::sync::Mutex;

/// Deterministic in-memory provider used by orchestrator tests and local
/// development (spec §4.2 "at least one adapter must be testable without
/// network access").
pub struct MockProvider {
    id: String,
    servers: Mutex<Vec<Server>>,
    pricing: Mutex<Vec<InstanceTypePricing>>,
    fail_create: Mutex<bool>,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            servers: Mutex::new(Vec::new()),
            pricing: Mutex::new(Vec::new()),
            fail_create: Mutex::new(false),
        }
    }

    pub fn with_pricing(self, pricing: InstanceTypePricing) -> Self {
        self.pricing.lock().unwrap().push(pricing);
        self
    }

    /// Makes the next `create_server` call fail, to exercise retry paths.
    pub fn set_fail_create(&self, fail: bool) {
        *self.fail_create.lock().unwrap() = fail;
    }

    pub fn seeded_servers(&self) -> Vec<Server> {
        self.servers.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_server(&self, opts: &ServerOpts) -> Result<Server> {
        if *self.fail_create.lock().unwrap() {
            return Err(AutoscaleError::provider(
                autoscale_core::error::ProviderErrorKind::RateLimited,
                "mock provider configured to fail",
            ));
        }
        let server = Server {
            provider_id: generate_short_id("srv"),
            name: opts.name.clone(),
            region: opts.region.clone(),
            instance_type: opts.instance_type.clone(),
            public_ip: Some("203.0.113.10".to_string()),
            private_ip: Some("10.0.0.10".to_string()),
            is_spot: opts.is_spot,
            labels: opts.labels.clone(),
            created_at: Utc::now(),
        };
        self.servers.lock().unwrap().push(server.clone());
        Ok(server)
    }

    async fn delete_server(&self, provider_id: &str) -> Result<()> {
        let mut servers = self.servers.lock().unwrap();
        let before = servers.len();
        servers.retain(|s| s.provider_id != provider_id);
        if servers.len() == before {
            return Err(AutoscaleError::not_found(format!(
                "server not found: {provider_id}"
            )));
        }
        Ok(())
    }

    async fn list_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>> {
        Ok(self
            .servers
            .lock()
            .unwrap()
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn get_pricing(
        &self,
        instance_type: &str,
        region: &str,
    ) -> Result<Option<InstanceTypePricing>> {
        Ok(self
            .pricing
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.instance_type == instance_type && p.region == region)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ServerOpts {
        ServerOpts {
            name: "worker-1".to_string(),
            region: "eu-central".to_string(),
            instance_type: "cx31".to_string(),
            image: "ubuntu-22.04".to_string(),
            ssh_key_ids: vec![],
            user_data: None,
            labels: Default::default(),
            network_id: None,
            firewall_id: None,
            is_spot: false,
        }
    }

    #[tokio::test]
    async fn create_then_delete_round_trips() {
        let provider = MockProvider::new("hetzner");
        let server = provider.create_server(&opts()).await.unwrap();
        assert_eq!(provider.list_servers(&ServerFilter::default()).await.unwrap().len(), 1);
        provider.delete_server(&server.provider_id).await.unwrap();
        assert!(provider.list_servers(&ServerFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_server_fails() {
        let provider = MockProvider::new("hetzner");
        assert!(provider.delete_server("missing").await.is_err());
    }

    #[tokio::test]
    async fn forced_failure_surfaces_as_rate_limited() {
        let provider = MockProvider::new("hetzner");
        provider.set_fail_create(true);
        let err = provider.create_server(&opts()).await.unwrap_err();
        assert!(err.retryable());
    }
}
