use crate::types::{InstanceTypePricing, Server, ServerFilter, ServerOpts};
use async_trait::async_trait;
use autoscale_core::Result;

/// Uniform create/delete/list operations for one cloud provider (spec §4.2).
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// A short, stable identifier such as `"aws"` or `"hetzner"`.
    fn id(&self) -> &str;

    async fn create_server(&self, opts: &ServerOpts) -> Result<Server>;

    async fn delete_server(&self, provider_id: &str) -> Result<()>;

    async fn list_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>>;

    async fn get_pricing(
        &self,
        instance_type: &str,
        region: &str,
    ) -> Result<Option<InstanceTypePricing>>;
}
