use crate::provider::CloudProvider;
use autoscale_core::{AutoscaleError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Looks up an adapter by provider id; unknown ids fail the call (spec §4.2).
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn CloudProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn CloudProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, provider_id: &str) -> Result<Arc<dyn CloudProvider>> {
        self.providers
            .get(provider_id)
            .cloned()
            .ok_or_else(|| AutoscaleError::not_found(format!("unknown provider: {provider_id}")))
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn unknown_provider_fails() {
        let registry = ProviderRegistry::new();
        assert!(registry.get("aws").is_err());
    }

    #[test]
    fn registered_provider_is_found() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("hetzner")));
        assert!(registry.get("hetzner").is_ok());
        assert!(registry.get("aws").is_err());
    }
}
