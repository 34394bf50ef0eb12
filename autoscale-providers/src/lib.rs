pub mod classify;
pub mod http_provider;
pub mod mock;
pub mod provider;
pub mod registry;
pub mod types;

pub use classify::classify_provider_error;
pub use http_provider::GenericHttpProvider;
pub use mock::MockProvider;
pub use provider::CloudProvider;
pub use registry::ProviderRegistry;
pub use types::{Credentials, InstanceTypePricing, Server, ServerFilter, ServerOpts};
