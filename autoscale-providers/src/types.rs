use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque credentials handed to an adapter; adapters must not log these
/// (spec §6).
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials(pub HashMap<String, String>);

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Parameters for `create_server` (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOpts {
    pub name: String,
    pub region: String,
    pub instance_type: String,
    pub image: String,
    pub ssh_key_ids: Vec<String>,
    pub user_data: Option<String>,
    pub labels: HashMap<String, String>,
    pub network_id: Option<String>,
    pub firewall_id: Option<String>,
    pub is_spot: bool,
}

/// A provider's view of a running machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub provider_id: String,
    pub name: String,
    pub region: String,
    pub instance_type: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub is_spot: bool,
    pub labels: HashMap<String, String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Filter for `list_servers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerFilter {
    pub labels: HashMap<String, String>,
    pub region: Option<String>,
}

impl ServerFilter {
    pub fn matches(&self, server: &Server) -> bool {
        if let Some(region) = &self.region {
            if &server.region != region {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| server.labels.get(k) == Some(v))
    }
}

/// Cached pricing/capacity for a `(provider, instance_type, region)` triple
/// (spec §3 `InstanceTypePricing`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTypePricing {
    pub provider: String,
    pub instance_type: String,
    pub region: String,
    pub hourly_cost: f64,
    pub cpu: f64,
    pub memory_gb: f64,
    pub disk_gb: f64,
    pub spot_available: bool,
}
