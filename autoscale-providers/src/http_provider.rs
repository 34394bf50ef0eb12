use crate::classify::classify_provider_error;
use crate::provider::CloudProvider;
use crate::types::{Credentials, InstanceTypePricing, Server, ServerFilter, ServerOpts};
use async_trait::async_trait;
use autoscale_core::{AutoscaleError, Result};
use std::time::Duration;

/// REST-backed adapter for providers whose API follows a create/delete/list
/// server shape (spec §4.2). Concrete providers plug in their base URL and
/// credentials; request/response shapes are provider-specific and left for
/// each deployment to wire up against the provider's actual API.
pub struct GenericHttpProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl GenericHttpProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds with static config"),
            base_url: base_url.into(),
            credentials,
        }
    }

    fn auth_header(&self) -> Option<String> {
        self.credentials
            .0
            .get("api_token")
            .map(|token| format!("Bearer {token}"))
    }

    async fn map_error_response(response: reqwest::Response) -> AutoscaleError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        AutoscaleError::provider(classify_provider_error(status, &body), body)
    }
}

#[async_trait]
impl CloudProvider for GenericHttpProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_server(&self, opts: &ServerOpts) -> Result<Server> {
        let mut request = self
            .client
            .post(format!("{}/servers", self.base_url))
            .json(opts);
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::map_error_response(response).await);
        }
        Ok(response.json::<Server>().await?)
    }

    async fn delete_server(&self, provider_id: &str) -> Result<()> {
        let mut request = self
            .client
            .delete(format!("{}/servers/{}", self.base_url, provider_id));
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::map_error_response(response).await);
        }
        Ok(())
    }

    async fn list_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>> {
        let mut request = self.client.get(format!("{}/servers", self.base_url));
        if let Some(region) = &filter.region {
            request = request.query(&[("region", region)]);
        }
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::map_error_response(response).await);
        }
        let servers: Vec<Server> = response.json().await?;
        Ok(servers.into_iter().filter(|s| filter.matches(s)).collect())
    }

    async fn get_pricing(
        &self,
        instance_type: &str,
        region: &str,
    ) -> Result<Option<InstanceTypePricing>> {
        let mut request = self
            .client
            .get(format!("{}/pricing/{}", self.base_url, instance_type))
            .query(&[("region", region)]);
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }
        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::map_error_response(response).await);
        }
        Ok(Some(response.json::<InstanceTypePricing>().await?))
    }
}

impl std::fmt::Debug for GenericHttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericHttpProvider")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .finish()
    }
}
