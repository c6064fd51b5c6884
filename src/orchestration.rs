//! Heat Resource Metadata
//!
//! Fetches the metadata document Heat keeps for one stack resource.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::http::build_client;
use crate::identity::AuthenticatedEndpoint;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Resource metadata exactly as Heat returned it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMetadata(pub Value);

impl RawMetadata {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for RawMetadata {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Retrieves resource metadata from the orchestration service
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    async fn fetch_resource_metadata(
        &self,
        endpoint: &AuthenticatedEndpoint,
        stack_id: &str,
        resource_name: &str,
    ) -> Result<RawMetadata, FetchError>;
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    metadata: Option<Value>,
}

/// Heat v1 API client
#[derive(Debug, Clone, Copy, Default)]
pub struct HeatClient;

impl HeatClient {
    pub fn new() -> Self {
        Self
    }

    /// `{endpoint}/stacks/{stack_id}/resources/{resource_name}/metadata`
    ///
    /// The stack id may be `name/id` and is passed through untouched.
    pub fn metadata_url(
        endpoint: &Url,
        stack_id: &str,
        resource_name: &str,
    ) -> Result<Url, FetchError> {
        let url = format!(
            "{}/stacks/{}/resources/{}/metadata",
            endpoint.as_str().trim_end_matches('/'),
            stack_id.trim_matches('/'),
            urlencoding::encode(resource_name)
        );

        Url::parse(&url).map_err(|e| FetchError::InvalidUrl {
            url,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl OrchestrationClient for HeatClient {
    async fn fetch_resource_metadata(
        &self,
        endpoint: &AuthenticatedEndpoint,
        stack_id: &str,
        resource_name: &str,
    ) -> Result<RawMetadata, FetchError> {
        let client = build_client(&endpoint.tls)?;
        let url = Self::metadata_url(&endpoint.url, stack_id, resource_name)?;

        debug!(url = %url, "Fetching resource metadata");

        let response = client
            .get(url)
            .header(AUTH_TOKEN_HEADER, &endpoint.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body: MetadataResponse = response.json().await?;
        let metadata = body.metadata.ok_or(FetchError::MissingMetadata)?;

        Ok(RawMetadata(metadata))
    }
}
