//! Metadata Collectors
//!
//! A collector runs gate → handshake → fetch → merge and reports failure as
//! either `NotConfigured` or `MetadataNotAvailable`. Nothing partial is
//! returned and the caller's previous list is only ever borrowed.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{validate, HeatConfig, HeatSettings};
use crate::error::{CollectFailure, CollectorError};
use crate::identity::{handshake, IdentityClient, KeystoneClient};
use crate::merger::{merge, MergedList, DEFAULT_DEPLOYMENT_KEY};
use crate::orchestration::{HeatClient, OrchestrationClient};

/// A source of deployment metadata
#[async_trait]
pub trait Collector: Send + Sync {
    /// Name used to tag merged entries
    fn name(&self) -> &'static str;

    /// Collect metadata and merge it into `previous`
    async fn collect(&self, previous: &MergedList) -> Result<MergedList, CollectorError>;
}

/// Collects deployment metadata from Heat
pub struct HeatCollector {
    settings: HeatSettings,
    deployment_key: String,
    identity: Arc<dyn IdentityClient>,
    orchestration: Arc<dyn OrchestrationClient>,
}

impl HeatCollector {
    pub const NAME: &'static str = "heat";

    /// Create a collector backed by Keystone and Heat over HTTP
    pub fn new(settings: HeatSettings, deployment_key: impl Into<String>) -> Self {
        Self::with_clients(
            settings,
            deployment_key,
            Arc::new(KeystoneClient::new()),
            Arc::new(HeatClient::new()),
        )
    }

    /// Create a collector with explicit identity and orchestration clients
    pub fn with_clients(
        settings: HeatSettings,
        deployment_key: impl Into<String>,
        identity: Arc<dyn IdentityClient>,
        orchestration: Arc<dyn OrchestrationClient>,
    ) -> Self {
        let deployment_key = deployment_key.into();
        let deployment_key = if deployment_key.trim().is_empty() {
            DEFAULT_DEPLOYMENT_KEY.to_string()
        } else {
            deployment_key
        };

        Self {
            settings,
            deployment_key,
            identity,
            orchestration,
        }
    }

    pub fn deployment_key(&self) -> &str {
        &self.deployment_key
    }

    async fn fetch_and_merge(
        &self,
        config: &HeatConfig,
        previous: &MergedList,
    ) -> Result<MergedList, CollectFailure> {
        let endpoint = handshake(self.identity.as_ref(), config).await?;

        let raw = self
            .orchestration
            .fetch_resource_metadata(&endpoint, &config.stack_id, &config.resource_name)
            .await?;

        Ok(merge(&raw, &self.deployment_key, Self::NAME, previous)?)
    }
}

#[async_trait]
impl Collector for HeatCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&self, previous: &MergedList) -> Result<MergedList, CollectorError> {
        let config =
            validate(&self.settings).map_err(|_| CollectorError::NotConfigured(Self::NAME))?;

        let merged = self
            .fetch_and_merge(&config, previous)
            .await
            .map_err(|failure| {
                warn!(collector = Self::NAME, error = %failure, "{}", failure);
                CollectorError::MetadataNotAvailable(Self::NAME)
            })?;

        info!(
            collector = Self::NAME,
            stack_id = %config.stack_id,
            resource = %config.resource_name,
            entries = merged.len(),
            "Metadata collected"
        );

        Ok(merged)
    }
}
