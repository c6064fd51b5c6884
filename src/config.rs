//! Heat Collector Settings
//!
//! Raw settings as read from flags or environment, and the config gate that
//! turns them into a validated `HeatConfig` before anything touches the
//! network.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::error::ConfigError;
use crate::http::TlsOptions;

/// How the Keystone v3 endpoint is derived from the configured auth URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStrategy {
    /// Read the version document at the auth URL and pick the v3 endpoint
    #[default]
    Auto,
    /// Use the auth URL as the v3 endpoint without a discovery request
    Direct,
}

impl std::fmt::Display for DiscoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryStrategy::Auto => write!(f, "auto"),
            DiscoveryStrategy::Direct => write!(f, "direct"),
        }
    }
}

/// Heat collector settings, any of which may be missing
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HeatSettings {
    /// User ID for API authentication
    pub user_id: Option<String>,
    /// Password for API authentication
    pub password: Option<String>,
    /// ID of project for API authentication
    pub project_id: Option<String>,
    /// URL for API authentication
    pub auth_url: Option<String>,
    /// ID of the stack this deployment belongs to
    pub stack_id: Option<String>,
    /// Name of resource in the stack to be polled
    pub resource_name: Option<String>,
    /// Region name for extracting the Heat endpoint
    pub region_name: Option<String>,
    /// Validate the server certificate when connecting to Keystone and Heat
    pub ssl_certificate_validation: Option<bool>,
    /// CA cert file for connecting to Keystone and Heat
    pub ca_file: Option<PathBuf>,
    /// Identity API discovery mechanism
    #[serde(default)]
    pub discovery: DiscoveryStrategy,
}

impl std::fmt::Debug for HeatSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeatSettings")
            .field("user_id", &self.user_id)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("project_id", &self.project_id)
            .field("auth_url", &self.auth_url)
            .field("stack_id", &self.stack_id)
            .field("resource_name", &self.resource_name)
            .field("region_name", &self.region_name)
            .field("ssl_certificate_validation", &self.ssl_certificate_validation)
            .field("ca_file", &self.ca_file)
            .field("discovery", &self.discovery)
            .finish()
    }
}

/// Settings that passed the config gate
#[derive(Clone)]
pub struct HeatConfig {
    pub user_id: String,
    pub password: String,
    pub project_id: String,
    pub auth_url: String,
    pub stack_id: String,
    pub resource_name: String,
    pub region_name: Option<String>,
    pub tls: TlsOptions,
    pub discovery: DiscoveryStrategy,
}

impl std::fmt::Debug for HeatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeatConfig")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("auth_url", &self.auth_url)
            .field("stack_id", &self.stack_id)
            .field("resource_name", &self.resource_name)
            .field("region_name", &self.region_name)
            .field("tls", &self.tls)
            .field("discovery", &self.discovery)
            .finish()
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ConfigError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => {
            info!(field = field, "No {} configured.", field);
            Err(ConfigError::NotConfigured { field })
        }
    }
}

/// Check that every required setting is present
///
/// Fields are checked in a fixed order and the first missing one is
/// reported. A missing region is accepted for compatibility with older
/// deployments that never set it.
pub fn validate(settings: &HeatSettings) -> Result<HeatConfig, ConfigError> {
    let auth_url = required(&settings.auth_url, "auth_url")?;
    let password = required(&settings.password, "password")?;
    let project_id = required(&settings.project_id, "project_id")?;
    let user_id = required(&settings.user_id, "user_id")?;
    let stack_id = required(&settings.stack_id, "stack_id")?;
    let resource_name = required(&settings.resource_name, "resource_name")?;

    let Some(validate_certificate) = settings.ssl_certificate_validation else {
        info!(
            field = "ssl_certificate_validation",
            "No ssl_certificate_validation configured."
        );
        return Err(ConfigError::NotConfigured {
            field: "ssl_certificate_validation",
        });
    };

    let ca_file = match &settings.ca_file {
        Some(path) if !path.as_os_str().is_empty() => path.clone(),
        _ => {
            info!(field = "ca_file", "No ca_file configured.");
            return Err(ConfigError::NotConfigured { field: "ca_file" });
        }
    };

    let region_name = settings
        .region_name
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok(HeatConfig {
        user_id,
        password,
        project_id,
        auth_url,
        stack_id,
        resource_name,
        region_name,
        tls: TlsOptions {
            ca_file,
            validate: validate_certificate,
        },
        discovery: settings.discovery,
    })
}
