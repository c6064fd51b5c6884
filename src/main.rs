//! Heat Metadata Collector
//!
//! Polls Heat for the deployment metadata of one stack resource and prints
//! the merged configuration list as JSON whenever it changes.
//!
//! # Usage
//! ```bash
//! # Collect once and exit
//! collect-config --once \
//!   --heat-auth-url https://keystone:5000/v3 \
//!   --heat-user-id $USER_ID --heat-password $PASSWORD \
//!   --heat-project-id $PROJECT_ID \
//!   --heat-stack-id mystack/1234 --heat-resource-name server \
//!   --heat-ca-file /etc/pki/ca.pem
//!
//! # Poll every 30 seconds
//! collect-config --polling-interval 30
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use collect_config::{
    Collector, CollectorError, DiscoveryStrategy, HeatCollector, HeatSettings, MergedList,
};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Discovery {
    Auto,
    Direct,
}

impl From<Discovery> for DiscoveryStrategy {
    fn from(discovery: Discovery) -> Self {
        match discovery {
            Discovery::Auto => DiscoveryStrategy::Auto,
            Discovery::Direct => DiscoveryStrategy::Direct,
        }
    }
}

#[derive(Parser)]
#[command(name = "collect-config", version, about = "Heat deployment metadata collector")]
struct Args {
    /// User ID for API authentication
    #[arg(long = "heat-user-id", env = "HEAT_USER_ID")]
    user_id: Option<String>,

    /// Password for API authentication
    #[arg(long = "heat-password", env = "HEAT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// ID of project for API authentication
    #[arg(long = "heat-project-id", env = "HEAT_PROJECT_ID")]
    project_id: Option<String>,

    /// URL for API authentication
    #[arg(long = "heat-auth-url", env = "HEAT_AUTH_URL")]
    auth_url: Option<String>,

    /// ID of the stack this deployment belongs to
    #[arg(long = "heat-stack-id", env = "HEAT_STACK_ID")]
    stack_id: Option<String>,

    /// Name of resource in the stack to be polled
    #[arg(long = "heat-resource-name", env = "HEAT_RESOURCE_NAME")]
    resource_name: Option<String>,

    /// Region name for extracting the Heat endpoint
    #[arg(long = "heat-region-name", env = "HEAT_REGION_NAME")]
    region_name: Option<String>,

    /// Validate server certificates when connecting to Keystone and Heat
    #[arg(
        long = "heat-ssl-certificate-validation",
        env = "HEAT_SSL_CERTIFICATE_VALIDATION",
        default_value_t = false,
        action = ArgAction::Set
    )]
    ssl_certificate_validation: bool,

    /// CA cert file for connecting to Keystone and Heat
    #[arg(long = "heat-ca-file", env = "HEAT_CA_FILE")]
    ca_file: Option<PathBuf>,

    /// Identity API version discovery
    #[arg(
        long = "heat-identity-discovery",
        value_enum,
        default_value = "auto",
        env = "HEAT_IDENTITY_DISCOVERY"
    )]
    discovery: Discovery,

    /// Key in the resource metadata holding the deployments
    #[arg(long, default_value = "deployments", env = "DEPLOYMENT_KEY")]
    deployment_key: String,

    /// Seconds between polls
    #[arg(long, default_value = "30", env = "POLLING_INTERVAL")]
    polling_interval: u64,

    /// Collect once and exit
    #[arg(long, default_value = "false")]
    once: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("settings", &self.heat_settings())
            .field("deployment_key", &self.deployment_key)
            .field("polling_interval", &self.polling_interval)
            .field("once", &self.once)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl Args {
    fn heat_settings(&self) -> HeatSettings {
        HeatSettings {
            user_id: self.user_id.clone(),
            password: self.password.clone(),
            project_id: self.project_id.clone(),
            auth_url: self.auth_url.clone(),
            stack_id: self.stack_id.clone(),
            resource_name: self.resource_name.clone(),
            region_name: self.region_name.clone(),
            ssl_certificate_validation: Some(self.ssl_certificate_validation),
            ca_file: self.ca_file.clone(),
            discovery: self.discovery.into(),
        }
    }
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let collector = HeatCollector::new(args.heat_settings(), args.deployment_key.clone());

    info!(
        collector = collector.name(),
        deployment_key = %collector.deployment_key(),
        interval = args.polling_interval,
        once = args.once,
        "Starting metadata collector"
    );

    let mut previous = MergedList::default();

    if args.once {
        let merged = collector
            .collect(&previous)
            .await
            .context("Metadata collection failed")?;
        print_merged(&merged)?;
        return Ok(());
    }

    let mut ticker = interval(Duration::from_secs(args.polling_interval.max(1)));

    loop {
        ticker.tick().await;

        match collector.collect(&previous).await {
            Ok(merged) if merged == previous => {
                info!(entries = merged.len(), "No metadata changes");
            }
            Ok(merged) => {
                print_merged(&merged)?;
                previous = merged;
            }
            Err(e @ CollectorError::NotConfigured(_)) => {
                warn!(error = %e, "Collector not configured, skipping poll");
            }
            Err(e) => {
                error!(error = %e, "Collection cycle failed");
            }
        }
    }
}

fn print_merged(merged: &MergedList) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(merged).context("Failed to serialize merged metadata")?;
    println!("{}", rendered);
    Ok(())
}
