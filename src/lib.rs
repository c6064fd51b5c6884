//! Heat Metadata Collector Library
//!
//! Polls OpenStack Heat for the deployment metadata of a single stack
//! resource and merges it into an ordered configuration list.
//!
//! ## Pipeline
//!
//! 1. **Config gate**: every required setting must be present before any
//!    network call (`config`)
//! 2. **Identity handshake**: Keystone v3 password auth and orchestration
//!    endpoint lookup in the service catalog (`identity`)
//! 3. **Metadata fetch**: Heat resource metadata API (`orchestration`)
//! 4. **Merge**: deployment descriptors folded into the previous list
//!    (`merger`)
//!
//! `collector::HeatCollector` runs the pipeline and reduces every failure to
//! `NotConfigured` or `MetadataNotAvailable`.
//!
//! ## Example
//!
//! ```ignore
//! use collect_config::{Collector, HeatCollector, HeatSettings, MergedList};
//!
//! let collector = HeatCollector::new(settings, "deployments");
//! let merged = collector.collect(&MergedList::default()).await?;
//! println!("{}", serde_json::to_string_pretty(&merged)?);
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod merger;
pub mod orchestration;

pub use collector::{Collector, HeatCollector};
pub use config::{DiscoveryStrategy, HeatConfig, HeatSettings};
pub use error::CollectorError;
pub use identity::{IdentityClient, KeystoneClient, ServiceCatalog, Session};
pub use merger::{merge, MergedEntry, MergedList};
pub use orchestration::{HeatClient, OrchestrationClient, RawMetadata};
