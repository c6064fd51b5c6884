//! Error types for the collector pipeline
//!
//! Each stage has its own error enum. Callers of a `Collector` only ever see
//! `CollectorError`; the stage errors end up in the log.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the config gate
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent or blank
    #[error("No {field} configured")]
    NotConfigured { field: &'static str },
}

/// Errors building the HTTP client for one collection run
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to read CA file {path}: {source}")]
    ReadCaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid CA bundle {path}: {source}")]
    InvalidCaBundle {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Service catalog lookup failures
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(
        "No {endpoint_type} endpoint for service type {service_type}{}",
        region_suffix(.region)
    )]
    EndpointNotFound {
        service_type: String,
        endpoint_type: String,
        region: Option<String>,
    },

    #[error("Catalog endpoint {url} is not a valid URL: {reason}")]
    InvalidUrl { url: String, reason: String },
}

fn region_suffix(region: &Option<String>) -> String {
    match region {
        Some(r) => format!(" in region {}", r),
        None => String::new(),
    }
}

/// Identity handshake failures
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid auth URL {url}: {reason}")]
    InvalidAuthUrl { url: String, reason: String },

    #[error("Identity version discovery failed: {0}")]
    Discovery(String),

    #[error("Identity service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity service rejected credentials with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Identity service response carried no X-Subject-Token header")]
    MissingToken,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Orchestration metadata fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid resource metadata URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Orchestration request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Orchestration service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Resource metadata response has no metadata member")]
    MissingMetadata,

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Merge failures that cannot be handled by skipping a single descriptor
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Resource metadata must be an object, got {kind}")]
    NotAnObject { kind: &'static str },
}

/// Failure anywhere after the config gate
#[derive(Debug, Error)]
pub(crate) enum CollectFailure {
    #[error("identity handshake failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("metadata fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("metadata merge failed: {0}")]
    Merge(#[from] MergeError),
}

/// Errors surfaced by `Collector::collect`
///
/// The underlying cause is logged at warn level and deliberately not
/// carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CollectorError {
    /// A required setting for this collector is missing
    #[error("{0} metadata not configured")]
    NotConfigured(&'static str),

    /// Authentication, fetch or merge failed
    #[error("{0} metadata not available")]
    MetadataNotAvailable(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::EndpointNotFound {
            service_type: "orchestration".to_string(),
            endpoint_type: "publicURL".to_string(),
            region: Some("RegionTwo".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "No publicURL endpoint for service type orchestration in region RegionTwo"
        );

        let err = CatalogError::EndpointNotFound {
            service_type: "orchestration".to_string(),
            endpoint_type: "publicURL".to_string(),
            region: None,
        };
        assert_eq!(
            err.to_string(),
            "No publicURL endpoint for service type orchestration"
        );
    }

    #[test]
    fn test_collector_error_display() {
        assert_eq!(
            CollectorError::NotConfigured("heat").to_string(),
            "heat metadata not configured"
        );
        assert_eq!(
            CollectorError::MetadataNotAvailable("heat").to_string(),
            "heat metadata not available"
        );
    }
}
