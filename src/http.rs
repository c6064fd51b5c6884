//! HTTP transport for Keystone and Heat calls
//!
//! A fresh client is built for every collection run from the configured CA
//! bundle and certificate validation flag.

use reqwest::{Certificate, Client};
use std::path::PathBuf;
use tracing::debug;

use crate::error::TlsError;

/// TLS parameters shared by the identity and orchestration clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// PEM bundle trusted in addition to the system roots
    pub ca_file: PathBuf,
    /// When false, server certificates are not verified and the CA file is
    /// not read
    pub validate: bool,
}

/// Build an HTTP client honoring the TLS options
pub fn build_client(tls: &TlsOptions) -> Result<Client, TlsError> {
    let mut builder = Client::builder().user_agent(concat!(
        "collect-config/",
        env!("CARGO_PKG_VERSION")
    ));

    if tls.validate {
        let pem = std::fs::read(&tls.ca_file).map_err(|source| TlsError::ReadCaFile {
            path: tls.ca_file.clone(),
            source,
        })?;
        let certificates =
            Certificate::from_pem_bundle(&pem).map_err(|source| TlsError::InvalidCaBundle {
                path: tls.ca_file.clone(),
                source,
            })?;

        debug!(
            ca_file = %tls.ca_file.display(),
            certificates = certificates.len(),
            "Trusting CA bundle"
        );

        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    } else {
        debug!("Server certificate validation disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(TlsError::Client)
}
