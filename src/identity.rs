//! Keystone Identity Handshake
//!
//! Exchanges user/project credentials for a token and a service catalog,
//! then resolves the Heat endpoint from that catalog.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DiscoveryStrategy, HeatConfig};
use crate::error::{CatalogError, IdentityError};
use crate::http::{build_client, TlsOptions};

/// Catalog service type of Heat
pub const ORCHESTRATION_SERVICE_TYPE: &str = "orchestration";

/// Endpoint type the collector talks to
pub const PUBLIC_ENDPOINT_TYPE: &str = "publicURL";

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

// ============================================================
// Service Catalog
// ============================================================

/// One endpoint of a catalog service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEndpoint {
    /// public, internal or admin
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

impl CatalogEndpoint {
    fn in_region(&self, region: &str) -> bool {
        self.region.as_deref() == Some(region) || self.region_id.as_deref() == Some(region)
    }
}

/// A service advertised in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// Service catalog returned alongside a Keystone token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    pub services: Vec<CatalogService>,
}

/// Map a v2 endpoint type (`publicURL`) to its v3 interface name (`public`)
fn interface_name(endpoint_type: &str) -> &str {
    endpoint_type.strip_suffix("URL").unwrap_or(endpoint_type)
}

impl ServiceCatalog {
    pub fn new(services: Vec<CatalogService>) -> Self {
        Self { services }
    }

    /// Find the URL of a service endpoint
    ///
    /// Without a region, the first endpoint in catalog order with the right
    /// service type and interface wins.
    pub fn resolve(
        &self,
        service_type: &str,
        endpoint_type: &str,
        region: Option<&str>,
    ) -> Result<Url, CatalogError> {
        let interface = interface_name(endpoint_type);

        let endpoint = self
            .services
            .iter()
            .filter(|service| service.service_type == service_type)
            .flat_map(|service| service.endpoints.iter())
            .find(|endpoint| {
                endpoint.interface == interface && region.map_or(true, |r| endpoint.in_region(r))
            })
            .ok_or_else(|| CatalogError::EndpointNotFound {
                service_type: service_type.to_string(),
                endpoint_type: endpoint_type.to_string(),
                region: region.map(str::to_string),
            })?;

        Url::parse(&endpoint.url).map_err(|e| CatalogError::InvalidUrl {
            url: endpoint.url.clone(),
            reason: e.to_string(),
        })
    }
}

// ============================================================
// Session
// ============================================================

/// Authenticated Keystone session, scoped to one collection run
#[derive(Clone)]
pub struct Session {
    token: String,
    catalog: ServiceCatalog,
}

impl Session {
    pub fn new(token: impl Into<String>, catalog: ServiceCatalog) -> Self {
        Self {
            token: token.into(),
            catalog,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("catalog", &self.catalog)
            .finish()
    }
}

/// Token plus the resolved Heat endpoint
#[derive(Clone)]
pub struct AuthenticatedEndpoint {
    pub url: Url,
    pub token: String,
    pub tls: TlsOptions,
}

impl std::fmt::Debug for AuthenticatedEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedEndpoint")
            .field("url", &self.url.as_str())
            .field("token", &"<redacted>")
            .field("tls", &self.tls)
            .finish()
    }
}

// ============================================================
// Identity Client
// ============================================================

/// Credentials and transport settings for one authentication
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub auth_url: &'a str,
    pub user_id: &'a str,
    pub password: &'a str,
    pub project_id: &'a str,
    pub tls: &'a TlsOptions,
    pub discovery: DiscoveryStrategy,
}

impl<'a> From<&'a HeatConfig> for AuthRequest<'a> {
    fn from(config: &'a HeatConfig) -> Self {
        Self {
            auth_url: &config.auth_url,
            user_id: &config.user_id,
            password: &config.password,
            project_id: &config.project_id,
            tls: &config.tls,
            discovery: config.discovery,
        }
    }
}

/// Exchanges credentials for a token and service catalog
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest<'_>) -> Result<Session, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct VersionDocument {
    #[serde(default)]
    versions: Option<VersionList>,
    #[serde(default)]
    version: Option<ApiVersion>,
}

#[derive(Debug, Deserialize)]
struct VersionList {
    #[serde(default)]
    values: Vec<ApiVersion>,
}

#[derive(Debug, Deserialize)]
struct ApiVersion {
    id: String,
    #[serde(default)]
    links: Vec<VersionLink>,
}

#[derive(Debug, Deserialize)]
struct VersionLink {
    rel: String,
    href: String,
}

impl VersionDocument {
    fn v3_href(&self) -> Option<&str> {
        self.versions
            .iter()
            .flat_map(|list| list.values.iter())
            .chain(self.version.iter())
            .filter(|version| version.id.starts_with("v3"))
            .flat_map(|version| version.links.iter())
            .find(|link| link.rel == "self")
            .map(|link| link.href.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: ServiceCatalog,
}

/// Keystone v3 password authentication over HTTP
#[derive(Debug, Clone, Copy, Default)]
pub struct KeystoneClient;

impl KeystoneClient {
    pub fn new() -> Self {
        Self
    }

    /// Work out the v3 endpoint behind the configured auth URL
    async fn discover_v3(
        &self,
        client: &reqwest::Client,
        auth_url: &str,
        strategy: DiscoveryStrategy,
    ) -> Result<Url, IdentityError> {
        let url = Url::parse(auth_url).map_err(|e| IdentityError::InvalidAuthUrl {
            url: auth_url.to_string(),
            reason: e.to_string(),
        })?;

        let versioned = url.path().trim_end_matches('/').ends_with("/v3");
        if strategy == DiscoveryStrategy::Direct || versioned {
            return Ok(url);
        }

        debug!(auth_url = %url, "Discovering identity API versions");

        let response = client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        // Keystone lists its versions with 300 Multiple Choices
        let status = response.status();
        if !status.is_success() && status != StatusCode::MULTIPLE_CHOICES {
            return Err(IdentityError::Discovery(format!("{} returned {}", url, status)));
        }

        let document: VersionDocument = response
            .json()
            .await
            .map_err(|e| IdentityError::Discovery(format!("unreadable version document: {}", e)))?;

        let href = document.v3_href().ok_or_else(|| {
            IdentityError::Discovery(format!("no v3 identity API advertised at {}", url))
        })?;

        Url::parse(href)
            .map_err(|e| IdentityError::Discovery(format!("bad v3 link {}: {}", href, e)))
    }
}

#[async_trait]
impl IdentityClient for KeystoneClient {
    async fn authenticate(&self, request: &AuthRequest<'_>) -> Result<Session, IdentityError> {
        let client = build_client(request.tls)?;
        let v3 = self
            .discover_v3(&client, request.auth_url, request.discovery)
            .await?;

        let tokens_url = format!("{}/auth/tokens", v3.as_str().trim_end_matches('/'));

        let body = serde_json::json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "id": request.user_id,
                            "password": request.password
                        }
                    }
                },
                "scope": {
                    "project": { "id": request.project_id }
                }
            }
        });

        debug!(url = %tokens_url, user_id = %request.user_id, "Requesting Keystone token");

        let response = client.post(&tokens_url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected { status, body });
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(IdentityError::MissingToken)?;

        let token_response: TokenResponse = response.json().await?;

        info!(
            project_id = %request.project_id,
            services = token_response.token.catalog.services.len(),
            "Keystone token issued"
        );

        Ok(Session::new(token, token_response.token.catalog))
    }
}

/// Authenticate and resolve the public orchestration endpoint
pub async fn handshake(
    identity: &dyn IdentityClient,
    config: &HeatConfig,
) -> Result<AuthenticatedEndpoint, IdentityError> {
    let session = identity.authenticate(&AuthRequest::from(config)).await?;

    let url = session.catalog().resolve(
        ORCHESTRATION_SERVICE_TYPE,
        PUBLIC_ENDPOINT_TYPE,
        config.region_name.as_deref(),
    )?;

    debug!(endpoint = %url, "Fetching metadata from {}", url);

    Ok(AuthenticatedEndpoint {
        url,
        token: session.token,
        tls: config.tls.clone(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::complete_settings;
    use crate::config::validate;
    use std::path::PathBuf;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn endpoint(interface: &str, region: &str, url: &str) -> CatalogEndpoint {
        CatalogEndpoint {
            interface: interface.to_string(),
            region: Some(region.to_string()),
            region_id: Some(region.to_string()),
            url: url.to_string(),
        }
    }

    pub(crate) fn heat_catalog(endpoints: Vec<CatalogEndpoint>) -> ServiceCatalog {
        ServiceCatalog::new(vec![
            CatalogService {
                service_type: "identity".to_string(),
                name: Some("keystone".to_string()),
                endpoints: vec![endpoint("public", "RegionOne", "http://keystone:5000/v3")],
            },
            CatalogService {
                service_type: ORCHESTRATION_SERVICE_TYPE.to_string(),
                name: Some("heat".to_string()),
                endpoints,
            },
        ])
    }

    fn two_region_catalog() -> ServiceCatalog {
        heat_catalog(vec![
            endpoint("internal", "RegionOne", "http://heat-internal:8004/v1/p"),
            endpoint("public", "RegionOne", "http://heat-one:8004/v1/p"),
            endpoint("public", "RegionTwo", "http://heat-two:8004/v1/p"),
        ])
    }

    fn plain_tls() -> TlsOptions {
        TlsOptions {
            ca_file: PathBuf::from("/nonexistent/ca.pem"),
            validate: false,
        }
    }

    fn token_body(heat_url: &str) -> serde_json::Value {
        serde_json::json!({
            "token": {
                "methods": ["password"],
                "expires_at": "2030-01-01T00:00:00.000000Z",
                "catalog": [{
                    "type": "orchestration",
                    "name": "heat",
                    "id": "5f8d6c2c",
                    "endpoints": [{
                        "id": "e1",
                        "interface": "public",
                        "region": "RegionOne",
                        "region_id": "RegionOne",
                        "url": heat_url
                    }]
                }]
            }
        })
    }

    #[test]
    fn test_resolve_with_region() {
        let url = two_region_catalog()
            .resolve(ORCHESTRATION_SERVICE_TYPE, PUBLIC_ENDPOINT_TYPE, Some("RegionTwo"))
            .unwrap();
        assert_eq!(url.as_str(), "http://heat-two:8004/v1/p");
    }

    #[test]
    fn test_resolve_without_region_takes_first_public() {
        let url = two_region_catalog()
            .resolve(ORCHESTRATION_SERVICE_TYPE, PUBLIC_ENDPOINT_TYPE, None)
            .unwrap();
        assert_eq!(url.as_str(), "http://heat-one:8004/v1/p");
    }

    #[test]
    fn test_resolve_accepts_v3_interface_names() {
        let url = two_region_catalog()
            .resolve(ORCHESTRATION_SERVICE_TYPE, "internal", None)
            .unwrap();
        assert_eq!(url.as_str(), "http://heat-internal:8004/v1/p");
    }

    #[test]
    fn test_resolve_matches_region_id_only() {
        let catalog = heat_catalog(vec![CatalogEndpoint {
            interface: "public".to_string(),
            region: None,
            region_id: Some("RegionThree".to_string()),
            url: "http://heat-three:8004/v1/p".to_string(),
        }]);

        assert!(catalog
            .resolve(ORCHESTRATION_SERVICE_TYPE, PUBLIC_ENDPOINT_TYPE, Some("RegionThree"))
            .is_ok());
    }

    #[test]
    fn test_resolve_unknown_region_fails() {
        let err = two_region_catalog()
            .resolve(ORCHESTRATION_SERVICE_TYPE, PUBLIC_ENDPOINT_TYPE, Some("RegionNine"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::EndpointNotFound { .. }));
    }

    #[test]
    fn test_resolve_bad_url_fails() {
        let catalog = heat_catalog(vec![endpoint("public", "RegionOne", "not a url")]);
        let err = catalog
            .resolve(ORCHESTRATION_SERVICE_TYPE, PUBLIC_ENDPOINT_TYPE, None)
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidUrl { .. }));
    }

    #[test]
    fn test_catalog_deserializes_from_keystone_shape() {
        let body: TokenResponse =
            serde_json::from_value(token_body("http://heat:8004/v1/p")).unwrap();
        let catalog = body.token.catalog;

        assert_eq!(catalog.services.len(), 1);
        assert_eq!(catalog.services[0].service_type, "orchestration");
        assert_eq!(catalog.services[0].endpoints[0].interface, "public");
    }

    #[test]
    fn test_session_debug_hides_token() {
        let session = Session::new("gAAAAABsecret", ServiceCatalog::default());
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("gAAAAABsecret"));
    }

    #[test]
    fn test_version_document_picks_v3() {
        let doc: VersionDocument = serde_json::from_value(serde_json::json!({
            "versions": {
                "values": [
                    {
                        "id": "v2.0",
                        "status": "deprecated",
                        "links": [{"rel": "self", "href": "http://keystone:5000/v2.0/"}]
                    },
                    {
                        "id": "v3.14",
                        "status": "stable",
                        "links": [{"rel": "self", "href": "http://keystone:5000/v3/"}]
                    }
                ]
            }
        }))
        .unwrap();

        assert_eq!(doc.v3_href(), Some("http://keystone:5000/v3/"));
    }

    #[tokio::test]
    async fn test_keystone_issues_token_and_catalog() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .and(body_partial_json(serde_json::json!({
                "auth": {
                    "identity": {"password": {"user": {"id": "user-1", "password": "pw"}}},
                    "scope": {"project": {"id": "project-1"}}
                }
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "gAAAAAB-token")
                    .set_body_json(token_body("http://heat:8004/v1/project-1")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tls = plain_tls();
        let auth_url = format!("{}/v3", server.uri());
        let request = AuthRequest {
            auth_url: &auth_url,
            user_id: "user-1",
            password: "pw",
            project_id: "project-1",
            tls: &tls,
            discovery: DiscoveryStrategy::Auto,
        };

        let session = KeystoneClient::new().authenticate(&request).await.unwrap();

        assert_eq!(session.token(), "gAAAAAB-token");
        assert_eq!(session.catalog().services.len(), 1);
    }

    #[tokio::test]
    async fn test_keystone_discovers_v3_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(300).set_body_json(serde_json::json!({
                "versions": {
                    "values": [{
                        "id": "v3.14",
                        "status": "stable",
                        "links": [{"rel": "self", "href": format!("{}/v3/", server.uri())}]
                    }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "discovered")
                    .set_body_json(token_body("http://heat:8004/v1/p")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tls = plain_tls();
        let auth_url = format!("{}/", server.uri());
        let request = AuthRequest {
            auth_url: &auth_url,
            user_id: "u",
            password: "p",
            project_id: "proj",
            tls: &tls,
            discovery: DiscoveryStrategy::Auto,
        };

        let session = KeystoneClient::new().authenticate(&request).await.unwrap();
        assert_eq!(session.token(), "discovered");
    }

    #[tokio::test]
    async fn test_keystone_rejection_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string("The request you have made requires authentication."),
            )
            .mount(&server)
            .await;

        let tls = plain_tls();
        let auth_url = format!("{}/v3", server.uri());
        let request = AuthRequest {
            auth_url: &auth_url,
            user_id: "u",
            password: "wrong",
            project_id: "proj",
            tls: &tls,
            discovery: DiscoveryStrategy::Direct,
        };

        let err = KeystoneClient::new().authenticate(&request).await.unwrap_err();
        assert!(matches!(err, IdentityError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_keystone_without_subject_token_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(token_body("http://heat:8004/v1/p")),
            )
            .mount(&server)
            .await;

        let tls = plain_tls();
        let auth_url = format!("{}/v3", server.uri());
        let request = AuthRequest {
            auth_url: &auth_url,
            user_id: "u",
            password: "p",
            project_id: "proj",
            tls: &tls,
            discovery: DiscoveryStrategy::Direct,
        };

        let err = KeystoneClient::new().authenticate(&request).await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingToken));
    }

    struct StaticIdentity(ServiceCatalog);

    #[async_trait]
    impl IdentityClient for StaticIdentity {
        async fn authenticate(&self, _request: &AuthRequest<'_>) -> Result<Session, IdentityError> {
            Ok(Session::new("static-token", self.0.clone()))
        }
    }

    #[tokio::test]
    async fn test_handshake_uses_configured_region() {
        let mut settings = complete_settings();
        settings.region_name = Some("RegionTwo".to_string());
        let config = validate(&settings).unwrap();

        let target = handshake(&StaticIdentity(two_region_catalog()), &config)
            .await
            .unwrap();

        assert_eq!(target.url.as_str(), "http://heat-two:8004/v1/p");
        assert_eq!(target.token, "static-token");
        assert_eq!(target.tls, config.tls);
    }

    #[tokio::test]
    async fn test_handshake_without_region() {
        let config = validate(&complete_settings()).unwrap();

        let target = handshake(&StaticIdentity(two_region_catalog()), &config)
            .await
            .unwrap();

        assert_eq!(target.url.as_str(), "http://heat-one:8004/v1/p");
    }

    #[tokio::test]
    async fn test_handshake_missing_service_fails() {
        let config = validate(&complete_settings()).unwrap();
        let catalog = ServiceCatalog::new(Vec::new());

        let err = handshake(&StaticIdentity(catalog), &config).await.unwrap_err();
        assert!(matches!(err, IdentityError::Catalog(_)));
    }
}
