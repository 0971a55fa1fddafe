//! OIDC endpoint discovery.
//!
//! Fetches the provider's `/.well-known/openid-configuration` document and
//! validates that the endpoints the auth flow depends on are present. There
//! is no retry at this layer; a failure surfaces immediately and the caller
//! decides whether to re-invoke the session.

use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Well-known path of the OIDC metadata document.
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Provider metadata advertised by the OIDC discovery document.
///
/// Immutable once fetched; an [`crate::OAuthSession`] caches it for its own
/// lifetime and never re-fetches.
#[derive(Debug, Clone)]
pub struct DiscoveryDocument {
    /// Issuer identifier URI.
    pub issuer: String,
    /// Authorization endpoint for the browser redirect.
    pub authorization_endpoint: String,
    /// Token endpoint for code exchange and refresh.
    pub token_endpoint: String,
    /// Userinfo endpoint, when advertised.
    pub userinfo_endpoint: Option<String>,
    /// RP-initiated logout endpoint, when advertised.
    pub end_session_endpoint: Option<String>,
    /// JWKS document URI, when advertised.
    pub jwks_uri: Option<String>,
}

/// Raw wire form of the document; everything optional so validation can name
/// each missing required field instead of failing on the first.
#[derive(Debug, Deserialize)]
struct RawDiscovery {
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    end_session_endpoint: Option<String>,
    jwks_uri: Option<String>,
}

impl RawDiscovery {
    fn validate(self) -> Result<DiscoveryDocument> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("issuer", &self.issuer),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
        ] {
            if value.as_deref().map_or(true, str::is_empty) {
                missing.push(name);
            }
        }

        if !missing.is_empty() {
            return Err(Error::Discovery(format!(
                "missing required fields in discovery response: {}",
                missing.join(", ")
            )));
        }

        Ok(DiscoveryDocument {
            issuer: self.issuer.unwrap_or_default(),
            authorization_endpoint: self.authorization_endpoint.unwrap_or_default(),
            token_endpoint: self.token_endpoint.unwrap_or_default(),
            userinfo_endpoint: self.userinfo_endpoint,
            end_session_endpoint: self.end_session_endpoint,
            jwks_uri: self.jwks_uri,
        })
    }
}

/// Fetches and validates the provider's discovery document.
pub struct DiscoveryResolver {
    http: HttpClient,
    base_url: String,
}

impl DiscoveryResolver {
    /// Create a resolver for the given provider origin.
    #[must_use]
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    /// Fetch `{base_url}/.well-known/openid-configuration` and validate it.
    ///
    /// # Errors
    /// Returns [`Error::Discovery`] when the request fails, the response is
    /// not 2xx, the body is not valid JSON, or a required field is absent.
    pub async fn discover(&self) -> Result<DiscoveryDocument> {
        let url = format!("{}{WELL_KNOWN_PATH}", self.base_url);
        debug!(url = %url, "fetching OIDC discovery document");

        let response = self.http.get(&url).send().await.map_err(|err| {
            Error::Discovery(format!("failed to connect to discovery endpoint: {err}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Discovery(format!(
                "discovery endpoint returned {}",
                status.as_u16()
            )));
        }

        let raw: RawDiscovery = response.json().await.map_err(|err| {
            Error::Discovery(format!("invalid JSON response from discovery endpoint: {err}"))
        })?;

        let document = raw.validate()?;
        info!(issuer = %document.issuer, "resolved OIDC endpoints");
        Ok(document)
    }
}
