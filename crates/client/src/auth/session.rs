//! OAuth session: authorization URLs, code exchange, and refresh.
//!
//! An [`OAuthSession`] owns the discovery cache and talks to the provider's
//! token endpoint. Discovery is resolved lazily on first use and kept for the
//! session's lifetime; concurrent first uses collapse into a single fetch.

use std::sync::Arc;

use reqwest::Client as HttpClient;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::discovery::{DiscoveryDocument, DiscoveryResolver};
use super::token::{OAuthErrorBody, Token, TokenEndpointResponse};
use crate::config::Config;
use crate::error::{Error, Result};

/// Query keys the authorization URL always controls. Extra parameters that
/// collide with these are dropped rather than letting a caller rewrite the
/// protocol.
const RESERVED_AUTHORIZE_PARAMS: &[&str] = &[
    "response_type",
    "client_id",
    "redirect_uri",
    "scope",
    "state",
    "code_challenge",
    "code_challenge_method",
];

/// Owns discovery and the token-endpoint flows for one provider.
pub struct OAuthSession {
    config: Arc<Config>,
    http: HttpClient,
    resolver: DiscoveryResolver,
    discovery: OnceCell<DiscoveryDocument>,
}

impl OAuthSession {
    /// Create a session over an existing HTTP client.
    #[must_use]
    pub fn new(config: Arc<Config>, http: HttpClient) -> Self {
        let resolver = DiscoveryResolver::new(http.clone(), config.base_url());
        Self { config, http, resolver, discovery: OnceCell::new() }
    }

    /// Provider metadata, fetched on first use and cached for the session.
    ///
    /// # Errors
    /// Returns [`Error::Discovery`] when the fetch or validation fails; a
    /// failure is not cached, so a later call retries.
    pub async fn discovery(&self) -> Result<&DiscoveryDocument> {
        self.discovery.get_or_try_init(|| self.resolver.discover()).await
    }

    /// Build the authorization URL for a browser-based login.
    ///
    /// Always includes `response_type=code`, the configured client, redirect
    /// URI and scope, and the caller's `state`. When `code_challenge` is
    /// supplied, `code_challenge_method` is sent alongside it. Extra
    /// parameters are appended, except those naming protocol-mandated keys,
    /// which are dropped with a warning.
    ///
    /// # Errors
    /// Returns [`Error::Discovery`] when the endpoints cannot be resolved.
    pub async fn authorization_url(
        &self,
        state: &str,
        code_challenge: Option<&str>,
        code_challenge_method: &str,
        extra_params: &[(String, String)],
    ) -> Result<String> {
        let discovery = self.discovery().await?;

        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", self.config.client_id()),
            ("redirect_uri", self.config.redirect_uri()),
            ("scope", self.config.scope()),
            ("state", state),
            ("response_type", "code"),
        ];

        if let Some(challenge) = code_challenge {
            params.push(("code_challenge", challenge));
            params.push(("code_challenge_method", code_challenge_method));
        }

        for (key, value) in extra_params {
            if RESERVED_AUTHORIZE_PARAMS.contains(&key.as_str()) {
                warn!(param = %key, "dropping extra authorize param that collides with a protocol field");
                continue;
            }
            params.push((key.as_str(), value.as_str()));
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{}?{query}", discovery.authorization_endpoint))
    }

    /// Exchange an authorization code for a token.
    ///
    /// Sends the PKCE verifier when one was used for the authorization
    /// request. The minted token is persisted to the configured store before
    /// being returned.
    ///
    /// # Errors
    /// Returns [`Error::TokenExchange`] when the token endpoint is
    /// unreachable or rejects the code, [`Error::Discovery`] when endpoint
    /// resolution fails, and [`Error::Store`] when persisting fails.
    pub async fn exchange_code(
        &self,
        authorization_code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Token> {
        let token_endpoint = self.discovery().await?.token_endpoint.clone();

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", authorization_code),
            ("redirect_uri", self.config.redirect_uri()),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        let response =
            self.http.post(&token_endpoint).form(&form).send().await.map_err(|err| {
                Error::TokenExchange(format!("token endpoint unreachable: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = provider_error_detail(response).await;
            return Err(Error::TokenExchange(format!(
                "token endpoint returned {}: {detail}",
                status.as_u16()
            )));
        }

        let parsed: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|err| Error::TokenExchange(format!("invalid token response: {err}")))?;

        let token = Token::from_response(parsed);
        info!("access token issued via authorization code");
        self.persist(&token).await?;
        Ok(token)
    }

    /// Obtain a new token using the refresh token of an existing one.
    ///
    /// The old token is not mutated. Providers that omit `refresh_token` from
    /// the refresh response keep the previous refresh token on the new token.
    ///
    /// # Errors
    /// Returns [`Error::TokenExpired`] when `token` has no refresh token (no
    /// network call is made) or when the provider rejects the refresh, and
    /// [`Error::Store`] when persisting the new token fails.
    pub async fn refresh(&self, token: &Token) -> Result<Token> {
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Err(Error::TokenExpired("No refresh token available".to_string()));
        };

        let token_endpoint = self.discovery().await?.token_endpoint.clone();

        let form: [(&str, &str); 4] = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret()),
        ];

        let response = self.http.post(&token_endpoint).form(&form).send().await.map_err(
            |err| Error::TokenExpired(format!("Token refresh failed: {err}")),
        )?;

        let status = response.status();
        if !status.is_success() {
            let detail = provider_error_detail(response).await;
            return Err(Error::TokenExpired(format!("Token refresh failed: {detail}")));
        }

        let parsed: TokenEndpointResponse = response.json().await.map_err(|err| {
            Error::TokenExpired(format!("Token refresh failed: invalid response: {err}"))
        })?;

        let mut refreshed = Token::from_response(parsed);
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = token.refresh_token.clone();
        }

        info!("access token refreshed");
        self.persist(&refreshed).await?;
        Ok(refreshed)
    }

    /// Load the token persisted by the configured store, if any.
    ///
    /// # Errors
    /// Returns [`Error::Store`] when the store itself fails; a missing token
    /// is `Ok(None)`.
    pub async fn load_persisted_token(&self) -> Result<Option<Token>> {
        match self.config.token_store() {
            Some(store) => store.load().await.map_err(Error::Store),
            None => Ok(None),
        }
    }

    async fn persist(&self, token: &Token) -> Result<()> {
        if let Some(store) = self.config.token_store() {
            store.save(token).await.map_err(Error::Store)?;
        }
        Ok(())
    }
}

/// Extract a human-readable detail string from a token-endpoint error
/// response: the RFC 6749 error body when it parses, the raw text otherwise.
async fn provider_error_detail(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<OAuthErrorBody>(&text) {
        Ok(body) => body.to_string(),
        Err(_) if text.is_empty() => "no error detail".to_string(),
        Err(_) => text,
    }
}
