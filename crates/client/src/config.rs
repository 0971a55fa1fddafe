//! Client configuration.
//!
//! [`Config`] is validated at construction and immutable afterwards. Optional
//! settings are applied with chained `with_*` methods. Environment-variable
//! loading is an explicit translation step ([`Config::from_env`]) executed by
//! the caller; there is no global or implicit configuration source.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::auth::store::TokenStore;
use crate::error::{Error, Result};

/// Redirect URI used when the embedder does not supply one.
pub const DEFAULT_REDIRECT_URI: &str = "https://localhost:3000/oauth/callback";

/// Scopes requested by default; includes offline access so refresh tokens are
/// issued.
pub const DEFAULT_SCOPE: &str = "openid profile offline_access";

/// Default total request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection-open deadline.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// A bearer credential supplied directly by the embedder (for example from
/// environment variables written by an earlier login).
///
/// Takes precedence over the token store when both are configured and the
/// credential is not expired.
#[derive(Debug, Clone)]
pub struct ProvisionedToken {
    /// The access token value.
    pub access_token: String,
    /// Refresh token, when one was issued alongside the access token.
    pub refresh_token: Option<String>,
    /// Absolute expiry, when known.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Endpoint, credential, and tunable values for a [`crate::Client`].
#[derive(Clone)]
pub struct Config {
    domain: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scope: String,
    timeout: Duration,
    open_timeout: Duration,
    auto_refresh: bool,
    base_url_override: Option<String>,
    token: Option<ProvisionedToken>,
    token_store: Option<Arc<dyn TokenStore>>,
}

impl Config {
    /// Create a configuration from the three required values.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] naming the first missing or empty
    /// field.
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self> {
        let domain = domain.into();
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        for (name, value) in
            [("domain", &domain), ("client_id", &client_id), ("client_secret", &client_secret)]
        {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{name} is required")));
            }
        }

        Ok(Self {
            domain,
            client_id,
            client_secret,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            auto_refresh: false,
            base_url_override: None,
            token: None,
            token_store: None,
        })
    }

    /// Build a configuration from `MANGOAPPS_*` environment variables.
    ///
    /// Reads `MANGOAPPS_DOMAIN`, `MANGOAPPS_CLIENT_ID` and
    /// `MANGOAPPS_CLIENT_SECRET` (required), plus `MANGOAPPS_REDIRECT_URI`,
    /// `MANGOAPPS_SCOPE`, and the pre-provisioned token triple
    /// `MANGOAPPS_ACCESS_TOKEN` / `MANGOAPPS_REFRESH_TOKEN` /
    /// `MANGOAPPS_TOKEN_EXPIRES_AT` (unix seconds).
    ///
    /// This is the translation step callers run before constructing a client;
    /// it does not read `.env` files or keep global state.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when a required variable is unset or
    /// `MANGOAPPS_TOKEN_EXPIRES_AT` is not a unix timestamp.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            required_env("MANGOAPPS_DOMAIN")?,
            required_env("MANGOAPPS_CLIENT_ID")?,
            required_env("MANGOAPPS_CLIENT_SECRET")?,
        )?;

        if let Ok(redirect_uri) = std::env::var("MANGOAPPS_REDIRECT_URI") {
            config = config.with_redirect_uri(redirect_uri);
        }
        if let Ok(scope) = std::env::var("MANGOAPPS_SCOPE") {
            config = config.with_scope(scope);
        }

        if let Ok(access_token) = std::env::var("MANGOAPPS_ACCESS_TOKEN") {
            let refresh_token = std::env::var("MANGOAPPS_REFRESH_TOKEN").ok();
            let expires_at = match std::env::var("MANGOAPPS_TOKEN_EXPIRES_AT") {
                Ok(raw) => {
                    let seconds = raw.parse::<i64>().map_err(|_| {
                        Error::Configuration(format!(
                            "MANGOAPPS_TOKEN_EXPIRES_AT must be a unix timestamp, got {raw:?}"
                        ))
                    })?;
                    Utc.timestamp_opt(seconds, 0).single()
                }
                Err(_) => None,
            };
            config = config.with_token(ProvisionedToken { access_token, refresh_token, expires_at });
        }

        Ok(config)
    }

    /// Override the redirect URI registered with the provider.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Override the requested scopes (space-delimited).
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Override the total request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the connection-open deadline.
    #[must_use]
    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    /// Opt into transparent refresh of expired tokens at the authentication
    /// gate. Off by default: with auto-refresh disabled an expired token
    /// fails the gate with [`Error::Authentication`].
    #[must_use]
    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    /// Supply a pre-provisioned bearer credential.
    #[must_use]
    pub fn with_token(mut self, token: ProvisionedToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Attach a token store for persisting and reloading tokens.
    #[must_use]
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Replace the derived `https://{domain}` origin.
    ///
    /// Intended for tests and self-hosted instances that are not reachable
    /// over the default scheme; `api_base` and discovery both follow the
    /// override.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    /// Origin of the platform instance, `https://{domain}` unless overridden.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.base_url_override.clone().unwrap_or_else(|| format!("https://{}", self.domain))
    }

    /// Root of the resource API, `{base_url}/api/`.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}/api/", self.base_url())
    }

    /// Platform domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// OAuth client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Redirect URI sent in authorization and token requests.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Space-delimited scopes.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Total request deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connection-open deadline.
    #[must_use]
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }

    /// Whether the authentication gate refreshes expired tokens.
    #[must_use]
    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    /// The pre-provisioned credential, when one was supplied.
    #[must_use]
    pub fn provisioned_token(&self) -> Option<&ProvisionedToken> {
        self.token.as_ref()
    }

    /// The configured token store, when one was attached.
    #[must_use]
    pub fn token_store(&self) -> Option<&Arc<dyn TokenStore>> {
        self.token_store.as_ref()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .field("open_timeout", &self.open_timeout)
            .field("auto_refresh", &self.auto_refresh)
            .field("has_token", &self.token.is_some())
            .field("has_token_store", &self.token_store.is_some())
            .finish()
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Configuration(format!("{name} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_base_and_api_urls_from_domain() {
        let config = Config::new("example.mangoapps.com", "id", "secret").unwrap();
        assert_eq!(config.base_url(), "https://example.mangoapps.com");
        assert_eq!(config.api_base(), "https://example.mangoapps.com/api/");
    }

    #[test]
    fn rejects_missing_required_fields() {
        let err = Config::new("", "id", "secret").unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("domain")));

        let err = Config::new("example.mangoapps.com", "", "secret").unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("client_id")));

        let err = Config::new("example.mangoapps.com", "id", "  ").unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("client_secret")));
    }

    #[test]
    fn applies_defaults() {
        let config = Config::new("example.mangoapps.com", "id", "secret").unwrap();
        assert_eq!(config.redirect_uri(), DEFAULT_REDIRECT_URI);
        assert_eq!(config.scope(), DEFAULT_SCOPE);
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.open_timeout(), DEFAULT_OPEN_TIMEOUT);
        assert!(!config.auto_refresh());
        assert!(config.provisioned_token().is_none());
        assert!(config.token_store().is_none());
    }

    #[test]
    fn with_methods_override_defaults() {
        let config = Config::new("example.mangoapps.com", "id", "secret")
            .unwrap()
            .with_redirect_uri("https://app.example.com/cb")
            .with_scope("openid")
            .with_timeout(Duration::from_secs(5))
            .with_open_timeout(Duration::from_secs(2))
            .with_auto_refresh(true);

        assert_eq!(config.redirect_uri(), "https://app.example.com/cb");
        assert_eq!(config.scope(), "openid");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.open_timeout(), Duration::from_secs(2));
        assert!(config.auto_refresh());
    }

    #[test]
    fn base_url_override_feeds_api_base() {
        let config = Config::new("example.mangoapps.com", "id", "secret")
            .unwrap()
            .with_base_url("http://127.0.0.1:9000");
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
        assert_eq!(config.api_base(), "http://127.0.0.1:9000/api/");
    }

    #[test]
    fn debug_output_redacts_client_secret() {
        let config = Config::new("example.mangoapps.com", "id", "hunter2").unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn from_env_translates_variables() {
        std::env::set_var("MANGOAPPS_DOMAIN", "env.mangoapps.com");
        std::env::set_var("MANGOAPPS_CLIENT_ID", "env_client");
        std::env::set_var("MANGOAPPS_CLIENT_SECRET", "env_secret");
        std::env::set_var("MANGOAPPS_ACCESS_TOKEN", "env_access");
        std::env::set_var("MANGOAPPS_REFRESH_TOKEN", "env_refresh");
        std::env::set_var("MANGOAPPS_TOKEN_EXPIRES_AT", "4102444800");

        let config = Config::from_env().unwrap();
        assert_eq!(config.domain(), "env.mangoapps.com");
        let token = config.provisioned_token().unwrap();
        assert_eq!(token.access_token, "env_access");
        assert_eq!(token.refresh_token.as_deref(), Some("env_refresh"));
        assert_eq!(token.expires_at.map(|t| t.timestamp()), Some(4_102_444_800));

        std::env::set_var("MANGOAPPS_TOKEN_EXPIRES_AT", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("EXPIRES_AT")));

        for name in [
            "MANGOAPPS_DOMAIN",
            "MANGOAPPS_CLIENT_ID",
            "MANGOAPPS_CLIENT_SECRET",
            "MANGOAPPS_ACCESS_TOKEN",
            "MANGOAPPS_REFRESH_TOKEN",
            "MANGOAPPS_TOKEN_EXPIRES_AT",
        ] {
            std::env::remove_var(name);
        }
    }
}
