//! Authenticated client: OAuth session + request pipeline composition.

use std::fmt;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info};

use crate::auth::session::OAuthSession;
use crate::auth::token::Token;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::{ApiBody, RequestOptions, RequestPipeline};

const NOT_AUTHENTICATED: &str = "Not authenticated. Complete OAuth flow first.";

/// Authenticated MangoApps API client.
///
/// Composes an [`OAuthSession`] with the [`RequestPipeline`]; every call
/// passes the authentication gate first. The token slot is read-mostly and
/// safe for concurrent callers; when auto-refresh is enabled, refreshes are
/// single-flight — N callers hitting an expired token trigger one refresh.
pub struct Client {
    config: Arc<Config>,
    oauth: OAuthSession,
    pipeline: RequestPipeline,
    token: RwLock<Option<Token>>,
    init: OnceCell<()>,
    refresh_lock: Mutex<()>,
}

impl Client {
    /// Build a client and its underlying HTTP transport.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when the HTTP client cannot be
    /// constructed (for example when the TLS backend fails to initialize).
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.open_timeout())
            .build()
            .map_err(|err| Error::Configuration(format!("failed to build HTTP client: {err}")))?;

        let oauth = OAuthSession::new(Arc::clone(&config), http.clone());
        let pipeline = RequestPipeline::new(http, config.api_base());

        Ok(Self {
            config,
            oauth,
            pipeline,
            token: RwLock::new(None),
            init: OnceCell::new(),
            refresh_lock: Mutex::new(()),
        })
    }

    /// The configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The OAuth session, for embedders driving the flow directly.
    #[must_use]
    pub fn oauth(&self) -> &OAuthSession {
        &self.oauth
    }

    // ---- OAuth flow ----

    /// Build the provider's authorization URL for a browser-based login.
    ///
    /// # Errors
    /// Returns [`Error::Discovery`] when endpoint resolution fails.
    pub async fn authorization_url(
        &self,
        state: &str,
        code_challenge: Option<&str>,
        code_challenge_method: &str,
        extra_params: &[(String, String)],
    ) -> Result<String> {
        self.oauth
            .authorization_url(state, code_challenge, code_challenge_method, extra_params)
            .await
    }

    /// Complete the authorization-code flow and install the resulting token.
    ///
    /// # Errors
    /// Returns [`Error::TokenExchange`] when the exchange fails and
    /// [`Error::Store`] when persisting the token fails.
    pub async fn authenticate(
        &self,
        authorization_code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Token> {
        let token = self.oauth.exchange_code(authorization_code, code_verifier).await?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Force a refresh of the current token.
    ///
    /// # Errors
    /// Returns [`Error::TokenExpired`] when there is no current token, the
    /// current token has no refresh token, or the provider rejects the
    /// refresh.
    pub async fn refresh_token(&self) -> Result<Token> {
        self.ensure_initialized().await?;

        let _guard = self.refresh_lock.lock().await;
        let current = self
            .token
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::TokenExpired("No refresh token available".to_string()))?;

        let refreshed = self.oauth.refresh(&current).await?;
        *self.token.write().await = Some(refreshed.clone());
        Ok(refreshed)
    }

    /// Snapshot of the current token, if any.
    pub async fn current_token(&self) -> Option<Token> {
        self.token.read().await.clone()
    }

    /// Whether a live (non-expired) token is available.
    pub async fn is_authenticated(&self) -> bool {
        if self.ensure_initialized().await.is_err() {
            return false;
        }
        self.token.read().await.as_ref().is_some_and(|token| !token.is_expired())
    }

    // ---- HTTP surface ----

    /// `GET {api_base}{path}` with optional query parameters.
    ///
    /// # Errors
    /// See [`Client::request`].
    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<ApiBody> {
        let options = RequestOptions {
            params: params.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
            ..RequestOptions::default()
        };
        self.request(Method::GET, path, options).await
    }

    /// `POST {api_base}{path}` with an optional JSON body.
    ///
    /// # Errors
    /// See [`Client::request`].
    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<ApiBody> {
        let options = RequestOptions { body: body.cloned(), ..RequestOptions::default() };
        self.request(Method::POST, path, options).await
    }

    /// `PUT {api_base}{path}` with an optional JSON body.
    ///
    /// # Errors
    /// See [`Client::request`].
    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<ApiBody> {
        let options = RequestOptions { body: body.cloned(), ..RequestOptions::default() };
        self.request(Method::PUT, path, options).await
    }

    /// `DELETE {api_base}{path}`.
    ///
    /// # Errors
    /// See [`Client::request`].
    pub async fn delete(&self, path: &str) -> Result<ApiBody> {
        self.request(Method::DELETE, path, RequestOptions::default()).await
    }

    /// Generic dispatcher behind the verb helpers; endpoint catalogs layer on
    /// top of this.
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] when no usable token is available,
    /// plus every failure mode of the pipeline ([`Error::Api`],
    /// [`Error::Connection`]).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiBody> {
        let access_token = self.ensure_authenticated().await?;
        self.pipeline.execute(method, path, &access_token, &options).await
    }

    // ---- Authentication gate ----

    /// Populate the token slot once, by precedence: an unexpired
    /// pre-provisioned token wins; otherwise the store's persisted token.
    async fn ensure_initialized(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| async {
                // A token installed explicitly (authenticate) wins over the
                // configured sources.
                if self.token.read().await.is_some() {
                    return Ok(());
                }
                if let Some(token) = self.load_initial_token().await? {
                    *self.token.write().await = Some(token);
                }
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    async fn load_initial_token(&self) -> Result<Option<Token>> {
        if let Some(provisioned) = self.config.provisioned_token() {
            let token = Token {
                access_token: provisioned.access_token.clone(),
                refresh_token: provisioned.refresh_token.clone(),
                token_type: "Bearer".to_string(),
                expires_at: provisioned.expires_at,
            };
            if !token.is_expired() {
                debug!("using pre-provisioned access token");
                return Ok(Some(token));
            }
            debug!("pre-provisioned token is expired, falling back to token store");
        }

        let stored = self.oauth.load_persisted_token().await?;
        if stored.is_some() {
            info!("loaded persisted token from store");
        }
        Ok(stored)
    }

    /// Return a live access token or fail.
    ///
    /// Never starts the interactive authorization flow. With auto-refresh
    /// enabled and a refresh token at hand, an expired token is refreshed
    /// here; the refresh lock serializes refreshers while slot reads stay
    /// unblocked, and the slot is re-checked after acquiring the lock so
    /// waiting callers reuse the winner's token.
    async fn ensure_authenticated(&self) -> Result<String> {
        self.ensure_initialized().await?;

        {
            let slot = self.token.read().await;
            match slot.as_ref() {
                Some(token) if !token.is_expired() => return Ok(token.access_token.clone()),
                Some(_) => {}
                None => return Err(Error::Authentication(NOT_AUTHENTICATED.to_string())),
            }
        }

        if !self.config.auto_refresh() {
            return Err(Error::Authentication(NOT_AUTHENTICATED.to_string()));
        }

        let _guard = self.refresh_lock.lock().await;

        let current = {
            let slot = self.token.read().await;
            match slot.as_ref() {
                Some(token) if !token.is_expired() => return Ok(token.access_token.clone()),
                Some(token) => token.clone(),
                None => return Err(Error::Authentication(NOT_AUTHENTICATED.to_string())),
            }
        };

        if current.refresh_token.is_none() {
            return Err(Error::Authentication(NOT_AUTHENTICATED.to_string()));
        }

        debug!("access token expired, refreshing before request");
        let refreshed = self.oauth.refresh(&current).await?;
        *self.token.write().await = Some(refreshed.clone());
        Ok(refreshed.access_token)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("config", &self.config).finish_non_exhaustive()
    }
}
