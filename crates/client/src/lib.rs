//! MangoApps API client core.
//!
//! This crate implements the authentication subsystem of a MangoApps platform
//! client: OIDC endpoint discovery, the OAuth2 authorization-code flow with
//! PKCE, access/refresh token lifecycle, and the HTTP request pipeline that
//! enforces authentication, retries transient failures, and classifies API
//! errors. Endpoint catalogs are a thin layer over [`Client::request`] and
//! live outside this crate.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐
//! │   Client   │  authentication gate + get/post/put/delete
//! └─────┬──────┘
//!       ├──► OAuthSession      (discovery cache, code exchange, refresh)
//!       │         ├──► DiscoveryResolver
//!       │         └──► TokenStore (pluggable persistence)
//!       └──► RequestPipeline   (bearer injection, retry, classification)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mangoapps_client::{Client, Config, PkcePair};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("example.mangoapps.com", "client_id", "client_secret")?;
//!     let client = Client::new(config)?;
//!
//!     // Browser-based login with PKCE.
//!     let pkce = PkcePair::generate();
//!     let url = client
//!         .authorization_url("random_state", Some(&pkce.challenge), "S256", &[])
//!         .await?;
//!     println!("Open in a browser: {url}");
//!
//!     // ... the user authorizes and the redirect URI receives ?code=... ...
//!     let token = client.authenticate("authorization_code", Some(&pkce.verifier)).await?;
//!     println!("token expires at {:?}", token.expires_at);
//!
//!     let me = client.get("users/me", &[]).await?;
//!     println!("{me:?}");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;

pub use auth::discovery::{DiscoveryDocument, DiscoveryResolver, WELL_KNOWN_PATH};
pub use auth::pkce::{challenge_for, PkcePair};
pub use auth::session::OAuthSession;
pub use auth::store::{MemoryTokenStore, TokenStore};
pub use auth::token::{Token, TokenEndpointResponse, EXPIRY_GRACE_SECONDS};
pub use client::Client;
pub use config::{Config, ProvisionedToken};
pub use error::{ApiError, ApiErrorKind, Error, RequestSnapshot, Result};
pub use http::{ApiBody, RequestOptions, RequestPipeline, MAX_ATTEMPTS, RETRY_BASE_INTERVAL};
