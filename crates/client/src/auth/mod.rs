//! OAuth2 + OIDC authentication subsystem.
//!
//! Everything with real state and failure semantics lives here:
//!
//! ```text
//! ┌──────────────┐
//! │ OAuthSession │  authorization URLs, code exchange, refresh
//! └──────┬───────┘
//!        ├──► DiscoveryResolver   (well-known endpoint metadata, cached)
//!        ├──► Token               (immutable bearer credential + expiry)
//!        └──► TokenStore          (pluggable persistence capability)
//!
//! PkcePair                        (verifier/challenge per attempt)
//! ```
//!
//! The [`crate::Client`] composes a session with the request pipeline; the
//! pieces here are public for embedders that drive the flow directly.

pub mod discovery;
pub mod pkce;
pub mod session;
pub mod store;
pub mod token;

pub use discovery::{DiscoveryDocument, DiscoveryResolver, WELL_KNOWN_PATH};
pub use pkce::{challenge_for, PkcePair};
pub use session::OAuthSession;
pub use store::{MemoryTokenStore, TokenStore};
pub use token::{OAuthErrorBody, Token, TokenEndpointResponse, EXPIRY_GRACE_SECONDS};
