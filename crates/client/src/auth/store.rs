//! Pluggable token persistence.
//!
//! The client treats persistence as an injected capability: anything that can
//! load and save a [`Token`] works. Errors are plain strings so
//! implementations stay decoupled from this crate's error type; the core
//! wraps them as [`crate::Error::Store`].

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::token::Token;

/// Capability for persisting tokens across sessions.
///
/// `save` is called on every token creation (code exchange and refresh);
/// `load` is consulted when a client has no pre-provisioned token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the persisted token, `None` when nothing has been saved.
    async fn load(&self) -> Result<Option<Token>, String>;

    /// Persist a token, replacing any previous one.
    async fn save(&self, token: &Token) -> Result<(), String>;
}

/// In-memory store with process lifetime.
///
/// Used by the test suite and suitable for embedders that only need tokens to
/// survive client re-creation, not process restarts.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: RwLock<Option<Token>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Token>, String> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, token: &Token) -> Result<(), String> {
        *self.slot.write().await = Some(token.clone());
        Ok(())
    }
}
