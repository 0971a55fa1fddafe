//! Bearer token value and token-endpoint wire types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before the recorded expiry at which a token is already treated as
/// expired, so a token cannot lapse mid-request.
pub const EXPIRY_GRACE_SECONDS: i64 = 300;

/// An immutable bearer credential with optional refresh material and expiry.
///
/// Tokens are minted by code exchange or refresh, or loaded from a token
/// store; refreshing produces a new `Token` rather than mutating the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The access token presented as `Authorization: Bearer …`.
    pub access_token: String,

    /// Refresh token, when the provider issued one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type reported by the provider, typically `Bearer`.
    pub token_type: String,

    /// Absolute expiry computed from `expires_in` at issuance time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Build a token from a token-endpoint response, computing the absolute
    /// expiry from `expires_in`.
    #[must_use]
    pub fn from_response(response: TokenEndpointResponse) -> Self {
        let expires_at =
            (response.expires_in > 0).then(|| Utc::now() + Duration::seconds(response.expires_in));

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            expires_at,
        }
    }

    /// True when the token is past its expiry or within
    /// [`EXPIRY_GRACE_SECONDS`] of it. A token without a recorded expiry is
    /// never considered expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + Duration::seconds(EXPIRY_GRACE_SECONDS) >= expires_at,
            None => false,
        }
    }
}

/// Successful token-endpoint response (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
pub struct TokenEndpointResponse {
    /// The issued access token.
    pub access_token: String,

    /// Token type; providers that omit it mean `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds; `0` when the provider does not report one.
    #[serde(default)]
    pub expires_in: i64,

    /// Refresh token, when issued.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token-endpoint error body (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
pub struct OAuthErrorBody {
    /// Machine-readable error code, e.g. `invalid_grant`.
    pub error: String,

    /// Optional human-readable detail.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}
