//! Error types for the MangoApps client.
//!
//! Every failure path in the crate surfaces as a variant of [`Error`], with
//! enough context (status, body, request shape) for callers to decide between
//! user messaging and programmatic recovery. Nothing is swallowed: transport
//! failures that survive the retry policy become [`Error::Connection`], and
//! non-2xx resource responses become [`Error::Api`] with a classified
//! [`ApiErrorKind`].

use serde_json::Value;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for configuration, OAuth, and API failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or invalid at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// OIDC discovery failed: HTTP failure, invalid JSON, or missing fields.
    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    /// The authorization-code exchange was rejected or unreachable.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// A refresh was attempted without a refresh token, or was rejected.
    #[error("{0}")]
    TokenExpired(String),

    /// An API call was attempted without a usable access token.
    #[error("{0}")]
    Authentication(String),

    /// Non-2xx response from the resource API. Never retried.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Transient network failure that survived every retry attempt.
    #[error("connection failed after {attempts} attempt(s): {source}")]
    Connection {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The transport error from the final attempt.
        #[source]
        source: reqwest::Error,
    },

    /// The configured token store failed to load or save a token.
    #[error("token store error: {0}")]
    Store(String),
}

/// Classification of a non-2xx resource API response by status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 429
    RateLimit,
    /// 500..=599
    Server,
    /// Any other non-2xx status.
    Other,
}

impl ApiErrorKind {
    /// Map an HTTP status code to its error class.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

/// A non-2xx response from the resource API.
///
/// Carries the status code, the raw response body (and its JSON form when the
/// body parsed), and a [`RequestSnapshot`] of the request that produced it.
#[derive(Debug, Error)]
#[error("{message} (status {status})")]
pub struct ApiError {
    /// Status-code classification.
    pub kind: ApiErrorKind,
    /// HTTP status code of the response.
    pub status: u16,
    /// Human-readable message extracted from the response body.
    pub message: String,
    /// Parsed JSON body, when the response body was valid JSON.
    pub body: Option<Value>,
    /// Raw response body text.
    pub raw_body: String,
    /// The request that produced this response.
    pub request: RequestSnapshot,
}

/// Snapshot of an outgoing request, attached to [`ApiError`] for debugging.
///
/// `headers` includes the bearer `Authorization` value so a failing request
/// can be reproduced exactly; redact it before displaying the snapshot to end
/// users.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    /// Uppercase HTTP method.
    pub method: String,
    /// Full request URL (without query parameters).
    pub url: String,
    /// Query parameters sent with the request.
    pub params: Vec<(String, String)>,
    /// JSON body, if one was sent.
    pub body: Option<Value>,
    /// Request headers, including `Authorization`.
    pub headers: Vec<(String, String)>,
}
