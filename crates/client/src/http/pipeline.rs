//! Authenticated request execution with retry and error classification.
//!
//! The pipeline is used only after the authentication gate has produced a
//! live access token. It injects the bearer header, serializes JSON bodies,
//! retries transient network failures with exponential backoff, and turns
//! non-2xx responses into classified [`ApiError`]s. A received HTTP status is
//! never retried: a definite server response to a non-idempotent request must
//! not be replayed.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Method};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiErrorKind, Error, RequestSnapshot, Result};

/// Total attempts per request: one initial call plus two retries.
pub const MAX_ATTEMPTS: u32 = 3;

/// First backoff interval; doubles after each failed attempt (0.3s, 0.6s).
pub const RETRY_BASE_INTERVAL: Duration = Duration::from_millis(300);

const RETRY_BACKOFF_FACTOR: u32 = 2;

/// Decoded body of a 2xx response: JSON when the content type says so, raw
/// text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    /// Parsed JSON document (object, array, or scalar).
    Json(Value),
    /// Raw text for non-JSON content types.
    Text(String),
}

impl ApiBody {
    /// The JSON value, when the response was JSON.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// The raw text, when the response was not JSON.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

/// Per-request options; one instance describes one HTTP call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters.
    pub params: Vec<(String, String)>,
    /// JSON request body.
    pub body: Option<Value>,
    /// Extra request headers. `Authorization` is reserved and cannot be
    /// overridden here.
    pub headers: Vec<(String, String)>,
}

/// Executes authenticated requests against the resource API.
pub struct RequestPipeline {
    http: HttpClient,
    api_base: String,
}

impl RequestPipeline {
    /// Create a pipeline rooted at the given API base URL.
    #[must_use]
    pub fn new(http: HttpClient, api_base: String) -> Self {
        Self { http, api_base }
    }

    /// Execute one request and decode the response.
    ///
    /// Cancellation: dropping the returned future aborts the in-flight call;
    /// a canceled request is never retried. Deadlines come from the timeouts
    /// the HTTP client was built with.
    ///
    /// # Errors
    /// - [`Error::Api`] for any non-2xx response (no retry).
    /// - [`Error::Connection`] when a timeout or connection failure survives
    ///   all [`MAX_ATTEMPTS`] attempts.
    /// - [`Error::Configuration`] when a caller-supplied header or the token
    ///   cannot form a valid header value.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        access_token: &str,
        options: &RequestOptions,
    ) -> Result<ApiBody> {
        let url = format!("{}{}", self.api_base, path.trim_start_matches('/'));
        let headers = build_headers(access_token, &options.headers)?;
        let snapshot = snapshot_request(&method, &url, options, &headers);

        let mut delay = RETRY_BASE_INTERVAL;
        let mut attempt = 1u32;

        loop {
            let mut request =
                self.http.request(method.clone(), url.as_str()).headers(headers.clone());
            if !options.params.is_empty() {
                request = request.query(&options.params);
            }
            if let Some(body) = &options.body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => return handle_response(response, snapshot, attempt).await,
                Err(err) => {
                    if is_transient(&err) && attempt < MAX_ATTEMPTS {
                        warn!(attempt, error = %err, "transient network failure, retrying");
                        sleep(delay).await;
                        delay *= RETRY_BACKOFF_FACTOR;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Connection { attempts: attempt, source: err });
                }
            }
        }
    }
}

/// Merge caller headers and inject the bearer token. The `Authorization`
/// header is inserted last so callers cannot clobber it.
fn build_headers(access_token: &str, extra: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| Error::Configuration(format!("invalid header name {name:?}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| Error::Configuration(format!("invalid header value for {name}: {err}")))?;
        headers.insert(name, value);
    }

    let mut bearer = HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|err| {
        Error::Configuration(format!("access token is not a valid header value: {err}"))
    })?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);

    Ok(headers)
}

fn snapshot_request(
    method: &Method,
    url: &str,
    options: &RequestOptions,
    headers: &HeaderMap,
) -> RequestSnapshot {
    RequestSnapshot {
        method: method.to_string(),
        url: url.to_string(),
        params: options.params.clone(),
        body: options.body.clone(),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (name.to_string(), value.to_str().unwrap_or("<binary>").to_string())
            })
            .collect(),
    }
}

async fn handle_response(
    response: reqwest::Response,
    snapshot: RequestSnapshot,
    attempts: u32,
) -> Result<ApiBody> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let text = response
        .text()
        .await
        .map_err(|err| Error::Connection { attempts, source: err })?;

    if status.is_success() {
        debug!(status = status.as_u16(), "request succeeded");
        if is_json(&content_type) {
            if let Ok(value) = serde_json::from_str(&text) {
                return Ok(ApiBody::Json(value));
            }
        }
        return Ok(ApiBody::Text(text));
    }

    let body_json: Option<Value> = serde_json::from_str(&text).ok();
    let message = extract_message(status.as_u16(), body_json.as_ref());

    Err(Error::Api(ApiError {
        kind: ApiErrorKind::from_status(status.as_u16()),
        status: status.as_u16(),
        message,
        body: body_json,
        raw_body: text,
        request: snapshot,
    }))
}

/// Timeouts and connection failures are transient; everything else, in
/// particular any received HTTP status, is definite.
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Matches `application/json` and structured suffixes like
/// `application/hal+json`.
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.ends_with("json"))
}

fn extract_message(status: u16, body: Option<&Value>) -> String {
    body.and_then(|body| body.get("error").or_else(|| body.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("MangoApps API error: {status}"))
}
