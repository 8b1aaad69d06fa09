//! Google Drive v3 HTTP client
//!
//! Provides a typed HTTP client for the Drive REST API. Handles the
//! authentication header, per-request deadlines, JSON deserialization and
//! classification of error responses into [`DriveError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemig_drive::client::DriveClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), drivemig_drive::DriveError> {
//! let client = DriveClient::new("access-token-here");
//! let about: serde_json::Value = client
//!     .send_json(client.request(Method::GET, "/about").query(&[("fields", "user")]))
//!     .await?;
//! println!("{about}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::DriveError;

/// Base URL for the Google Drive API v3
const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Default per-request deadline
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// 403 reasons Drive uses for quota exhaustion
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

// ============================================================================
// Drive API error body
// ============================================================================

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Google Drive API calls
///
/// Wraps `reqwest::Client` with the bearer token, base URL construction
/// and a per-request timeout. Retries and rate limiting are layered on top
/// by the engine, so every method here issues exactly one request.
#[derive(Clone)]
pub struct DriveClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// OAuth2 access token
    access_token: String,
    /// Deadline applied to every request
    timeout: Duration,
}

impl DriveClient {
    /// Creates a new DriveClient with the given access token
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token with a Drive scope
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DRIVE_BASE_URL)
    }

    /// Creates a new DriveClient with a custom base URL (useful for testing)
    ///
    /// # Arguments
    /// * `access_token` - A valid OAuth2 access token
    /// * `base_url` - Custom base URL for API requests
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a reference to the current access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Automatically prepends the base URL, adds the Authorization header
    /// and applies the request deadline.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, ...)
    /// * `path` - API path relative to base URL (e.g., "/files")
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
    }

    /// Sends a request and returns the response if its status is a success
    ///
    /// # Errors
    ///
    /// Returns a classified [`DriveError`] for transport failures and
    /// non-success statuses.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, DriveError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(classify_error_response(response).await)
    }

    /// Sends a request and deserializes a JSON success body
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus `DriveError::InvalidResponse` when the
    /// body does not decode into `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, DriveError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            DriveError::InvalidResponse(format!("Failed to decode response body: {}", e))
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> DriveError {
        if err.is_timeout() {
            DriveError::Timeout(self.timeout)
        } else {
            DriveError::NetworkError(err)
        }
    }
}

// ============================================================================
// Response classification
// ============================================================================

/// Maps a non-success response to a [`DriveError`]
///
/// - 401 → `Unauthorized`
/// - 403 with a rate-limit reason → `RateLimited`, any other 403 → `Forbidden`
/// - 404 → `NotFound`
/// - 429 → `RateLimited` with the `Retry-After` header, when present
/// - 5xx → `ServerError`
pub async fn classify_error_response(response: Response) -> DriveError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    let body = response.text().await.unwrap_or_default();
    let envelope: Option<ErrorEnvelope> = serde_json::from_str(&body).ok();
    let message = envelope
        .as_ref()
        .and_then(|e| e.error.message.clone())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let rate_limited_reason = envelope.as_ref().is_some_and(|e| {
        e.error
            .errors
            .iter()
            .filter_map(|d| d.reason.as_deref())
            .any(|r| RATE_LIMIT_REASONS.contains(&r))
    });

    debug!(status = status.as_u16(), %message, "Drive API error response");

    match status {
        StatusCode::UNAUTHORIZED => DriveError::Unauthorized(message),
        StatusCode::FORBIDDEN if rate_limited_reason => DriveError::RateLimited { retry_after },
        StatusCode::FORBIDDEN => DriveError::Forbidden(message),
        StatusCode::NOT_FOUND => DriveError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => DriveError::RateLimited { retry_after },
        s if s.is_server_error() => DriveError::ServerError(message),
        _ => DriveError::InvalidResponse(format!("Unexpected status {}: {}", status, message)),
    }
}

/// Parses a `Retry-After` header value
///
/// Supports both formats from RFC 7231:
/// - delay-seconds: `"120"`
/// - HTTP-date: `"Fri, 31 Dec 1999 23:59:59 GMT"`
///
/// Dates in the past, or more than an hour ahead, are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let secs = (target - now).num_seconds();
            if (0..=3600).contains(&secs) {
                return Some(Duration::from_secs(secs as u64));
            }
        }
    }

    warn!(value, "Could not parse Retry-After header");
    None
}
