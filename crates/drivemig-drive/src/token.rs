//! Access token discovery
//!
//! drivemig does not run an OAuth flow itself. The bearer token is taken
//! from the `DRIVEMIG_ACCESS_TOKEN` environment variable or, failing that,
//! from a JSON token file such as the ones written by Google client
//! libraries (`{"access_token": "..."}` or `{"token": "..."}`).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides the token file
pub const ACCESS_TOKEN_ENV: &str = "DRIVEMIG_ACCESS_TOKEN";

/// Errors raised while locating an access token
#[derive(Debug, Error)]
pub enum TokenError {
    /// Neither the environment variable nor the token file is present
    #[error("No access token: set DRIVEMIG_ACCESS_TOKEN or create {}", .0.display())]
    Missing(PathBuf),

    /// The token file exists but could not be read
    #[error("Failed to read token file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The token file does not hold a usable token
    #[error("Invalid token file {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Debug, Deserialize)]
struct TokenFile {
    access_token: Option<String>,
    token: Option<String>,
}

/// Resolves the access token from the environment or `token_path`
///
/// # Errors
///
/// See [`TokenError`].
pub fn load_access_token(token_path: &Path) -> Result<String, TokenError> {
    resolve_access_token(std::env::var(ACCESS_TOKEN_ENV).ok(), token_path)
}

/// Resolves the access token from an explicit environment value or `token_path`
pub fn resolve_access_token(
    env_value: Option<String>,
    token_path: &Path,
) -> Result<String, TokenError> {
    if let Some(token) = env_value.map(|t| t.trim().to_string()) {
        if !token.is_empty() {
            tracing::debug!("Using access token from {}", ACCESS_TOKEN_ENV);
            return Ok(token);
        }
    }

    if !token_path.exists() {
        return Err(TokenError::Missing(token_path.to_path_buf()));
    }

    let content = std::fs::read_to_string(token_path).map_err(|source| TokenError::Io {
        path: token_path.to_path_buf(),
        source,
    })?;
    let parsed: TokenFile = serde_json::from_str(&content).map_err(|e| TokenError::Invalid {
        path: token_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    parsed
        .access_token
        .or(parsed.token)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| TokenError::Invalid {
            path: token_path.to_path_buf(),
            reason: "missing 'access_token' or 'token' key".to_string(),
        })
}
