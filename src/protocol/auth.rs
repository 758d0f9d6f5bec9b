//! Token endpoint responses.
//!
//! Successful exchange or refresh:
//!
//! ```json
//! {
//!     "access_token": "secret_token",
//!     "token_type": "Bearer",
//!     "scope": "user-read-playback-state user-modify-playback-state",
//!     "expires_in": 3600,
//!     "refresh_token": "secret_refresh_token"
//! }
//! ```
//!
//! `refresh_token` is optional on refresh: the accounts service only sends
//! one when it rotates the token.
//!
//! Failure:
//!
//! ```json
//! {
//!     "error": "invalid_grant",
//!     "error_description": "Invalid authorization code"
//! }
//! ```

use std::{fmt, time::Duration};

use serde::Deserialize;
use serde_with::{formats::Flexible, serde_as, DurationSeconds};
use veil::Redact;

/// Tokens issued by the accounts service.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Redact, Hash)]
pub struct Tokens {
    /// Bearer token for API access.
    #[redact]
    pub access_token: String,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,

    /// How long the access token remains valid.
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub expires_in: Duration,

    /// Present on code exchange; on refresh only when rotated.
    #[redact]
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Error body of the accounts service.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct AuthError {
    pub error: String,

    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{} ({description})", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Grant presented to the token endpoint.
#[derive(Clone, Redact)]
pub enum Grant {
    /// Exchange of an authorization code received on the redirect URI.
    AuthorizationCode {
        #[redact]
        code: String,
        redirect_uri: String,
    },

    /// Minting a new access token from a refresh token.
    RefreshToken {
        #[redact]
        refresh_token: String,
    },
}

impl Grant {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form fields for the token endpoint, without client authentication.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("grant_type", self.kind())];
        match self {
            Self::AuthorizationCode { code, redirect_uri } => {
                params.push(("code", code.as_str()));
                params.push(("redirect_uri", redirect_uri.as_str()));
            }
            Self::RefreshToken { refresh_token } => {
                params.push(("refresh_token", refresh_token.as_str()));
            }
        }
        params
    }
}
