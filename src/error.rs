//! Error handling for spotctl.
//!
//! Provides a single error type whose [`ErrorKind`] tells the caller what
//! went wrong *and* what the user should do about it. The kinds follow the
//! life cycle of a command:
//!
//! * Authorization: missing credentials, forged callbacks, denied consent,
//!   failed code exchange
//! * Token freshness: not logged in, refresh failed
//! * API responses: 401, 403, 404, 429 and everything else
//! * Local failures: I/O, invalid data, cancellation
//!
//! # Example
//!
//! ```rust
//! use spotctl::error::{Error, ErrorKind, Result};
//!
//! fn pick(devices: &[Device], fragment: &str) -> Result<&Device> {
//!     devices
//!         .iter()
//!         .find(|device| device.name.contains(fragment))
//!         .ok_or_else(|| Error::device_not_found(format!("no device matches \"{fragment}\"")))
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type combining error kind and details.
///
/// Provides:
/// * Categorized error types ([`ErrorKind`])
/// * Underlying error details
/// * Conversion from common error types
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// HTTP status returned by the Web API when no more specific kind applies.
///
/// Carried as the source of [`ErrorKind::Api`] errors, retrievable with
/// [`Error::status`].
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("HTTP status {0}")]
pub struct StatusError(pub StatusCode);

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// # Returns
    /// * `Some(&E)` - If the underlying error is of type `E`
    /// * `None` - If the underlying error is not of type `E`
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// The HTTP status of an [`ErrorKind::Api`] error.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.downcast::<StatusError>().map(|status| status.0)
    }

    /// Whether this is the distinguished 404 outcome of an API call.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Standard result type for spotctl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories.
///
/// Every message names the action that fixes the condition, because these
/// messages are what the user ends up reading on the terminal.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// Interrupted by the user or a signal.
    #[error("operation was cancelled")]
    Cancelled,

    /// Rejected locally before anything was sent.
    #[error("invalid argument specified")]
    InvalidArgument,

    /// No client id and secret from any source.
    #[error(
        "no client credentials; set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET or run `spotctl login`"
    )]
    MissingCredentials,

    /// Callback `state` did not match the stored nonce.
    #[error("authorization state mismatch, possible forged callback; run `spotctl login` again")]
    CsrfStateMismatch,

    /// The provider redirected back with an `error` parameter.
    #[error("authorization denied; run `spotctl login` and grant access")]
    AuthorizationDenied,

    /// The token endpoint did not return an access token for the code.
    #[error("token exchange failed; check your client credentials and run `spotctl login` again")]
    TokenExchangeFailed,

    /// No token record on disk.
    #[error("not logged in; run `spotctl login`")]
    NotAuthenticated,

    /// The refresh token was rejected or the token endpoint failed.
    #[error("could not refresh the access token; run `spotctl login`")]
    RefreshFailed,

    /// HTTP 401 from the Web API.
    #[error("access token rejected; run `spotctl login`")]
    Unauthorized,

    /// HTTP 403 from the Web API.
    #[error("request forbidden; Spotify Premium is required for playback control")]
    Forbidden,

    /// HTTP 404 from the Web API.
    ///
    /// The Web API also answers 404 when no device is active.
    #[error("not found; open Spotify on one of your devices and try again")]
    NotFound,

    /// No device name contains the requested fragment.
    #[error("device not found; pick one of the available devices")]
    DeviceNotFound,

    /// HTTP 429 beyond what local waiting could absorb.
    #[error("rate limited by Spotify; wait a while and try again")]
    RateLimited,

    /// Any other HTTP failure after retries.
    #[error("Spotify API error; try again later")]
    Api,

    /// Network unreachable or connection failed.
    #[error("service unavailable; check your network connection")]
    Unavailable,

    /// Local file system failure.
    #[error("i/o error")]
    Io,

    /// Malformed file or response.
    #[error("invalid data")]
    InvalidData,

    /// A bug or an impossible state.
    #[error("internal error")]
    Internal,
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::Forbidden, "PUT me/player/play");
    /// assert_eq!(err.kind, ErrorKind::Forbidden);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an [`ErrorKind::Api`] error for an HTTP status.
    #[must_use]
    pub fn api(status: StatusCode) -> Self {
        Self::new(ErrorKind::Api, StatusError(status))
    }

    /// Creates an error for operations interrupted by the user.
    pub fn cancelled<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Cancelled, error)
    }

    /// Creates an error for invalid arguments.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::invalid_argument("volume must be between 0 and 100");
    /// assert_eq!(err.kind, ErrorKind::InvalidArgument);
    /// ```
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for missing client credentials.
    pub fn missing_credentials<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::MissingCredentials, error)
    }

    /// Creates an error for a callback whose state does not match.
    ///
    /// Never retried: a mismatch means the callback did not originate from
    /// the authorization request this process issued.
    pub fn csrf_state_mismatch<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::CsrfStateMismatch, error)
    }

    /// Creates an error for a denied authorization request.
    pub fn authorization_denied<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::AuthorizationDenied, error)
    }

    /// Creates an error for a failed authorization code exchange.
    pub fn token_exchange_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::TokenExchangeFailed, error)
    }

    /// Creates an error for a missing token record.
    pub fn not_authenticated<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotAuthenticated, error)
    }

    /// Creates an error for a failed token refresh.
    pub fn refresh_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::RefreshFailed, error)
    }

    /// Creates an error for HTTP 401.
    pub fn unauthorized<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unauthorized, error)
    }

    /// Creates an error for HTTP 403.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::forbidden("premium subscription required");
    /// assert_eq!(err.kind, ErrorKind::Forbidden);
    /// ```
    pub fn forbidden<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Forbidden, error)
    }

    /// Creates an error for HTTP 404 and other missing resources.
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates an error for an unresolvable device name.
    pub fn device_not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeviceNotFound, error)
    }

    /// Creates an error for exhausted rate-limit waits.
    pub fn rate_limited<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::RateLimited, error)
    }

    /// Creates an error for unreachable services.
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error for local file system failures.
    pub fn io<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Io, error)
    }

    /// Creates an error for malformed files or responses.
    pub fn invalid_data<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidData, error)
    }

    /// Creates an error for internal failures.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display, showing both kind and details.
///
/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
///
/// File lookups that may legitimately miss check for
/// `std::io::ErrorKind::NotFound` themselves before converting, so a missing
/// file never masquerades as an API 404.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            Interrupted => Self::cancelled(err),
            InvalidInput | InvalidData | UnexpectedEof => Self::invalid_data(err),
            _ => Self::io(err),
        }
    }
}

/// Converts HTTP client errors into appropriate error kinds.
///
/// Maps HTTP errors based on their nature:
/// * Connect and timeout errors -> `Unavailable`
/// * Decode and body errors -> `InvalidData`
/// * Builder errors -> `Internal`
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            return Self::unavailable(err);
        }

        if err.is_decode() || err.is_body() {
            return Self::invalid_data(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        if let Some(status) = err.status() {
            return Self::api(status);
        }

        Self::unavailable(err)
    }
}

/// Converts JSON errors to `InvalidData`.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_data(err)
    }
}

/// Converts TOML parsing errors to `InvalidData`.
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_data(err)
    }
}

/// Converts TOML serialization errors to `Internal`.
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::internal(err)
    }
}

/// Converts invalid header errors to `Internal`.
impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts URL parsing errors to `Internal`.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::internal(e.to_string())
    }
}
