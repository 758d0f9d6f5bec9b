//! Web API error bodies.
//!
//! ```json
//! {
//!     "error": {
//!         "status": 404,
//!         "message": "Player command failed: No active device found",
//!         "reason": "NO_ACTIVE_DEVICE"
//!     }
//! }
//! ```
//!
//! Rate-limited responses may also carry a top-level `retry_after` in
//! seconds.

use std::{fmt, time::Duration};

use serde::Deserialize;
use serde_with::{formats::Flexible, serde_as, DurationSeconds};

#[serde_as]
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<ErrorObject>,

    #[serde_as(as = "Option<DurationSeconds<u64, Flexible>>")]
    #[serde(default)]
    pub retry_after: Option<Duration>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub status: Option<u16>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub reason: Option<String>,
}

impl ErrorBody {
    /// Leniently parses an error body; anything unparsable is empty.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.error.as_ref().and_then(|error| error.message.as_deref())
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.message(), self.error.as_ref().and_then(|e| e.reason.as_deref())) {
            (Some(message), Some(reason)) => write!(f, "{message} ({reason})"),
            (Some(message), None) => write!(f, "{message}"),
            (None, Some(reason)) => write!(f, "{reason}"),
            (None, None) => write!(f, "no details"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_is_read_from_the_body() {
        let body = ErrorBody::parse(r#"{"error":{"status":429},"retry_after":3}"#);
        assert_eq!(body.retry_after, Some(Duration::from_secs(3)));
    }

    #[test]
    fn garbage_parses_as_empty() {
        assert_eq!(ErrorBody::parse("<html>"), ErrorBody::default());
        assert_eq!(ErrorBody::parse(""), ErrorBody::default());
    }

    #[test]
    fn display_prefers_message_and_reason() {
        let body = ErrorBody::parse(
            r#"{"error":{"status":404,"message":"Player command failed: No active device found","reason":"NO_ACTIVE_DEVICE"}}"#,
        );
        assert_eq!(
            body.to_string(),
            "Player command failed: No active device found (NO_ACTIVE_DEVICE)"
        );
    }
}
