//! Wire types for the Spotify accounts service and Web API.
//!
//! Every endpoint gets an explicit response type with optional fields where
//! the API may omit them. Responses are decoded once, at the API client
//! boundary; the rest of the crate only handles typed values.
//!
//! # Submodules
//!
//! * [`auth`] - token endpoint responses
//! * [`error`] - error bodies, including rate-limit hints
//! * [`player`] - devices, playback state and queue
//! * [`search`] - search requests and results

pub mod auth;
pub mod error;
pub mod player;
pub mod search;

use std::fmt::Debug;

use serde::Deserialize;

use crate::error::Result;

/// Parses and logs JSON responses.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of API endpoint for logging
///
/// # Errors
///
/// Returns error if the body is not valid JSON or does not match `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error and raw text at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
