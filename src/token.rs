//! Persisted OAuth tokens.
//!
//! [`TokenStore`] is the only place the token record lives. It is written by
//! the authorization flow on first issuance and by the session on refresh,
//! always through an atomic replace.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use veil::Redact;

use crate::{
    config::Config,
    error::{Error, Result},
    fs,
};

/// Access and refresh token with absolute expiry.
#[serde_as]
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Redact)]
pub struct TokenRecord {
    #[redact]
    pub access_token: String,

    #[redact]
    pub refresh_token: String,

    /// Issuance time plus the server's `expires_in`, stored as Unix seconds.
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub expires_at: SystemTime,
}

impl TokenRecord {
    /// Longest lifetime accepted from the token endpoint.
    pub const MAX_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Creates a record expiring `expires_in` after `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if `expires_in` exceeds [`Self::MAX_LIFETIME`].
    pub fn issued(
        access_token: String,
        refresh_token: String,
        issued_at: SystemTime,
        expires_in: Duration,
    ) -> Result<Self> {
        let expires_at = Some(expires_in)
            .filter(|lifetime| *lifetime <= Self::MAX_LIFETIME)
            .and_then(|lifetime| issued_at.checked_add(lifetime))
            .ok_or_else(|| {
                Error::invalid_data(format!(
                    "token lifetime of {}s is out of range",
                    expires_in.as_secs()
                ))
            })?;

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Time left until expiry, zero when already expired.
    #[must_use]
    pub fn time_to_live(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Whether less than `margin` remains before expiry.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.time_to_live() < margin
    }
}

impl fmt::Display for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.access_token)
    }
}

#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::at(config.token_path())
    }

    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the current record, `None` when not logged in.
    pub fn load(&self) -> Result<Option<TokenRecord>> {
        fs::read_toml(&self.path)
    }

    /// Replaces the record atomically.
    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        fs::write_toml(&self.path, record)?;
        debug!(
            "stored access token valid for {}s",
            record.time_to_live().as_secs()
        );
        Ok(())
    }

    /// Forgets the record. Returns whether there was one.
    pub fn clear(&self) -> Result<bool> {
        fs::remove(&self.path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
