//! Single-use anti-CSRF state for one authorization attempt.
//!
//! The nonce is persisted before the authorization URL leaves the process
//! and deleted as soon as a callback has been compared against it, whatever
//! the outcome. A nonce is never compared twice.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use veil::Redact;

use crate::{
    config::Config,
    error::{Error, Result},
    fs,
};

#[serde_as]
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Redact)]
pub struct OAuthState {
    #[redact]
    pub nonce: String,

    #[serde_as(as = "TimestampSeconds<i64>")]
    pub created_at: SystemTime,
}

impl OAuthState {
    /// Length of generated nonces.
    pub const NONCE_LEN: usize = 32;

    /// Generates a fresh nonce from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let nonce = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::NONCE_LEN)
            .map(char::from)
            .collect();

        Self {
            nonce,
            created_at: SystemTime::now(),
        }
    }

    /// Byte-for-byte comparison that does not short-circuit on the first
    /// differing byte.
    #[must_use]
    pub fn matches(&self, received: &str) -> bool {
        let expected = self.nonce.as_bytes();
        let received = received.as_bytes();
        if expected.len() != received.len() {
            return false;
        }

        expected
            .iter()
            .zip(received)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// File-backed holder of the pending [`OAuthState`].
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::at(config.state_path())
    }

    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Generates and persists a new state, replacing any stale one.
    pub fn issue(&self) -> Result<OAuthState> {
        let state = OAuthState::generate();
        fs::write_toml(&self.path, &state)?;
        trace!("issued oauth state created at {:?}", state.created_at);
        Ok(state)
    }

    /// Compares `received` against the pending state and consumes it.
    ///
    /// The stored state is deleted before this returns, on success and on
    /// failure alike.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CsrfStateMismatch`](crate::error::ErrorKind) if
    /// there is no pending state or it differs from `received`.
    pub fn verify(&self, received: &str) -> Result<()> {
        let stored = fs::read_toml::<OAuthState>(&self.path);
        self.discard()?;

        match stored {
            Ok(Some(state)) if state.matches(received) => Ok(()),
            Ok(Some(_)) => Err(Error::csrf_state_mismatch(
                "callback state does not match the authorization request",
            )),
            Ok(None) => Err(Error::csrf_state_mismatch(
                "no authorization request is pending",
            )),
            Err(e) => Err(Error::csrf_state_mismatch(format!(
                "pending authorization state is unreadable: {e}"
            ))),
        }
    }

    /// Deletes any pending state.
    pub fn discard(&self) -> Result<()> {
        if fs::remove(&self.path)? {
            trace!("discarded oauth state");
        }
        Ok(())
    }

    /// Whether a state is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.path.exists()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
