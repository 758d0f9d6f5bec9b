//! Client identity registered with the provider.
//!
//! [`CredentialStore::load`] resolves the client id and secret from, in order
//! of precedence:
//!
//! 1. the `SPOTIFY_CLIENT_ID` and `SPOTIFY_CLIENT_SECRET` environment
//!    variables
//! 2. `credentials.toml` in the configuration directory
//! 3. an interactive prompt
//!
//! Sources are merged field by field. Whatever the prompt supplies is written
//! back to `credentials.toml` (owner-only) so the next run does not ask again.

use std::{
    env,
    io::{self, BufRead, Write},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};
use veil::Redact;

use crate::{
    config::Config,
    error::{Error, Result},
    fs,
};

/// Client id and secret of the registered application.
///
/// The secret is redacted from `Debug` output, so logging a `Credentials`
/// never leaks it.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Redact)]
pub struct Credentials {
    pub client_id: String,

    #[redact]
    pub client_secret: String,
}

/// Credentials as found in a single source, possibly incomplete.
#[derive(Clone, Default, Eq, PartialEq, Serialize, Deserialize, Redact)]
pub struct PartialCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[redact]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl PartialCredentials {
    pub const CLIENT_ID_ENV: &'static str = "SPOTIFY_CLIENT_ID";
    pub const CLIENT_SECRET_ENV: &'static str = "SPOTIFY_CLIENT_SECRET";

    /// Reads the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |key: &str| {
            env::var(key)
                .ok()
                .filter(|value: &String| !value.trim().is_empty())
        };
        Self {
            client_id: var(Self::CLIENT_ID_ENV),
            client_secret: var(Self::CLIENT_SECRET_ENV),
        }
    }

    /// Fills fields that are still missing from `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            client_id: self.client_id.or(other.client_id),
            client_secret: self.client_secret.or(other.client_secret),
        }
    }

    fn is_complete(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    fn normalized(self) -> Self {
        let keep = |value: Option<String>| {
            value
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        Self {
            client_id: keep(self.client_id),
            client_secret: keep(self.client_secret),
        }
    }
}

impl TryFrom<PartialCredentials> for Credentials {
    type Error = Error;

    fn try_from(partial: PartialCredentials) -> Result<Self> {
        match partial.normalized() {
            PartialCredentials {
                client_id: Some(client_id),
                client_secret: Some(client_secret),
            } => Ok(Self {
                client_id,
                client_secret,
            }),
            PartialCredentials { client_id, .. } => Err(Error::missing_credentials(
                if client_id.is_none() {
                    "client id is empty"
                } else {
                    "client secret is empty"
                },
            )),
        }
    }
}

/// Source of interactive answers.
pub trait Prompt {
    /// Asks `question` and returns the answer without the line terminator.
    fn ask(&mut self, question: &str) -> io::Result<String>;
}

/// Prompts on standard error and reads standard input.
#[derive(Debug, Default)]
pub struct Terminal;

impl Prompt for Terminal {
    fn ask(&mut self, question: &str) -> io::Result<String> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{question}: ")?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim_end_matches(['\r', '\n']).to_owned())
    }
}

#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.credentials_path(),
        }
    }

    /// Resolves credentials from the environment, the file and the terminal.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file is unreadable or the credentials are
    /// still incomplete after prompting.
    pub fn load(&self) -> Result<Credentials> {
        self.load_with(PartialCredentials::from_env(), &mut Terminal)
    }

    /// Resolves credentials with an explicit environment and prompt.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file is unreadable, prompting fails, or the
    /// credentials are still incomplete after prompting.
    pub fn load_with<P>(
        &self,
        from_env: PartialCredentials,
        prompt: &mut P,
    ) -> Result<Credentials>
    where
        P: Prompt + ?Sized,
    {
        let partial = self.resolve(from_env)?;
        if partial.is_complete() {
            debug!("using client id {:?}", partial.client_id);
            return Credentials::try_from(partial);
        }

        info!(
            "no client credentials found; create an app at https://developer.spotify.com/dashboard"
        );
        let mut prompted = PartialCredentials::default();
        if partial.client_id.is_none() {
            prompted.client_id = Some(prompt.ask("Client ID")?);
        }
        if partial.client_secret.is_none() {
            prompted.client_secret = Some(prompt.ask("Client secret")?);
        }

        let credentials = Credentials::try_from(partial.or(prompted))?;
        self.save(&credentials)?;
        info!("saved client credentials to {}", self.path.display());

        Ok(credentials)
    }

    /// Resolves credentials from the environment and the file only.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file is unreadable or the credentials are
    /// incomplete.
    pub fn load_stored(&self) -> Result<Credentials> {
        self.load_stored_with(PartialCredentials::from_env())
    }

    /// Like [`Self::load_stored`] with an explicit environment.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file is unreadable or the credentials are
    /// incomplete.
    pub fn load_stored_with(&self, from_env: PartialCredentials) -> Result<Credentials> {
        Credentials::try_from(self.resolve(from_env)?)
    }

    fn resolve(&self, from_env: PartialCredentials) -> Result<PartialCredentials> {
        let partial = from_env.normalized();
        if partial.is_complete() {
            return Ok(partial);
        }

        let from_file = fs::read_toml::<PartialCredentials>(&self.path)?.unwrap_or_default();
        Ok(partial.or(from_file.normalized()))
    }

    /// Persists `credentials` owner-only.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file cannot be written.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        fs::write_toml(&self.path, credentials)
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
