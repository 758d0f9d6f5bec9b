//! Runtime configuration.
//!
//! [`Config`] gathers everything that is fixed for one process run: the
//! identity this client presents, the endpoints it talks to, where it keeps
//! its files and which scopes it asks for. Production values come from
//! [`Config::new`]; tests point the endpoints at a mock server instead.

use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use url::Url;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    pub user_agent: String,

    /// Provider page the user is sent to for consent.
    pub authorize_url: Url,
    /// Endpoint for code exchange and refresh.
    pub token_url: Url,
    /// Base of all Web API resources. Must end with a slash.
    pub api_base: Url,

    /// Loopback address of the one-shot callback listener.
    pub redirect_addr: SocketAddr,

    pub scopes: Vec<String>,

    /// Directory holding credentials, tokens and preferences.
    pub config_dir: PathBuf,

    /// Try the default browser before printing the authorization URL.
    pub open_browser: bool,
}

impl Config {
    /// Fixed loopback port registered as redirect URI with the provider.
    pub const REDIRECT_PORT: u16 = 8888;

    /// Path of the redirect URI on the callback listener.
    pub const REDIRECT_PATH: &'static str = "/callback";

    /// Environment variable overriding [`Config::default_config_dir`].
    pub const CONFIG_DIR_ENV: &'static str = "SPOTCTL_CONFIG_DIR";

    const AUTHORIZE_URL: &'static str = "https://accounts.spotify.com/authorize";
    const TOKEN_URL: &'static str = "https://accounts.spotify.com/api/token";
    const API_BASE: &'static str = "https://api.spotify.com/v1/";

    const SCOPES: [&'static str; 4] = [
        "user-read-playback-state",
        "user-modify-playback-state",
        "user-read-currently-playing",
        "playlist-read-private",
    ];

    /// Builds the production configuration.
    ///
    /// # Errors
    ///
    /// Will return `Err` if no configuration directory can be determined.
    pub fn new() -> Result<Self> {
        Self::with_config_dir(Self::default_config_dir()?)
    }

    /// Builds the production configuration around an explicit directory.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the application name or version cannot be used
    /// in a `User-Agent` header.
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            return Err(Error::internal(format!(
                "application name and/or version invalid (\"{app_name}\"; \"{app_version}\")"
            )));
        }

        let os_name = match env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.contains(illegal_chars))
            .unwrap_or_else(|| String::from("0"));

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,

            user_agent,

            authorize_url: Url::parse(Self::AUTHORIZE_URL)?,
            token_url: Url::parse(Self::TOKEN_URL)?,
            api_base: Url::parse(Self::API_BASE)?,

            redirect_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, Self::REDIRECT_PORT)),

            scopes: Self::SCOPES.iter().map(ToString::to_string).collect(),

            config_dir: config_dir.into(),

            open_browser: true,
        })
    }

    /// Per-user configuration directory.
    ///
    /// `SPOTCTL_CONFIG_DIR` wins; otherwise the platform configuration
    /// directory joined with the application name.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the platform has no configuration directory.
    pub fn default_config_dir() -> Result<PathBuf> {
        if let Some(dir) = env::var_os(Self::CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::config_dir()
            .map(|dir| dir.join(env!("CARGO_PKG_NAME")))
            .ok_or_else(|| Error::io("could not determine the configuration directory"))
    }

    /// The redirect URI registered with the provider.
    ///
    /// Always spelled with the numeric loopback address: the provider
    /// compares redirect URIs literally.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.redirect_addr, Self::REDIRECT_PATH)
    }

    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.config_dir.join("credentials.toml")
    }

    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.config_dir.join("token.toml")
    }

    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.config_dir.join("oauth_state.toml")
    }

    #[must_use]
    pub fn preferences_path(&self) -> PathBuf {
        self.config_dir.join("preferences.toml")
    }
}
