//! User preferences that outlive a single command.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{config::Config, error::Result, fs};

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Preferences {
    /// Name fragment of the device to play on when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_device: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.preferences_path(),
        }
    }

    /// Reads the preferences, defaults when there are none yet.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Preferences> {
        Ok(fs::read_toml(&self.path)?.unwrap_or_default())
    }

    /// # Errors
    ///
    /// Will return `Err` if the file cannot be written.
    pub fn save(&self, preferences: &Preferences) -> Result<()> {
        fs::write_toml(&self.path, preferences)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
