//! Player endpoints: devices, playback state, queue and command bodies.
//!
//! # Wire Format
//!
//! `GET me/player/devices`:
//! ```json
//! {
//!     "devices": [{
//!         "id": "5fbb3ba6aa454b5534c4ba43a8c7e8e45a63ad0e",
//!         "is_active": false,
//!         "is_private_session": false,
//!         "is_restricted": false,
//!         "name": "Kitchen Echo",
//!         "type": "Speaker",
//!         "volume_percent": 40
//!     }]
//! }
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A playback endpoint as reported by the Web API.
///
/// Never cached: every resolution fetches the live list.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize)]
pub struct Device {
    /// `None` for devices that cannot be addressed through the API.
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub is_restricted: bool,

    #[serde(default)]
    pub volume_percent: Option<u8>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)?;
        if self.is_active {
            write!(f, " [active]")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatState {
    #[default]
    Off,
    Track,
    Context,
}

impl fmt::Display for RepeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Track => write!(f, "track"),
            Self::Context => write!(f, "context"),
        }
    }
}

impl FromStr for RepeatState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "track" => Ok(Self::Track),
            "context" => Ok(Self::Context),
            other => Err(Error::invalid_argument(format!(
                "repeat state must be off, track or context, not \"{other}\""
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Album {
    pub name: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Show {
    pub name: String,
}

/// A track or an episode.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Item {
    pub name: String,

    pub uri: String,

    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub artists: Vec<Artist>,

    #[serde(default)]
    pub album: Option<Album>,

    /// Set for episodes.
    #[serde(default)]
    pub show: Option<Show>,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;

        let artists: Vec<_> = self.artists.iter().map(|a| a.name.as_str()).collect();
        if !artists.is_empty() {
            write!(f, " - {}", artists.join(", "))?;
        } else if let Some(show) = &self.show {
            write!(f, " - {}", show.name)?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Context {
    pub uri: String,

    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// `GET me/player`. The endpoint answers `204 No Content` when nothing is
/// playing, which the client maps to `None`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct PlaybackState {
    #[serde(default)]
    pub device: Option<Device>,

    #[serde(default)]
    pub repeat_state: Option<RepeatState>,

    #[serde(default)]
    pub shuffle_state: Option<bool>,

    #[serde(default)]
    pub context: Option<Context>,

    #[serde(default)]
    pub progress_ms: Option<u64>,

    #[serde(default)]
    pub is_playing: bool,

    #[serde(default)]
    pub item: Option<Item>,
}

/// `GET me/player/queue`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Queue {
    #[serde(default)]
    pub currently_playing: Option<Item>,

    #[serde(default)]
    pub queue: Vec<Item>,
}

/// Body of `PUT me/player/play`.
///
/// Collections (albums, playlists, artists, shows) are started as a context;
/// single tracks and episodes as a URI list.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Play {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_uri: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
}

impl Play {
    #[must_use]
    pub fn uri(uri: &str) -> Self {
        let uri = normalize_uri(uri);
        if is_single_item(&uri) {
            Self {
                context_uri: None,
                uris: vec![uri],
            }
        } else {
            Self {
                context_uri: Some(uri),
                uris: Vec::new(),
            }
        }
    }
}

/// Body of `PUT me/player`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Transfer {
    pub device_ids: Vec<String>,
    pub play: bool,
}

fn is_single_item(uri: &str) -> bool {
    uri.starts_with("spotify:track:") || uri.starts_with("spotify:episode:")
}

/// Turns `https://open.spotify.com/<type>/<id>?si=...` into
/// `spotify:<type>:<id>`. Anything else is returned as is.
#[must_use]
pub fn normalize_uri(uri: &str) -> String {
    let uri = uri.trim();
    let Some(path) = uri.strip_prefix("https://open.spotify.com/") else {
        return uri.to_owned();
    };

    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<_> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && !segment.starts_with("intl-"))
        .collect();

    match segments.as_slice() {
        [kind, id] => format!("spotify:{kind}:{id}"),
        _ => uri.to_owned(),
    }
}
