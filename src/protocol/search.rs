//! `GET search` types.
//!
//! Only the first result of the requested type is ever used; there is no
//! ranking or caching.

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::error::Error;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum SearchKind {
    #[default]
    Track,
    Album,
    Artist,
    Playlist,
    Show,
    Episode,
}

impl SearchKind {
    /// Value of the `type` query parameter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
            Self::Show => "show",
            Self::Episode => "episode",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "track" => Ok(Self::Track),
            "album" => Ok(Self::Album),
            "artist" => Ok(Self::Artist),
            "playlist" => Ok(Self::Playlist),
            "show" | "podcast" => Ok(Self::Show),
            "episode" => Ok(Self::Episode),
            other => Err(Error::invalid_argument(format!(
                "unknown search type \"{other}\""
            ))),
        }
    }
}

/// Anything with a name and a URI.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Hit {
    pub name: String,
    pub uri: String,
}

/// Paging object. Items can be `null` for unavailable playlists.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<Option<Hit>>,
}

impl Page {
    fn first(&self) -> Option<&Hit> {
        self.items.iter().flatten().next()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub tracks: Option<Page>,
    #[serde(default)]
    pub albums: Option<Page>,
    #[serde(default)]
    pub artists: Option<Page>,
    #[serde(default)]
    pub playlists: Option<Page>,
    #[serde(default)]
    pub shows: Option<Page>,
    #[serde(default)]
    pub episodes: Option<Page>,
}

impl SearchResults {
    /// First result of `kind`, in provider order.
    #[must_use]
    pub fn first(&self, kind: SearchKind) -> Option<&Hit> {
        let page = match kind {
            SearchKind::Track => &self.tracks,
            SearchKind::Album => &self.albums,
            SearchKind::Artist => &self.artists,
            SearchKind::Playlist => &self.playlists,
            SearchKind::Show => &self.shows,
            SearchKind::Episode => &self.episodes,
        };
        page.as_ref().and_then(Page::first)
    }
}
