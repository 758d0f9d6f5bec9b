//! Remote control of Spotify Connect devices through the Web API.
//!
//! [`Remote`] wraps the resilient [`api::Client`] with typed commands. Most
//! of them are thin: one request, one typed response. Two carry behavior of
//! their own:
//!
//! * [`Remote::resolve_device`] turns a user-supplied name fragment into a
//!   device id, matching case-insensitively against the live device list
//! * [`Remote::launch`] starts playback and, when the target device is
//!   asleep, wakes it with a transfer before trying once more
//!
//! # Waking Devices
//!
//! A device that has been idle for a while is still listed but no longer
//! accepts play commands, and the API answers 404. Transferring playback to
//! it wakes it up; after a short settle interval the play command succeeds.
//!
//! ```text
//! PUT me/player/play?device_id=X   -> 404
//! PUT me/player {device_ids: [X]}  -> 204
//! (wait 2 s)
//! PUT me/player/play?device_id=X   -> 204, or the final error
//! ```

use std::time::Duration;

use reqwest::Method;
use url::form_urlencoded;

use crate::{
    api,
    error::{Error, Result},
    protocol::{
        self,
        player::{
            normalize_uri, Device, Devices, PlaybackState, Play, Queue, RepeatState, Transfer,
        },
        search::{Hit, SearchKind, SearchResults},
    },
};

pub struct Remote {
    api: api::Client,
    settle: Duration,
}

impl Remote {
    /// How long a woken device gets before the play command is repeated.
    pub const SETTLE: Duration = Duration::from_secs(2);

    /// Highest accepted volume.
    pub const MAX_VOLUME: u8 = 100;

    #[must_use]
    pub fn new(api: api::Client) -> Self {
        Self {
            api,
            settle: Self::SETTLE,
        }
    }

    /// Overrides the settle interval after waking a device.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Lists the user's devices in provider order.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    pub async fn devices(&mut self) -> Result<Vec<Device>> {
        let body = self
            .api
            .invoke(Method::GET, "me/player/devices", None)
            .await?;
        let devices: Devices = protocol::json(&body, "devices")?;
        Ok(devices.devices)
    }

    /// Resolves a name fragment to the id of the first matching device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound`, listing every available device, if no
    /// addressable device name contains `fragment`.
    pub async fn resolve_device(&mut self, fragment: &str) -> Result<String> {
        let devices = self.devices().await?;
        let device = select(&devices, fragment)?;
        debug!("resolved \"{fragment}\" to {device}");

        device
            .id
            .clone()
            .ok_or_else(|| {
                Error::device_not_found(format!("{device} cannot be controlled remotely"))
            })
    }

    /// Starts playback of `uri`, waking `device_id` if it is asleep.
    ///
    /// Tracks and episodes are played as single items; albums, playlists,
    /// artists and shows as a context.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no device is active and none was given, or if
    /// the device did not wake up. Other errors as per [`api::Client::invoke`].
    pub async fn launch(&mut self, uri: &str, device_id: Option<&str>) -> Result<()> {
        let body = serde_json::to_string(&Play::uri(uri))?;

        match self.play(Some(body.clone()), device_id).await {
            Err(e) if e.is_not_found() => {
                let Some(device_id) = device_id else {
                    return Err(e);
                };

                info!("device is not responding; waking it up");
                self.transfer(device_id, true).await?;
                tokio::time::sleep(self.settle).await;

                self.play(Some(body), Some(device_id)).await
            }
            result => result,
        }
    }

    async fn play(&mut self, body: Option<String>, device_id: Option<&str>) -> Result<()> {
        let path = with_device("me/player/play", device_id, &[]);
        self.api.invoke(Method::PUT, &path, body).await.map(drop)
    }

    /// Current playback, `None` when nothing is playing anywhere.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    pub async fn playback(&mut self) -> Result<Option<PlaybackState>> {
        let body = self.api.invoke(Method::GET, "me/player", None).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        protocol::json(&body, "playback state").map(Some)
    }

    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    pub async fn queue(&mut self) -> Result<Queue> {
        let body = self
            .api
            .invoke(Method::GET, "me/player/queue", None)
            .await?;
        protocol::json(&body, "queue")
    }

    /// Resumes the current context.
    ///
    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn resume(&mut self, device_id: Option<&str>) -> Result<()> {
        self.play(None, device_id).await
    }

    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn pause(&mut self, device_id: Option<&str>) -> Result<()> {
        self.command(Method::PUT, "me/player/pause", device_id, &[])
            .await
    }

    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn next(&mut self, device_id: Option<&str>) -> Result<()> {
        self.command(Method::POST, "me/player/next", device_id, &[])
            .await
    }

    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn previous(&mut self, device_id: Option<&str>) -> Result<()> {
        self.command(Method::POST, "me/player/previous", device_id, &[])
            .await
    }

    /// Seeks to `position` in the current item.
    ///
    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn seek(&mut self, position: Duration, device_id: Option<&str>) -> Result<()> {
        let position_ms = position.as_millis().to_string();
        self.command(
            Method::PUT,
            "me/player/seek",
            device_id,
            &[("position_ms", position_ms.as_str())],
        )
        .await
    }

    /// Sets the volume in percent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` without sending anything if `percent` is
    /// above [`Self::MAX_VOLUME`].
    pub async fn volume(&mut self, percent: u8, device_id: Option<&str>) -> Result<()> {
        if percent > Self::MAX_VOLUME {
            return Err(Error::invalid_argument(format!(
                "volume must be between 0 and {}, not {percent}",
                Self::MAX_VOLUME
            )));
        }

        let percent = percent.to_string();
        self.command(
            Method::PUT,
            "me/player/volume",
            device_id,
            &[("volume_percent", percent.as_str())],
        )
        .await
    }

    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn shuffle(&mut self, enabled: bool, device_id: Option<&str>) -> Result<()> {
        let state = enabled.to_string();
        self.command(
            Method::PUT,
            "me/player/shuffle",
            device_id,
            &[("state", state.as_str())],
        )
        .await
    }

    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn repeat(&mut self, state: RepeatState, device_id: Option<&str>) -> Result<()> {
        let state = state.to_string();
        self.command(
            Method::PUT,
            "me/player/repeat",
            device_id,
            &[("state", state.as_str())],
        )
        .await
    }

    /// Moves playback to `device_id`, starting it if `play` is set.
    ///
    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn transfer(&mut self, device_id: &str, play: bool) -> Result<()> {
        let body = serde_json::to_string(&Transfer {
            device_ids: vec![device_id.to_owned()],
            play,
        })?;
        self.api
            .invoke(Method::PUT, "me/player", Some(body))
            .await
            .map(drop)
    }

    /// Appends a track or episode to the queue.
    ///
    /// # Errors
    ///
    /// As per [`api::Client::invoke`].
    pub async fn add_to_queue(&mut self, uri: &str, device_id: Option<&str>) -> Result<()> {
        let uri = normalize_uri(uri);
        self.command(Method::POST, "me/player/queue", device_id, &[("uri", uri.as_str())])
            .await
    }

    /// First search result of `kind` for `query`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there are no results.
    pub async fn search(&mut self, kind: SearchKind, query: &str) -> Result<Hit> {
        let path = with_query(
            "search",
            &[("q", query), ("type", kind.as_str()), ("limit", "1")],
        );
        let body = self.api.invoke(Method::GET, &path, None).await?;
        let results: SearchResults = protocol::json(&body, "search")?;

        results
            .first(kind)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no {kind} matches \"{query}\"")))
    }

    async fn command(
        &mut self,
        method: Method,
        path: &str,
        device_id: Option<&str>,
        pairs: &[(&str, &str)],
    ) -> Result<()> {
        let path = with_device(path, device_id, pairs);
        self.api.invoke(method, &path, None).await.map(drop)
    }
}

/// Picks the first device whose name contains `fragment`, ignoring case.
///
/// # Errors
///
/// Returns `DeviceNotFound` listing all of `devices` if none matches.
pub fn select<'a>(devices: &'a [Device], fragment: &str) -> Result<&'a Device> {
    let needle = fragment.trim().to_lowercase();

    devices
        .iter()
        .find(|device| device.name.to_lowercase().contains(&needle))
        .ok_or_else(|| {
            let available = if devices.is_empty() {
                String::from("no devices available; open Spotify on one of your devices")
            } else {
                let names: Vec<_> = devices.iter().map(ToString::to_string).collect();
                format!("available: {}", names.join(", "))
            };
            Error::device_not_found(format!("no device matches \"{fragment}\"; {available}"))
        })
}

fn with_device<'a>(
    path: &str,
    device_id: Option<&'a str>,
    pairs: &[(&'a str, &'a str)],
) -> String {
    let mut all = pairs.to_vec();
    if let Some(device_id) = device_id {
        all.push(("device_id", device_id));
    }
    with_query(path, &all)
}

fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return path.to_owned();
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    format!("{path}?{query}")
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use serde_json::json;
    use url::Url;
    use wiremock::{
        matchers::{body_json, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{
        config::Config,
        credentials::Credentials,
        error::ErrorKind,
        http::Client as HttpClient,
        session::Session,
        token::{TokenRecord, TokenStore},
    };

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: Some(id.into()),
            name: name.into(),
            kind: "Speaker".into(),
            ..Device::default()
        }
    }

    #[test]
    fn fragment_matches_case_insensitively_in_order() {
        let devices = [
            device("1", "Living Room"),
            device("2", "Kitchen Echo"),
            device("3", "Kitchen Radio"),
        ];
        assert_eq!(select(&devices, "kitchen").unwrap().id.as_deref(), Some("2"));
        assert_eq!(select(&devices, "RADIO").unwrap().id.as_deref(), Some("3"));
    }

    #[test]
    fn no_match_lists_every_device() {
        let devices = [device("1", "Living Room"), device("2", "Kitchen Echo")];
        let err = select(&devices, "garage").unwrap_err();

        assert_eq!(err.kind, ErrorKind::DeviceNotFound);
        let message = err.to_string();
        assert!(message.contains("Living Room (Speaker)"));
        assert!(message.contains("Kitchen Echo (Speaker)"));
    }

    #[test]
    fn queries_are_encoded() {
        assert_eq!(
            with_device("me/player/play", Some("abc"), &[]),
            "me/player/play?device_id=abc"
        );
        assert_eq!(
            with_query("search", &[("q", "daft punk"), ("type", "album")]),
            "search?q=daft+punk&type=album"
        );
        assert_eq!(with_device("me/player/pause", None, &[]), "me/player/pause");
    }

    async fn remote(server: &MockServer, dir: &tempfile::TempDir) -> Remote {
        let mut config = Config::with_config_dir(dir.path()).unwrap();
        config.api_base = Url::parse(&format!("{}/v1/", server.uri())).unwrap();

        TokenStore::new(&config)
            .save(&TokenRecord::issued(
                "access".into(),
                "refresh".into(),
                SystemTime::now(),
                Duration::from_secs(3600),
            )
            .unwrap())
            .unwrap();

        let session = Session::new(&config).with_credentials(Credentials {
            client_id: "client".into(),
            client_secret: "secret".into(),
        });
        let api = api::Client::new(&config, HttpClient::new(&config).unwrap(), session)
            .with_backoff_base(Duration::from_millis(10));
        Remote::new(api).with_settle(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn resolve_device_uses_the_live_list() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/v1/me/player/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "devices": [
                    { "id": "a1", "name": "Desktop", "type": "Computer", "is_active": true },
                    { "id": "k1", "name": "Kitchen Echo", "type": "Speaker" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut remote = remote(&server, &dir).await;
        assert_eq!(remote.resolve_device("kitchen").await.unwrap(), "k1");
    }

    #[tokio::test]
    async fn sleeping_device_is_woken_once() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("PUT"))
            .and(path("/v1/me/player/play"))
            .and(query_param("device_id", "k1"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player"))
            .and(body_json(json!({ "device_ids": ["k1"], "play": true })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player/play"))
            .and(body_json(json!({ "context_uri": "spotify:album:xyz" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut remote = remote(&server, &dir).await;
        remote
            .launch("https://open.spotify.com/album/xyz?si=1", Some("k1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn second_not_found_is_final() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("PUT"))
            .and(path("/v1/me/player/play"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "status": 404,
                    "message": "Device not found",
                    "reason": "NO_ACTIVE_DEVICE"
                }
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut remote = remote(&server, &dir).await;
        let err = remote
            .launch("spotify:track:abc", Some("k1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn not_found_without_device_is_not_retried() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("PUT"))
            .and(path("/v1/me/player/play"))
            .and(body_json(json!({ "uris": ["spotify:track:abc"] })))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let mut remote = remote(&server, &dir).await;
        let err = remote.launch("spotify:track:abc", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn volume_above_maximum_is_rejected_locally() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("PUT"))
            .and(path("/v1/me/player/volume"))
            .and(query_param("volume_percent", "40"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut remote = remote(&server, &dir).await;
        let err = remote.volume(101, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        remote.volume(40, None).await.unwrap();
    }

    #[tokio::test]
    async fn empty_playback_is_none() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/v1/me/player"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut remote = remote(&server, &dir).await;
        assert_eq!(remote.playback().await.unwrap(), None);
    }

    #[tokio::test]
    async fn search_returns_the_first_hit_or_not_found() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("q", "discovery"))
            .and(query_param("type", "album"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "albums": { "items": [{ "name": "Discovery", "uri": "spotify:album:2nL" }] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("q", "nothing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tracks": { "items": [] }
            })))
            .mount(&server)
            .await;

        let mut remote = remote(&server, &dir).await;
        let hit = remote
            .search(SearchKind::Album, "discovery")
            .await
            .unwrap();
        assert_eq!(hit.uri, "spotify:album:2nL");

        let err = remote
            .search(SearchKind::Track, "nothing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
