//! Access token lifetime for one command.
//!
//! A [`Session`] is created per command and handed to the API client by
//! value. It reads the token record from disk at most once, refreshes it at
//! most once when it is about to expire, and writes the refreshed record
//! back atomically. It never starts a new authorization on its own: a failed
//! refresh tells the user to log in again.

use std::time::{Duration, SystemTime};

use url::Url;

use crate::{
    config::Config,
    credentials::{CredentialStore, Credentials},
    error::{Error, Result},
    http::Client as HttpClient,
    oauth,
    protocol::auth::Grant,
    token::{TokenRecord, TokenStore},
};

#[derive(Debug)]
pub struct Session {
    store: TokenStore,
    credential_store: CredentialStore,
    credentials: Option<Credentials>,
    record: Option<TokenRecord>,
    token_url: Url,
}

impl Session {
    /// Refresh when less than this remains before expiry.
    pub const REFRESH_MARGIN: Duration = Duration::from_secs(300);

    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            store: TokenStore::new(config),
            credential_store: CredentialStore::new(config),
            credentials: None,
            record: None,
            token_url: config.token_url.clone(),
        }
    }

    /// Uses `credentials` for refreshing instead of resolving them on
    /// demand.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Returns an access token that is valid for at least
    /// [`Self::REFRESH_MARGIN`], refreshing it first if needed.
    ///
    /// # Errors
    ///
    /// * `NotAuthenticated` if there is no token record
    /// * `RefreshFailed` if the token endpoint did not issue a new token
    /// * `Io` if the refreshed record cannot be stored
    pub async fn valid_token(&mut self, http_client: &HttpClient) -> Result<String> {
        let record = match self.record.take() {
            Some(record) => record,
            None => self.store.load()?.ok_or_else(|| {
                Error::not_authenticated(format!(
                    "no token record at {}",
                    self.store.path().display()
                ))
            })?,
        };

        let record = if record.expires_within(Self::REFRESH_MARGIN) {
            debug!(
                "access token expires in {}s; refreshing",
                record.time_to_live().as_secs()
            );
            match self.refresh(http_client, &record).await {
                Ok(renewed) => renewed,
                Err(e) => {
                    self.record = Some(record);
                    return Err(e);
                }
            }
        } else {
            record
        };

        let access_token = record.access_token.clone();
        self.record = Some(record);
        Ok(access_token)
    }

    async fn refresh(
        &mut self,
        http_client: &HttpClient,
        record: &TokenRecord,
    ) -> Result<TokenRecord> {
        if record.refresh_token.is_empty() {
            return Err(Error::refresh_failed("no refresh token stored"));
        }

        let credentials = match &self.credentials {
            Some(credentials) => credentials.clone(),
            None => {
                let credentials = self
                    .credential_store
                    .load_stored()
                    .map_err(|e| Error::refresh_failed(e.to_string()))?;
                self.credentials = Some(credentials.clone());
                credentials
            }
        };

        let grant = Grant::RefreshToken {
            refresh_token: record.refresh_token.clone(),
        };
        let issued_at = SystemTime::now();
        let tokens = oauth::request_tokens(http_client, &self.token_url, &credentials, &grant)
            .await
            .map_err(|e| Error::refresh_failed(e.to_string()))?;

        // Only replaced when the accounts service rotates it.
        let refresh_token = tokens
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| record.refresh_token.clone());

        let renewed = TokenRecord::issued(
            tokens.access_token,
            refresh_token,
            issued_at,
            tokens.expires_in,
        )
        .map_err(|e| Error::refresh_failed(e.to_string()))?;
        self.store.save(&renewed)?;
        info!("refreshed access token");

        Ok(renewed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::error::ErrorKind;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        http_client: HttpClient,
        server: MockServer,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        let mut config = Config::with_config_dir(dir.path()).unwrap();
        config.token_url = Url::parse(&format!("{}/api/token", server.uri())).unwrap();
        let http_client = HttpClient::new(&config).unwrap();

        Fixture {
            _dir: dir,
            config,
            http_client,
            server,
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "client".into(),
            client_secret: "secret".into(),
        }
    }

    fn store_record(config: &Config, expires_in: Duration) {
        let record = TokenRecord::issued(
            "old-access".into(),
            "old-refresh".into(),
            SystemTime::now(),
            expires_in,
        )
        .unwrap();
        TokenStore::new(config).save(&record).unwrap();
    }

    #[tokio::test]
    async fn missing_record_is_not_authenticated() {
        let fixture = fixture().await;
        let mut session = Session::new(&fixture.config).with_credentials(credentials());

        let err = session
            .valid_token(&fixture.http_client)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotAuthenticated);
    }

    #[tokio::test]
    async fn fresh_token_is_not_refreshed() {
        let fixture = fixture().await;
        store_record(&fixture.config, Duration::from_secs(3600));

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&fixture.server)
            .await;

        let mut session = Session::new(&fixture.config).with_credentials(credentials());
        let token = session.valid_token(&fixture.http_client).await.unwrap();
        assert_eq!(token, "old-access");
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_once_and_keeps_its_refresh_token() {
        let fixture = fixture().await;
        store_record(&fixture.config, Duration::from_secs(60));

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .and(body_string_contains("client_id=client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&fixture.server)
            .await;

        let mut session = Session::new(&fixture.config).with_credentials(credentials());
        assert_eq!(
            session.valid_token(&fixture.http_client).await.unwrap(),
            "new-access"
        );
        // Cached and fresh now: no second refresh.
        assert_eq!(
            session.valid_token(&fixture.http_client).await.unwrap(),
            "new-access"
        );

        let stored = TokenStore::new(&fixture.config).load().unwrap().unwrap();
        assert_eq!(stored.access_token, "new-access");
        assert_eq!(stored.refresh_token, "old-refresh");
        assert!(!stored.expires_within(Session::REFRESH_MARGIN));
    }

    #[tokio::test]
    async fn rotated_refresh_token_replaces_the_stored_one() {
        let fixture = fixture().await;
        store_record(&fixture.config, Duration::ZERO);

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "expires_in": 3600,
                "refresh_token": "new-refresh"
            })))
            .expect(1)
            .mount(&fixture.server)
            .await;

        let mut session = Session::new(&fixture.config).with_credentials(credentials());
        session.valid_token(&fixture.http_client).await.unwrap();

        let stored = TokenStore::new(&fixture.config).load().unwrap().unwrap();
        assert_eq!(stored.refresh_token, "new-refresh");
    }

    #[tokio::test]
    async fn rejected_refresh_is_refresh_failed() {
        let fixture = fixture().await;
        store_record(&fixture.config, Duration::from_secs(10));

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Refresh token revoked"
            })))
            .expect(1)
            .mount(&fixture.server)
            .await;

        let mut session = Session::new(&fixture.config).with_credentials(credentials());
        let err = session
            .valid_token(&fixture.http_client)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RefreshFailed);

        let stored = TokenStore::new(&fixture.config).load().unwrap().unwrap();
        assert_eq!(stored.access_token, "old-access");
    }

    #[tokio::test]
    async fn missing_credentials_fail_the_refresh_without_prompting() {
        let fixture = fixture().await;
        store_record(&fixture.config, Duration::ZERO);

        let mut session = Session::new(&fixture.config);
        let err = session
            .valid_token(&fixture.http_client)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RefreshFailed);
    }

    #[tokio::test]
    async fn absurd_lifetime_is_refresh_failed() {
        let fixture = fixture().await;
        store_record(&fixture.config, Duration::ZERO);

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "expires_in": u64::MAX
            })))
            .expect(1)
            .mount(&fixture.server)
            .await;

        let mut session = Session::new(&fixture.config).with_credentials(credentials());
        let err = session
            .valid_token(&fixture.http_client)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RefreshFailed);

        let stored = TokenStore::new(&fixture.config).load().unwrap().unwrap();
        assert_eq!(stored.access_token, "old-access");
    }
}
