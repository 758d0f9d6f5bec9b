//! End-to-end authorization flow against a mock accounts service, with a
//! scripted "browser" hitting the loopback listener.

use std::{
    future,
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use url::Url;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use spotctl::{
    config::Config,
    credentials::Credentials,
    error::ErrorKind,
    fs,
    http::Client as HttpClient,
    oauth::{
        state::{OAuthState, StateStore},
        AuthorizationFlow, FlowState,
    },
    token::TokenStore,
};

struct Fixture {
    _dir: tempfile::TempDir,
    config: Config,
    server: MockServer,
}

fn free_port() -> u16 {
    let listener = StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let mut config = Config::with_config_dir(dir.path()).unwrap();
    config.token_url = Url::parse(&format!("{}/api/token", server.uri())).unwrap();
    config.redirect_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, free_port()));
    config.open_browser = false;

    Fixture {
        _dir: dir,
        config,
        server,
    }
}

fn credentials() -> spotctl::error::Result<Credentials> {
    Ok(Credentials {
        client_id: "client".into(),
        client_secret: "secret".into(),
    })
}

/// Waits for the flow to issue its state, then redirects to the callback
/// with the query built from the nonce.
async fn browser<Q>(config: &Config, query: Q) -> String
where
    Q: FnOnce(&str) -> String,
{
    let state_path = config.state_path();
    let state = loop {
        if let Ok(Some(state)) = fs::read_toml::<OAuthState>(&state_path) {
            break state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    let addr = config.redirect_addr;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /callback?{} HTTP/1.1\r\nHost: {addr}\r\n\r\n",
        query(&state.nonce)
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn login_stores_tokens_and_consumes_the_state() {
    let fixture = fixture().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=AQDcode"))
        .and(body_string_contains("client_secret=secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access",
            "token_type": "Bearer",
            "scope": "user-read-playback-state",
            "expires_in": 3600,
            "refresh_token": "refresh"
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let config = fixture.config.clone();
    let page = tokio::spawn(async move {
        browser(&config, |nonce| format!("code=AQDcode&state={nonce}")).await
    });

    let http_client = HttpClient::new(&fixture.config).unwrap();
    let mut flow = AuthorizationFlow::new(&fixture.config, &http_client);
    let record = flow
        .run(credentials, future::pending::<&str>())
        .await
        .unwrap();

    assert_eq!(flow.state(), FlowState::Complete);
    assert_eq!(record.access_token, "access");
    assert!(page.await.unwrap().starts_with("HTTP/1.1 200 OK"));

    let stored = TokenStore::new(&fixture.config).load().unwrap().unwrap();
    assert_eq!(stored.access_token, record.access_token);
    assert_eq!(stored.refresh_token, "refresh");
    assert!(stored.time_to_live() > Duration::from_secs(3500));
    assert!(!StateStore::new(&fixture.config).is_pending());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(fixture.config.token_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn forged_state_is_rejected_without_exchange() {
    let fixture = fixture().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fixture.server)
        .await;

    let config = fixture.config.clone();
    let page = tokio::spawn(async move {
        browser(&config, |nonce| {
            let mut forged = nonce.to_owned();
            let last = if forged.pop() == Some('a') { 'b' } else { 'a' };
            forged.push(last);
            format!("code=AQDcode&state={forged}")
        })
        .await
    });

    let http_client = HttpClient::new(&fixture.config).unwrap();
    let mut flow = AuthorizationFlow::new(&fixture.config, &http_client);
    let err = flow
        .run(credentials, future::pending::<&str>())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::CsrfStateMismatch);
    assert_eq!(flow.state(), FlowState::Error);
    // The browser still gets the same page; the verdict is on the terminal.
    assert!(page.await.unwrap().starts_with("HTTP/1.1 200 OK"));
    assert!(!StateStore::new(&fixture.config).is_pending());
    assert_eq!(TokenStore::new(&fixture.config).load().unwrap(), None);
}

#[tokio::test]
async fn denied_consent_is_reported() {
    let fixture = fixture().await;

    let config = fixture.config.clone();
    let page = tokio::spawn(async move {
        browser(&config, |nonce| format!("error=access_denied&state={nonce}")).await
    });

    let http_client = HttpClient::new(&fixture.config).unwrap();
    let mut flow = AuthorizationFlow::new(&fixture.config, &http_client);
    let err = flow
        .run(credentials, future::pending::<&str>())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::AuthorizationDenied);
    assert!(err.to_string().contains("access_denied"));
    page.await.unwrap();
    assert!(!StateStore::new(&fixture.config).is_pending());
}

#[tokio::test]
async fn cancellation_releases_the_port_and_discards_the_state() {
    let fixture = fixture().await;

    let http_client = HttpClient::new(&fixture.config).unwrap();
    let mut flow = AuthorizationFlow::new(&fixture.config, &http_client);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "test"
    };
    let err = flow.run(credentials, cancel).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert!(!StateStore::new(&fixture.config).is_pending());
    StdTcpListener::bind(fixture.config.redirect_addr).unwrap();
}

#[tokio::test]
async fn failed_exchange_is_token_exchange_failed() {
    let fixture = fixture().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid authorization code"
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let config = fixture.config.clone();
    let page = tokio::spawn(async move {
        browser(&config, |nonce| format!("code=stale&state={nonce}")).await
    });

    let http_client = HttpClient::new(&fixture.config).unwrap();
    let mut flow = AuthorizationFlow::new(&fixture.config, &http_client);
    let err = flow
        .run(credentials, future::pending::<&str>())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::TokenExchangeFailed);
    assert!(err.to_string().contains("invalid_grant"));
    page.await.unwrap();
    assert_eq!(TokenStore::new(&fixture.config).load().unwrap(), None);
}

#[tokio::test]
async fn absurd_token_lifetime_is_token_exchange_failed() {
    let fixture = fixture().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access",
            "token_type": "Bearer",
            "expires_in": u64::MAX,
            "refresh_token": "refresh"
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let config = fixture.config.clone();
    let page = tokio::spawn(async move {
        browser(&config, |nonce| format!("code=AQDcode&state={nonce}")).await
    });

    let http_client = HttpClient::new(&fixture.config).unwrap();
    let mut flow = AuthorizationFlow::new(&fixture.config, &http_client);
    let err = flow
        .run(credentials, future::pending::<&str>())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::TokenExchangeFailed);
    assert_eq!(flow.state(), FlowState::Error);
    page.await.unwrap();
    assert_eq!(TokenStore::new(&fixture.config).load().unwrap(), None);
}
