//! OAuth 2.0 authorization-code flow.
//!
//! [`AuthorizationFlow::run`] walks the states
//!
//! ```text
//! Idle -> AwaitingCredentials -> UrlIssued -> Listening -> CodeReceived -> Exchanging -> Complete
//! ```
//!
//! and falls into [`FlowState::Error`] from any of them. The only way out of
//! `Listening` besides a callback is cancellation, which releases the socket
//! and discards the pending state.
//!
//! The listening socket is bound before the URL is handed to the browser, so
//! a quick redirect cannot arrive before anyone is listening.
//!
//! # Submodules
//!
//! * [`callback`] - the one-shot redirect listener
//! * [`state`] - the single-use anti-CSRF nonce

pub mod callback;
pub mod state;

use std::{fmt, future::Future, time::SystemTime};

use reqwest::{header::HeaderValue, StatusCode};
use url::Url;

use crate::{
    config::Config,
    credentials::Credentials,
    error::{Error, ErrorKind, Result},
    http::Client as HttpClient,
    protocol::auth::{AuthError, Grant, Tokens},
    token::{TokenRecord, TokenStore},
};

use self::{
    callback::{Callback, Listener},
    state::StateStore,
};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum FlowState {
    #[default]
    Idle,
    AwaitingCredentials,
    UrlIssued,
    Listening,
    CodeReceived,
    Exchanging,
    Complete,
    Error,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingCredentials => "awaiting credentials",
            Self::UrlIssued => "url issued",
            Self::Listening => "listening",
            Self::CodeReceived => "code received",
            Self::Exchanging => "exchanging",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

pub struct AuthorizationFlow<'a> {
    config: &'a Config,
    http_client: &'a HttpClient,
    tokens: TokenStore,
    states: StateStore,
    state: FlowState,
}

impl<'a> AuthorizationFlow<'a> {
    #[must_use]
    pub fn new(config: &'a Config, http_client: &'a HttpClient) -> Self {
        Self {
            config,
            http_client,
            tokens: TokenStore::new(config),
            states: StateStore::new(config),
            state: FlowState::Idle,
        }
    }

    /// Current state of the flow.
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.state
    }

    fn transition(&mut self, next: FlowState) {
        debug!("authorization: {} -> {next}", self.state);
        self.state = next;
    }

    /// Runs the whole flow and stores the issued tokens.
    ///
    /// `credentials` is called once, on entering `AwaitingCredentials`.
    /// `cancel` aborts the flow while waiting for the browser; its output is
    /// logged as the reason.
    ///
    /// # Errors
    ///
    /// * `MissingCredentials` if `credentials` fails
    /// * `Unavailable` if the callback port cannot be bound
    /// * `Cancelled` if `cancel` completes first
    /// * `AuthorizationDenied` if the provider redirected with an error
    /// * `CsrfStateMismatch` if the callback state is not ours
    /// * `TokenExchangeFailed` if no access token was issued
    pub async fn run<C, F>(&mut self, credentials: C, cancel: F) -> Result<TokenRecord>
    where
        C: FnOnce() -> Result<Credentials>,
        F: Future,
        F::Output: fmt::Display,
    {
        let result = self.drive(credentials, cancel).await;
        if result.is_err() {
            self.transition(FlowState::Error);
        }
        result
    }

    async fn drive<C, F>(&mut self, credentials: C, cancel: F) -> Result<TokenRecord>
    where
        C: FnOnce() -> Result<Credentials>,
        F: Future,
        F::Output: fmt::Display,
    {
        self.transition(FlowState::AwaitingCredentials);
        let credentials = credentials()?;

        let listener = Listener::bind(self.config.redirect_addr, Config::REDIRECT_PATH).await?;

        let pending = self.states.issue()?;
        let url = authorization_url(self.config, &credentials, &pending.nonce);
        self.transition(FlowState::UrlIssued);
        self.present(&url);

        self.transition(FlowState::Listening);
        let callback = tokio::select! {
            callback = listener.accept() => callback,
            reason = cancel => {
                info!("authorization cancelled by {reason}");
                self.states.discard()?;
                return Err(Error::cancelled("stopped waiting for the authorization callback"));
            }
        };
        drop(listener);

        let callback = match callback {
            Ok(callback) => callback,
            Err(e) => {
                self.states.discard()?;
                return Err(e);
            }
        };

        let code = match callback {
            Callback::Error { error, description } => {
                // The nonce is single use even when the provider refused.
                self.states.discard()?;
                let reason = match description {
                    Some(description) => format!("{error}: {description}"),
                    None => error,
                };
                return Err(Error::authorization_denied(reason));
            }
            Callback::Code { code, state } => {
                self.transition(FlowState::CodeReceived);
                self.states.verify(&state)?;
                code
            }
        };

        self.transition(FlowState::Exchanging);
        let grant = Grant::AuthorizationCode {
            code,
            redirect_uri: self.config.redirect_uri(),
        };
        let issued_at = SystemTime::now();
        let tokens = request_tokens(
            self.http_client,
            &self.config.token_url,
            &credentials,
            &grant,
        )
        .await
        .map_err(|e| Error::token_exchange_failed(e.to_string()))?;

        let refresh_token = tokens.refresh_token.unwrap_or_else(|| {
            warn!(
                "no refresh token issued; you will need to log in again when the access token \
                 expires"
            );
            String::new()
        });
        let record = TokenRecord::issued(
            tokens.access_token,
            refresh_token,
            issued_at,
            tokens.expires_in,
        )
        .map_err(|e| Error::token_exchange_failed(e.to_string()))?;
        self.tokens.save(&record)?;

        self.transition(FlowState::Complete);
        Ok(record)
    }

    /// Opens `url` in the default browser, or prints it.
    fn present(&self, url: &Url) {
        if self.config.open_browser {
            match webbrowser::open(url.as_str()) {
                Ok(()) => {
                    info!("opened the authorization page in your browser");
                    eprintln!("If your browser did not open, visit:\n\n  {url}\n");
                    return;
                }
                Err(e) => debug!("could not open browser: {e}"),
            }
        }

        eprintln!("Open this URL in your browser to authorize spotctl:\n\n  {url}\n");
    }
}

/// Builds the authorization URL carrying `nonce` as `state`.
#[must_use]
pub fn authorization_url(config: &Config, credentials: &Credentials, nonce: &str) -> Url {
    let mut url = config.authorize_url.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &credentials.client_id)
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("redirect_uri", &config.redirect_uri())
        .append_pair("state", nonce);
    url
}

/// Calls the token endpoint with `grant`.
///
/// The response body is never logged: it carries the tokens.
///
/// # Errors
///
/// Returns error if the request fails, the endpoint answers with anything
/// but success, or the body carries no access token.
pub async fn request_tokens(
    http_client: &HttpClient,
    token_url: &Url,
    credentials: &Credentials,
    grant: &Grant,
) -> Result<Tokens> {
    let mut params = grant.params();
    params.push(("client_id", credentials.client_id.as_str()));
    params.push(("client_secret", credentials.client_secret.as_str()));

    let request = http_client
        .unlimited
        .post(token_url.clone())
        .form(&params)
        .build()?;

    debug!("requesting tokens with grant type {}", grant.kind());
    let response = http_client.execute(request).await?;
    let status = response.status();
    let body = response.text().await?;

    if status != StatusCode::OK {
        let detail = serde_json::from_str::<AuthError>(&body)
            .map_or_else(|_| format!("HTTP {status}"), |e| format!("HTTP {status}: {e}"));
        return Err(Error::new(ErrorKind::Api, detail));
    }

    let tokens: Tokens = serde_json::from_str(&body)
        .map_err(|e| Error::invalid_data(format!("unexpected token response: {e}")))?;
    if tokens.access_token.is_empty() || HeaderValue::from_str(&tokens.access_token).is_err() {
        return Err(Error::invalid_data("token response has no usable access token"));
    }

    trace!("token endpoint: {tokens:?}");
    Ok(tokens)
}
