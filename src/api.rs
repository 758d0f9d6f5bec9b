//! Resilient Web API client.
//!
//! [`Client::invoke`] sends one logical request and turns every response
//! into either a body or a classified [`Error`]:
//!
//! | Status            | Outcome                                             |
//! |-------------------|-----------------------------------------------------|
//! | 200, 201, 202, 204| body, possibly empty                                |
//! | 429               | wait `retry_after`, retry without spending an attempt |
//! | 401               | `Unauthorized`                                      |
//! | 403               | `Forbidden`                                         |
//! | 404               | `NotFound`, left to the caller to interpret         |
//! | anything else     | exponential backoff, then `Api(status)`             |
//!
//! Connection failures and timeouts count as "anything else". A fresh
//! bearer token is requested from the [`Session`] before every attempt, so a
//! refresh that becomes due mid-retry is honored.

use std::time::Duration;

use exponential_backoff::Backoff;
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER},
    Method, StatusCode,
};
use url::Url;

use crate::{
    config::Config,
    error::{Error, ErrorKind, Result},
    http::Client as HttpClient,
    protocol::error::ErrorBody,
    session::Session,
};

/// What to do after one attempt.
#[derive(Debug)]
pub enum Verdict {
    /// Return the body.
    Done(String),
    /// Sleep, then retry without spending an attempt.
    Wait(Duration),
    /// Back off, then retry while attempts remain.
    Retry(Error),
    /// Give up.
    Fail(Error),
}

/// Classifies a completed response.
#[must_use]
pub fn classify(status: StatusCode, headers: &HeaderMap, body: String) -> Verdict {
    match status {
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
            Verdict::Done(body)
        }

        StatusCode::TOO_MANY_REQUESTS => Verdict::Wait(retry_after(headers, &body)),

        StatusCode::UNAUTHORIZED => {
            Verdict::Fail(Error::unauthorized(ErrorBody::parse(&body).to_string()))
        }
        StatusCode::FORBIDDEN => {
            Verdict::Fail(Error::forbidden(ErrorBody::parse(&body).to_string()))
        }
        StatusCode::NOT_FOUND => {
            Verdict::Fail(Error::not_found(ErrorBody::parse(&body).to_string()))
        }

        status => {
            let detail = ErrorBody::parse(&body);
            if detail.error.is_some() {
                debug!("{status}: {detail}");
            }
            Verdict::Retry(Error::api(status))
        }
    }
}

/// How long a 429 asks us to wait.
///
/// The body's `retry_after` wins over the `Retry-After` header; with neither
/// we wait [`Client::DEFAULT_RETRY_AFTER`].
#[must_use]
pub fn retry_after(headers: &HeaderMap, body: &str) -> Duration {
    if let Some(wait) = ErrorBody::parse(body).retry_after {
        return wait;
    }

    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map_or(Client::DEFAULT_RETRY_AFTER, Duration::from_secs)
}

pub struct Client {
    http_client: HttpClient,
    session: Session,
    api_base: Url,
    backoff_base: Duration,
}

impl Client {
    /// Attempts per call for retryable failures. Rate-limit waits do not
    /// count.
    pub const MAX_ATTEMPTS: u32 = 3;

    /// First backoff delay; doubles on every further failure.
    pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

    /// Upper bound of a single backoff delay.
    const BACKOFF_MAX: Duration = Duration::from_secs(8);

    /// Rate-limit waits per call before giving up.
    pub const MAX_RATE_LIMIT_WAITS: u32 = 10;

    /// Wait when a 429 carries no hint.
    pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

    #[must_use]
    pub fn new(config: &Config, http_client: HttpClient, session: Session) -> Self {
        Self {
            http_client,
            session,
            api_base: config.api_base.clone(),
            backoff_base: Self::BACKOFF_BASE,
        }
    }

    /// Overrides the first backoff delay.
    #[must_use]
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Resolves `path` against the API base. `path` may carry a query.
    ///
    /// # Errors
    ///
    /// Returns error if `path` does not form a valid URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.api_base.join(path).map_err(Into::into)
    }

    /// Sends one logical request, retrying as described in the module
    /// documentation.
    ///
    /// `body` is sent as JSON.
    ///
    /// # Errors
    ///
    /// * `NotAuthenticated` or `RefreshFailed` from the session
    /// * `Unauthorized`, `Forbidden` or `NotFound` per status
    /// * `RateLimited` after [`Self::MAX_RATE_LIMIT_WAITS`] waits
    /// * `Api` or `Unavailable` after [`Self::MAX_ATTEMPTS`] attempts
    pub async fn invoke(
        &mut self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<String> {
        let url = self.url(path)?;

        let mut delays =
            Backoff::new(Self::MAX_ATTEMPTS, self.backoff_base, Self::BACKOFF_MAX).into_iter();
        let mut attempts = 0;
        let mut rate_limit_waits = 0;

        loop {
            let verdict = match self.attempt(&method, &url, body.as_deref()).await {
                Ok(verdict) => verdict,
                Err(e) if e.kind == ErrorKind::Unavailable => Verdict::Retry(e),
                Err(e) => return Err(e),
            };

            match verdict {
                Verdict::Done(body) => return Ok(body),
                Verdict::Fail(e) => {
                    debug!("{method} {path}: {e}");
                    return Err(e);
                }

                Verdict::Wait(wait) => {
                    rate_limit_waits += 1;
                    if rate_limit_waits > Self::MAX_RATE_LIMIT_WAITS {
                        return Err(Error::rate_limited(format!(
                            "{method} {path} still rate limited after {} waits",
                            Self::MAX_RATE_LIMIT_WAITS
                        )));
                    }
                    warn!(
                        "rate limited; retrying {method} {path} in {}s",
                        wait.as_secs_f32()
                    );
                    tokio::time::sleep(wait).await;
                }

                Verdict::Retry(e) => {
                    attempts += 1;
                    if attempts >= Self::MAX_ATTEMPTS {
                        debug!("{method} {path} failed after {attempts} attempts: {e}");
                        return Err(e);
                    }
                    let delay = delays
                        .next()
                        .flatten()
                        .unwrap_or(self.backoff_base * 2u32.pow(attempts - 1));
                    warn!(
                        "{method} {path} failed ({e}); retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &mut self,
        method: &Method,
        url: &Url,
        body: Option<&str>,
    ) -> Result<Verdict> {
        let access_token = self.session.valid_token(&self.http_client).await?;

        let mut request = self
            .http_client
            .unlimited
            .request(method.clone(), url.clone())
            .bearer_auth(access_token);
        request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_owned()),
            // Sends `Content-Length: 0` on bodiless writes, which the API
            // requires.
            None if *method != Method::GET => request.body(""),
            None => request,
        };

        let response = self.http_client.execute(request.build()?).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!("{method} {}: {status}", url.path());

        Ok(classify(status, &headers, body))
    }
}
