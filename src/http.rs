//! HTTP client with local rate limiting for the Spotify endpoints.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request throttling so a runaway loop cannot hammer the service
//! * Consistent timeouts and headers
//!
//! # Rate Limiting
//!
//! The Web API computes its limit over a rolling 30-second window and does
//! not publish it. Locally we stay well below by allowing:
//! * 50 calls per 5-second interval
//! * Bursts up to the maximum calls per interval
//! * Delaying requests that would exceed the limit
//!
//! Server-side 429 responses are handled one level up, in [`crate::api`].
//!
//! # Example
//!
//! ```rust
//! use spotctl::http::Client;
//!
//! let client = Client::new(&config)?;
//! let request = client.unlimited.get(url).build()?;
//! let response = client.execute(request).await?;
//! ```

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    header::{HeaderMap, HeaderValue, ACCEPT},
};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Unlimited request client for building requests.
    ///
    /// Requests built on it should still be sent through [`Client::execute`].
    pub unlimited: reqwest::Client,

    /// Rate limiter for local quota compliance.
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Interval of the local rate limit.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Maximum calls per interval.
    ///
    /// Requests beyond this limit will be automatically delayed.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for the connection to be established.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Duration to wait for a whole request to complete.
    ///
    /// Player commands are small; anything slower than this is treated as a
    /// transient failure and retried.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * HTTP client creation fails
    /// * Header values are invalid
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .timeout(Self::REQUEST_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * Request execution fails
    /// * Network error occurs
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No need to await with jitter because there is one caller at a time.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
