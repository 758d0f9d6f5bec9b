//! One-shot loopback listener for the OAuth redirect.
//!
//! This is not an HTTP server. It accepts connections one at a
//! time, reads the request line, and answers every connection with the same
//! static page. It stops at the first request whose query carries either
//! `code` and `state` or `error`; anything else (favicon probes, speculative
//! pre-connects) is answered and skipped.
//!
//! The authorization outcome is reported on the terminal, never in the
//! browser.

use std::{net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use url::form_urlencoded;

use crate::error::{Error, Result};

/// Longest request head we are willing to read.
const MAX_HEAD_LEN: u64 = 8 * 1024;

/// How long a single connection may take to send its request line.
///
/// Browsers open speculative connections that never send anything; those
/// must not stall the listener.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

const PAGE: &str = "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>spotctl</title></head>\
<body><h1>You can close this window.</h1>\
<p>Return to your terminal to see the result.</p></body></html>";

/// Parsed HTTP request line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub version: &'a str,
}

impl<'a> RequestLine<'a> {
    /// Parses `METHOD SP request-target SP HTTP-version`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the line does not have exactly three parts
    /// or the version is not HTTP.
    pub fn parse(line: &'a str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(' ');

        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::invalid_data(format!(
                "malformed request line: {line:?}"
            )));
        };

        if method.is_empty() || target.is_empty() || !version.starts_with("HTTP/") {
            return Err(Error::invalid_data(format!(
                "malformed request line: {line:?}"
            )));
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        Ok(Self {
            method,
            path,
            query,
            version,
        })
    }
}

/// What the provider sent back to the redirect URI.
#[derive(Clone, PartialEq, Eq, veil::Redact)]
pub enum Callback {
    /// Consent granted.
    Code {
        #[redact]
        code: String,
        state: String,
    },

    /// Consent denied or the request was invalid.
    Error {
        error: String,
        description: Option<String>,
    },
}

impl Callback {
    /// Extracts a callback from a query string.
    ///
    /// `error` takes precedence over `code`. Returns `None` when neither a
    /// complete `code`/`state` pair nor an `error` is present.
    #[must_use]
    pub fn from_query(query: &str) -> Option<Self> {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Some(Self::Error { error, description });
        }

        match (code, state) {
            (Some(code), Some(state)) => Some(Self::Code { code, state }),
            _ => None,
        }
    }
}

/// Loopback listener bound for exactly one authorization attempt.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    path: String,
}

impl Listener {
    /// Binds to `addr`, serving callbacks on `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the address is in use or cannot be bound.
    pub async fn bind(addr: SocketAddr, path: &str) -> Result<Self> {
        let inner = TcpListener::bind(addr).await.map_err(|e| {
            Error::unavailable(format!(
                "cannot listen on {addr} for the authorization callback: {e}"
            ))
        })?;
        debug!("listening for authorization callback on {addr}{path}");

        Ok(Self {
            inner,
            path: path.to_owned(),
        })
    }

    /// The bound address.
    ///
    /// # Errors
    ///
    /// Returns error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Waits until a request carrying a callback arrives.
    ///
    /// No overall timeout: the caller races this against shutdown signals.
    ///
    /// # Errors
    ///
    /// Returns error if accepting connections fails.
    pub async fn accept(&self) -> Result<Callback> {
        loop {
            let (stream, peer) = self.inner.accept().await?;
            trace!("callback connection from {peer}");

            match tokio::time::timeout(READ_TIMEOUT, self.serve(stream)).await {
                Ok(Ok(Some(callback))) => return Ok(callback),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => debug!("ignoring callback connection from {peer}: {e}"),
                Err(_) => debug!("callback connection from {peer} timed out"),
            }
        }
    }

    /// Reads one request, answers it, and returns its callback if any.
    async fn serve(&self, stream: TcpStream) -> Result<Option<Callback>> {
        let mut reader = BufReader::new(stream);

        let mut line = String::new();
        (&mut reader).take(MAX_HEAD_LEN).read_line(&mut line).await?;
        let request = RequestLine::parse(&line)?;
        trace!("callback request: {} {}", request.method, request.path);

        // Drain the headers so the browser sees an orderly close.
        let mut header = String::new();
        let mut remaining = MAX_HEAD_LEN;
        loop {
            header.clear();
            let read = (&mut reader).take(remaining).read_line(&mut header).await?;
            remaining = remaining.saturating_sub(read as u64);
            if read == 0 || header == "\r\n" || header == "\n" || remaining == 0 {
                break;
            }
        }

        let callback = if request.method == "GET" && request.path == self.path {
            request.query.and_then(Callback::from_query)
        } else {
            None
        };

        let response = format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             Content-Length: {}\r\n\
             Cache-Control: no-store\r\n\
             Connection: close\r\n\
             \r\n\
             {PAGE}",
            PAGE.len()
        );

        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;

        Ok(callback)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn request_line_splits_path_and_query() {
        let line = RequestLine::parse("GET /callback?code=abc&state=xyz HTTP/1.1\r\n").unwrap();
        assert_eq!(line.method, "GET");
        assert_eq!(line.path, "/callback");
        assert_eq!(line.query, Some("code=abc&state=xyz"));
        assert_eq!(line.version, "HTTP/1.1");

        let line = RequestLine::parse("GET /favicon.ico HTTP/1.1").unwrap();
        assert_eq!(line.query, None);
    }

    #[test]
    fn malformed_request_lines_are_rejected() {
        assert!(RequestLine::parse("").is_err());
        assert!(RequestLine::parse("GET /callback").is_err());
        assert!(RequestLine::parse("GET /callback HTTP/1.1 extra").is_err());
        assert!(RequestLine::parse("GET /callback SMTP").is_err());
    }

    #[test]
    fn query_yields_code_and_state() {
        assert_eq!(
            Callback::from_query("code=AQB%2Fx&state=n0nce"),
            Some(Callback::Code {
                code: "AQB/x".into(),
                state: "n0nce".into(),
            })
        );
    }

    #[test]
    fn error_wins_over_code() {
        assert_eq!(
            Callback::from_query("error=access_denied&state=n0nce&code=x"),
            Some(Callback::Error {
                error: "access_denied".into(),
                description: None,
            })
        );
    }

    #[test]
    fn incomplete_queries_are_not_callbacks() {
        assert_eq!(Callback::from_query("code=abc"), None);
        assert_eq!(Callback::from_query("state=abc"), None);
        assert_eq!(Callback::from_query(""), None);
    }

    async fn get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn listener_skips_noise_and_returns_the_callback() {
        let listener = Listener::bind((Ipv4Addr::LOCALHOST, 0).into(), "/callback")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let favicon = get(addr, "/favicon.ico").await;
            let callback = get(addr, "/callback?code=abc&state=xyz").await;
            (favicon, callback)
        });

        let callback = listener.accept().await.unwrap();
        assert_eq!(
            callback,
            Callback::Code {
                code: "abc".into(),
                state: "xyz".into(),
            }
        );

        let (favicon, callback) = browser.await.unwrap();
        assert!(favicon.starts_with("HTTP/1.1 200 OK"));
        assert!(callback.starts_with("HTTP/1.1 200 OK"));
        assert!(callback.ends_with(PAGE));
    }

    #[tokio::test]
    async fn idle_connection_delays_the_callback_only_briefly() {
        let listener = Listener::bind((Ipv4Addr::LOCALHOST, 0).into(), "/callback")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let preconnect = TcpStream::connect(addr).await.unwrap();
            let callback = get(addr, "/callback?code=abc&state=xyz").await;
            drop(preconnect);
            callback
        });

        let callback = tokio::time::timeout(READ_TIMEOUT * 3, listener.accept())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(callback, Callback::Code { .. }));
        assert!(browser.await.unwrap().starts_with("HTTP/1.1 200 OK"));
    }
}
