//! Signals that abort a pending login.
//!
//! While the authorization flow waits for the browser, the only ways out
//! are a callback or one of these signals:
//! * Unix: Ctrl-C (SIGINT), SIGTERM, and SIGHUP when the terminal goes away
//! * Windows: Ctrl-C only

use std::{fmt, future::Future};

use crate::error::Result;

/// Signal that ended the wait.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[expect(clippy::module_name_repetitions)]
pub enum ShutdownSignal {
    /// Ctrl-C (SIGINT)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP, the controlling terminal closed
    Hangup,
}

/// Registers the signal handlers and returns a future resolving to the
/// first signal received.
///
/// Handlers are installed before this returns, so call it before starting
/// anything that must be interruptible.
///
/// # Errors
///
/// Returns error if signal handlers cannot be registered.
#[cfg(unix)]
pub fn shutdown() -> Result<impl Future<Output = ShutdownSignal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
            _ = sigterm.recv() => ShutdownSignal::Terminate,
            _ = sighup.recv() => ShutdownSignal::Hangup,
        }
    })
}

/// Returns a future resolving on Ctrl-C.
///
/// # Errors
///
/// Infallible on this platform.
#[cfg(not(unix))]
pub fn shutdown() -> Result<impl Future<Output = ShutdownSignal>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        ShutdownSignal::Interrupt
    })
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "Ctrl+C"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Hangup => write!(f, "SIGHUP"),
        }
    }
}
