//! Command-line remote control for Spotify.
//!
//! The crate has two halves:
//!
//! * Authorization: [`oauth`] runs the authorization-code flow against a
//!   one-shot loopback listener and stores the issued tokens through
//!   [`token`]; [`session`] keeps them fresh.
//! * Control: [`api`] sends Web API requests with retries and error
//!   classification; [`remote`] builds device resolution and playback
//!   commands on top of it.
//!
//! Everything persistent lives in owner-only TOML files in the
//! configuration directory, see [`config`] and [`fs`].
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fs;
pub mod http;
pub mod oauth;
pub mod preferences;
pub mod protocol;
pub mod remote;
pub mod session;
pub mod signal;
pub mod token;
