use std::{path::PathBuf, process, time::Duration};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, LevelFilter};

use spotctl::{
    api,
    config::Config,
    credentials::CredentialStore,
    error::Result,
    http::Client as HttpClient,
    oauth::{state::StateStore, AuthorizationFlow},
    preferences::{PreferenceStore, Preferences},
    protocol::{
        player::{PlaybackState, RepeatState},
        search::SearchKind,
    },
    remote::Remote,
    session::Session,
    signal,
    token::TokenStore,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration directory
    ///
    /// Holds the client credentials and tokens. Keep it private: its
    /// contents grant control over your Spotify account.
    ///
    /// [default: platform configuration directory]
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath, env = Config::CONFIG_DIR_ENV)]
    config_dir: Option<PathBuf>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Authorize spotctl with your Spotify account
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long, default_value_t = false)]
        no_browser: bool,
    },

    /// Forget the stored tokens
    Logout,

    /// List available devices
    Devices,

    /// Show what is playing
    Status,

    /// Show the upcoming queue
    Queue,

    /// Play a URI or link, or resume playback without one
    Play {
        /// `spotify:` URI or `open.spotify.com` link
        uri: Option<String>,

        #[command(flatten)]
        target: Target,
    },

    /// Pause playback
    Pause {
        #[command(flatten)]
        target: Target,
    },

    /// Skip to the next item
    Next {
        #[command(flatten)]
        target: Target,
    },

    /// Go back to the previous item
    Previous {
        #[command(flatten)]
        target: Target,
    },

    /// Seek within the current item
    Seek {
        /// Position as seconds or `m:ss`
        #[arg(value_parser = parse_position)]
        position: Duration,

        #[command(flatten)]
        target: Target,
    },

    /// Set the volume
    Volume {
        /// Volume in percent, 0 to 100
        percent: u8,

        #[command(flatten)]
        target: Target,
    },

    /// Turn shuffle on or off
    Shuffle {
        /// `on` or `off`
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,

        #[command(flatten)]
        target: Target,
    },

    /// Set the repeat mode
    Repeat {
        /// `off`, `track` or `context`
        state: RepeatState,

        #[command(flatten)]
        target: Target,
    },

    /// Move playback to another device
    Transfer {
        /// Part of the device name, case-insensitive
        device: String,

        /// Start playing on the new device
        #[arg(long, default_value_t = false)]
        play: bool,
    },

    /// Add a track or episode to the queue
    Enqueue {
        /// `spotify:` URI or `open.spotify.com` link
        uri: String,

        #[command(flatten)]
        target: Target,
    },

    /// Search and print the first result
    Search {
        /// What to search for
        #[arg(short = 't', long = "type", default_value_t = SearchKind::Track)]
        kind: SearchKind,

        /// Play the result
        #[arg(short, long, default_value_t = false)]
        play: bool,

        #[command(flatten)]
        target: Target,

        /// Search terms
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Show or set the device used when none is given
    DefaultDevice {
        /// Part of the device name, case-insensitive
        device: Option<String>,

        /// Forget the default device
        #[arg(long, conflicts_with = "device", default_value_t = false)]
        clear: bool,
    },
}

/// Device selection shared by playback commands.
#[derive(Clone, Debug, Default, clap::Args)]
struct Target {
    /// Part of the device name, case-insensitive
    ///
    /// [default: the default device, if set]
    #[arg(short, long)]
    device: Option<String>,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("spotctl", level);
    }

    logger.init();
}

/// Parses `90`, `1:30` or `1:02:03` into a duration.
fn parse_position(value: &str) -> std::result::Result<Duration, String> {
    let invalid = || format!("\"{value}\" is not a position like 90 or 1:30");

    let mut seconds = 0u64;
    for part in value.trim().split(':') {
        let part: u64 = part.parse().map_err(|_| invalid())?;
        seconds = seconds
            .checked_mul(60)
            .and_then(|seconds| seconds.checked_add(part))
            .ok_or_else(invalid)?;
    }
    Ok(Duration::from_secs(seconds))
}

/// Formats milliseconds as `m:ss`.
fn clock(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn print_playback(playback: &PlaybackState) {
    let Some(item) = &playback.item else {
        println!("Nothing is playing");
        return;
    };

    let verb = if playback.is_playing { "Playing" } else { "Paused" };
    match &playback.device {
        Some(device) => println!("{verb} on {}: {item}", device.name),
        None => println!("{verb}: {item}"),
    }

    if let (Some(progress), Some(duration)) = (playback.progress_ms, item.duration_ms) {
        println!("{} / {}", clock(progress), clock(duration));
    }

    let shuffle = match playback.shuffle_state {
        Some(true) => "on",
        Some(false) | None => "off",
    };
    let repeat = playback.repeat_state.unwrap_or_default();
    println!("Shuffle {shuffle}, repeat {repeat}");
}

fn remote(config: &Config) -> Result<Remote> {
    let http_client = HttpClient::new(config)?;
    let api = api::Client::new(config, http_client, Session::new(config));
    Ok(Remote::new(api))
}

/// Resolves the device to address: the explicit fragment, then the default
/// device preference, then none.
async fn target_device(
    remote: &mut Remote,
    preferences: &Preferences,
    target: &Target,
) -> Result<Option<String>> {
    let fragment = target
        .device
        .as_deref()
        .or(preferences.default_device.as_deref());

    match fragment {
        Some(fragment) => remote.resolve_device(fragment).await.map(Some),
        None => Ok(None),
    }
}

async fn login(config: &Config) -> Result<()> {
    let http_client = HttpClient::new(config)?;
    let credentials = CredentialStore::new(config);
    let shutdown = signal::shutdown()?;

    let mut flow = AuthorizationFlow::new(config, &http_client);
    let record = flow.run(|| credentials.load(), shutdown).await?;

    println!(
        "Logged in; access token valid for {} minutes",
        record.time_to_live().as_secs() / 60
    );
    Ok(())
}

fn logout(config: &Config) -> Result<()> {
    let removed = TokenStore::new(config).clear()?;
    StateStore::new(config).discard()?;

    if removed {
        println!("Logged out");
    } else {
        println!("Not logged in");
    }
    Ok(())
}

/// Main application logic.
///
/// # Errors
///
/// Returns the classified error of the failing step; its message names the
/// corrective action.
async fn run(args: Args) -> Result<()> {
    let mut config = match args.config_dir {
        Some(dir) => Config::with_config_dir(dir)?,
        None => Config::new()?,
    };
    debug!("configuration directory: {}", config.config_dir.display());

    let preferences_store = PreferenceStore::new(&config);

    match args.command {
        Command::Login { no_browser } => {
            config.open_browser = !no_browser;
            login(&config).await
        }

        Command::Logout => logout(&config),

        Command::Devices => {
            let devices = remote(&config)?.devices().await?;
            if devices.is_empty() {
                println!("No devices available; open Spotify on one of your devices");
            }
            for device in devices {
                println!("{device}");
            }
            Ok(())
        }

        Command::Status => {
            match remote(&config)?.playback().await? {
                Some(playback) => print_playback(&playback),
                None => println!("Nothing is playing"),
            }
            Ok(())
        }

        Command::Queue => {
            let queue = remote(&config)?.queue().await?;
            match queue.currently_playing {
                Some(item) => println!("Now: {item}"),
                None => println!("Nothing is playing"),
            }
            for (position, item) in queue.queue.iter().enumerate() {
                println!("{:>3}. {item}", position + 1);
            }
            Ok(())
        }

        Command::Play { uri, target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            match uri {
                Some(uri) => remote.launch(&uri, device.as_deref()).await,
                None => remote.resume(device.as_deref()).await,
            }
        }

        Command::Pause { target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            remote.pause(device.as_deref()).await
        }

        Command::Next { target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            remote.next(device.as_deref()).await
        }

        Command::Previous { target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            remote.previous(device.as_deref()).await
        }

        Command::Seek { position, target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            remote.seek(position, device.as_deref()).await
        }

        Command::Volume { percent, target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            remote.volume(percent, device.as_deref()).await
        }

        Command::Shuffle { enabled, target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            remote.shuffle(enabled, device.as_deref()).await
        }

        Command::Repeat { state, target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            remote.repeat(state, device.as_deref()).await
        }

        Command::Transfer { device, play } => {
            let mut remote = remote(&config)?;
            let device_id = remote.resolve_device(&device).await?;
            remote.transfer(&device_id, play).await
        }

        Command::Enqueue { uri, target } => {
            let mut remote = remote(&config)?;
            let device = target_device(&mut remote, &preferences_store.load()?, &target).await?;
            remote.add_to_queue(&uri, device.as_deref()).await
        }

        Command::Search {
            kind,
            play,
            target,
            query,
        } => {
            let mut remote = remote(&config)?;
            let hit = remote.search(kind, &query.join(" ")).await?;
            println!("{} ({})", hit.name, hit.uri);

            if play {
                let device =
                    target_device(&mut remote, &preferences_store.load()?, &target).await?;
                remote.launch(&hit.uri, device.as_deref()).await?;
            }
            Ok(())
        }

        Command::DefaultDevice { device, clear } => {
            let mut preferences = preferences_store.load()?;

            if clear {
                preferences.default_device = None;
                preferences_store.save(&preferences)?;
                println!("Default device cleared");
            } else if let Some(fragment) = device {
                // Fail early on typos rather than on the next play.
                let mut remote = remote(&config)?;
                remote.resolve_device(&fragment).await?;
                preferences.default_device = Some(fragment);
                preferences_store.save(&preferences)?;
                info!("saved preferences to {}", preferences_store.path().display());
            } else {
                match preferences.default_device {
                    Some(fragment) => println!("{fragment}"),
                    None => println!("No default device set"),
                }
            }
            Ok(())
        }
    }
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the requested command.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();
    debug!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
