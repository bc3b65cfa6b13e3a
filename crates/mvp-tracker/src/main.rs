//! MVP tracker daemon.
//!
//! Polls the server's MVP ranking page, works out which bosses just died and
//! which have respawned, and broadcasts each event once to the game clients
//! through the notification bus.
//!
//! # Architecture
//!
//! ```text
//! ranking page --> cells --> interpreter --> event tracker --> bus session
//! ```
//!
//! Usage: `mvp-tracker [CONFIG]`. The config path defaults to
//! `mvp-tracker.yaml`; if that file does not exist the built-in defaults are
//! used.

mod error;
mod poll;
mod source;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::Local;
use mvp_core::config::{LogFormat, LoggingConfig, TrackerConfig};
use mvp_core::tracker::EventTracker;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::poll::{PollLoop, PollSettings};
use crate::source::ListingSource;

/// Config file read when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "mvp-tracker.yaml";

/// Application entry point.
///
/// Loads configuration, initializes logging, builds the listing source and
/// poll loop, makes one connect attempt to the bus, then polls until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be built. Runtime failures are logged and never end the process.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = TrackerConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    init_logging(&config.logging);
    info!(config = %config_path.display(), "mvp-tracker starting");
    info!(
        bus = config.bus.address(),
        client_name = config.bus.client_name,
        source = config.source.url,
        poll_interval_secs = config.tracker.poll_interval_secs,
        death_window_secs = config.tracker.death_window_secs,
        retention_secs = config.tracker.retention_secs,
        entities = config.entities.len(),
        "configuration loaded"
    );
    if config.source.accept_invalid_certs {
        warn!("TLS certificate verification is disabled for the listing source");
    }

    let roster = config.roster()?;
    for entity in roster.iter() {
        debug!(
            entity = entity.name,
            map = entity.map,
            respawn_minutes = entity.respawn_minutes,
            "tracking entity"
        );
    }
    let tracker = EventTracker::new(config.tracker.settings()?);
    let settings = PollSettings::from_config(&config)?;
    let source = ListingSource::from_config(&config.source)?;
    info!(location = source.location(), "listing source configured");

    let mut poll = PollLoop::new(source, roster, tracker, settings, Local::now().naive_local());
    poll.connect().await;
    poll.run_until(shutdown_signal()).await;

    info!(
        connected = poll.is_connected(),
        death_ledger = poll.tracker().death_ledger_len(),
        spawn_ledger = poll.tracker().spawn_ledger_len(),
        "mvp-tracker stopped"
    );
    Ok(())
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}
