//! Configuration loading and typed config structures for the MVP tracker.
//!
//! Configuration lives in a YAML file (by default `mvp-tracker.yaml` in the
//! working directory). Every field has a default matching the values the
//! tracker has always run with, so an absent file or an empty document is a
//! valid configuration. A few connection settings can be overridden from the
//! environment for container deployments.

use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use mvp_types::{EntityDef, builtin_entities};
use serde::Deserialize;

use crate::roster::{EntityTable, RosterError};
use crate::tracker::TrackerSettings;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The entity table is unusable.
    #[error("invalid entity table: {source}")]
    Roster {
        /// The underlying validation error.
        #[from]
        source: RosterError,
    },

    /// A value parsed but makes no sense.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackerConfig {
    /// Notification bus connection.
    #[serde(default)]
    pub bus: BusConfig,

    /// Kill listing source.
    #[serde(default)]
    pub source: SourceConfig,

    /// Poll cadence and deduplication windows.
    #[serde(default)]
    pub tracker: TimingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tracked entities. Defaults to the built-in MVP table.
    #[serde(default = "builtin_entities")]
    pub entities: Vec<EntityDef>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            source: SourceConfig::default(),
            tracker: TimingConfig::default(),
            logging: LoggingConfig::default(),
            entities: builtin_entities(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration for the daemon.
    ///
    /// Reads `path` if it exists (otherwise starts from defaults), applies
    /// environment overrides, and validates the result:
    /// - `MVP_BUS_HOST` overrides `bus.host`
    /// - `MVP_BUS_PORT` overrides `bus.port`
    /// - `MVP_SOURCE_URL` overrides `source.url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// override is malformed, or validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty document yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from a variable lookup (normally the process
    /// environment).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `MVP_BUS_PORT` is not a port number.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MVP_BUS_HOST") {
            self.bus.host = host;
        }
        if let Some(port) = lookup("MVP_BUS_PORT") {
            self.bus.port = port.parse().map_err(|e| ConfigError::Invalid {
                reason: format!("invalid MVP_BUS_PORT {port:?}: {e}"),
            })?;
        }
        if let Some(url) = lookup("MVP_SOURCE_URL") {
            self.source.url = url;
        }
        Ok(())
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any interval is zero, the source URL is
    /// blank, or the entity table is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("tracker.poll_interval_secs", self.tracker.poll_interval_secs),
            ("tracker.death_window_secs", self.tracker.death_window_secs),
            ("tracker.retention_secs", self.tracker.retention_secs),
            ("tracker.sweep_interval_secs", self.tracker.sweep_interval_secs),
            ("bus.connect_timeout_secs", self.bus.connect_timeout_secs),
            ("bus.send_timeout_secs", self.bus.send_timeout_secs),
            ("source.request_timeout_secs", self.source.request_timeout_secs),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid {
                reason: format!("{name} must be at least 1"),
            });
        }
        if self.source.url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "source.url must not be empty".to_owned(),
            });
        }
        self.tracker.settings()?;
        EntityTable::new(self.entities.clone())?;
        Ok(())
    }

    /// Build the validated entity table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Roster`] if the table is invalid.
    pub fn roster(&self) -> Result<EntityTable, ConfigError> {
        Ok(EntityTable::new(self.entities.clone())?)
    }
}

/// Notification bus connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusConfig {
    /// Bus host name or IP address.
    #[serde(default = "default_bus_host")]
    pub host: String,

    /// Bus TCP port.
    #[serde(default = "default_bus_port")]
    pub port: u16,

    /// Name sent in the `HELLO` handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// TCP connect deadline in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Per-frame write deadline in seconds.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Pause before each reconnect attempt, in seconds.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl BusConfig {
    /// The `host:port` address to dial.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// TCP connect deadline.
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-frame write deadline.
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Pause before each reconnect attempt.
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: default_bus_host(),
            port: default_bus_port(),
            client_name: default_client_name(),
            connect_timeout_secs: default_connect_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

/// Kill listing source settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    /// URL of the MVP ranking page.
    #[serde(default = "default_source_url")]
    pub url: String,

    /// HTTP request deadline in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Accept self-signed or otherwise invalid TLS certificates.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl SourceConfig {
    /// HTTP request deadline.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            request_timeout_secs: default_request_timeout_secs(),
            accept_invalid_certs: true,
        }
    }
}

/// Poll cadence and deduplication windows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Kills younger than this many seconds get a death announcement.
    #[serde(default = "default_death_window_secs")]
    pub death_window_secs: u64,

    /// Seconds an announcement is remembered.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Seconds between ledger eviction sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl TimingConfig {
    /// Seconds between poll cycles.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Minimum spacing of eviction sweeps.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the value does not fit a [`TimeDelta`].
    pub fn sweep_interval(&self) -> Result<TimeDelta, ConfigError> {
        seconds("tracker.sweep_interval_secs", self.sweep_interval_secs)
    }

    /// Convert to the tracker's settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a window does not fit a [`TimeDelta`].
    pub fn settings(&self) -> Result<TrackerSettings, ConfigError> {
        Ok(TrackerSettings {
            death_window: seconds("tracker.death_window_secs", self.death_window_secs)?,
            retention: seconds("tracker.retention_secs", self.retention_secs)?,
        })
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            death_window_secs: default_death_window_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// Convert a configured number of seconds to a [`TimeDelta`].
fn seconds(name: &str, secs: u64) -> Result<TimeDelta, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| ConfigError::Invalid {
            reason: format!("{name} is out of range"),
        })
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_bus_host() -> String {
    "127.0.0.1".to_owned()
}

const fn default_bus_port() -> u16 {
    6950
}

fn default_client_name() -> String {
    "MVPTracker".to_owned()
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

const fn default_send_timeout_secs() -> u64 {
    10
}

const fn default_reconnect_delay_secs() -> u64 {
    10
}

fn default_source_url() -> String {
    "https://asgardsglory.ddns.net/?module=ranking&action=mvp".to_owned()
}

const fn default_request_timeout_secs() -> u64 {
    15
}

const fn default_poll_interval_secs() -> u64 {
    60
}

const fn default_death_window_secs() -> u64 {
    120
}

const fn default_retention_secs() -> u64 {
    6 * 60 * 60
}

const fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bus.address(), "127.0.0.1:6950");
        assert_eq!(config.bus.client_name, "MVPTracker");
        assert_eq!(config.tracker.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.entities.len(), 18);

        let settings = config.tracker.settings().unwrap();
        assert_eq!(settings, TrackerSettings::default());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
bus:
  host: "bus.internal"
  port: 7000
  client_name: "Watcher"
  connect_timeout_secs: 3
  send_timeout_secs: 4
  reconnect_delay_secs: 20

source:
  url: "https://example.test/mvp"
  request_timeout_secs: 30
  accept_invalid_certs: false

tracker:
  poll_interval_secs: 30
  death_window_secs: 90
  retention_secs: 3600
  sweep_interval_secs: 600

logging:
  level: "debug"
  format: json

entities:
  - name: "Eddga"
    map: "pay_fild11"
    respawn_minutes: 120
  - name: "Maya"
    map: "anthell02"
    respawn_minutes: 120
"#;

        let config = TrackerConfig::parse(yaml).unwrap();
        assert_eq!(config.bus.address(), "bus.internal:7000");
        assert_eq!(config.bus.reconnect_delay(), Duration::from_secs(20));
        assert!(!config.source.accept_invalid_certs);
        assert_eq!(config.tracker.death_window_secs, 90);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.entities.len(), 2);
        assert_eq!(config.roster().unwrap().len(), 2);
        assert_eq!(
            config.tracker.settings().unwrap().retention,
            TimeDelta::hours(1)
        );
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = TrackerConfig::parse("bus:\n  port: 7001\n").unwrap();
        assert_eq!(config.bus.port, 7001);
        // Everything else uses defaults
        assert_eq!(config.bus.host, "127.0.0.1");
        assert_eq!(config.tracker.retention_secs, 21_600);
        assert_eq!(config.entities.len(), 18);
    }

    #[test]
    fn parse_empty_yaml() {
        let config = TrackerConfig::parse("").unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = TrackerConfig::default();
        config
            .apply_env_overrides(|name| match name {
                "MVP_BUS_HOST" => Some("10.0.0.5".to_owned()),
                "MVP_BUS_PORT" => Some("6951".to_owned()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.bus.address(), "10.0.0.5:6951");
        assert_eq!(config.source.url, SourceConfig::default().url);
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let mut config = TrackerConfig::default();
        let result = config.apply_env_overrides(|name| {
            (name == "MVP_BUS_PORT").then(|| "not-a-port".to_owned())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = TrackerConfig::parse("tracker:\n  poll_interval_secs: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn duplicate_entities_are_rejected() {
        let yaml = "entities:\n  - {name: Maya, map: anthell02, respawn_minutes: 130}\n  - {name: maya, map: anthell02, respawn_minutes: 130}\n";
        let config = TrackerConfig::parse(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Roster { .. })));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "mvp-tracker-missing-{}.yaml",
            std::process::id()
        ));
        let config = TrackerConfig::load(&path);
        assert!(config.is_ok());
    }

    #[test]
    fn load_reads_file() {
        let path = std::env::temp_dir().join(format!(
            "mvp-tracker-config-{}-{:?}.yaml",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, "tracker:\n  poll_interval_secs: 45\n").unwrap();
        let config = TrackerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.tracker.poll_interval_secs, 45);
    }
}
