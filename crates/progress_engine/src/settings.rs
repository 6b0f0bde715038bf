use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use monitor_logging::monitor_info;
use progress_core::{
    JobProfile, ReconnectPolicy, SessionConfig, DEFAULT_COMPLETION_GRACE, DEFAULT_LOG_CAPACITY,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportSettings;

/// Local wall clock used for receipt times. Injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct MonitorSettings {
    pub transport: TransportSettings,
    /// Period of the elapsed-time refresh.
    pub tick_interval: Duration,
    /// Treat the stream as dropped when nothing, not even a heartbeat,
    /// arrives for this long. `None` disables the watchdog.
    pub idle_timeout: Option<Duration>,
    pub clock: Clock,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            transport: TransportSettings::default(),
            tick_interval: Duration::from_secs(1),
            idle_timeout: None,
            clock: Arc::new(Utc::now),
        }
    }
}

impl fmt::Debug for MonitorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorSettings")
            .field("transport", &self.transport)
            .field("tick_interval", &self.tick_interval)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings from {path}: {message}")]
    Parse { path: String, message: String },
}

/// On-disk settings, RON encoded. Durations are milliseconds; every field is
/// optional and falls back to the built-in default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub connect_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub idle_timeout_ms: Option<u64>,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: Option<u32>,
    pub completion_grace_ms: u64,
    pub log_capacity: usize,
    pub profile: String,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            tick_interval_ms: 1_000,
            idle_timeout_ms: None,
            reconnect_delay_ms: millis(DEFAULT_RECONNECT_DELAY),
            max_reconnect_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            completion_grace_ms: millis(DEFAULT_COMPLETION_GRACE),
            log_capacity: DEFAULT_LOG_CAPACITY,
            profile: "generation".to_string(),
        }
    }
}

impl SettingsFile {
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            transport: TransportSettings {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                ..TransportSettings::default()
            },
            // A zero period would make tokio's interval panic.
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            idle_timeout: self.idle_timeout_ms.map(Duration::from_millis),
            ..MonitorSettings::default()
        }
    }

    pub fn session_config(&self, session_id: impl Into<String>, profile: JobProfile) -> SessionConfig {
        let mut config = SessionConfig::new(session_id, profile);
        config.log_capacity = self.log_capacity;
        config.reconnect = ReconnectPolicy {
            delay: Duration::from_millis(self.reconnect_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        };
        config.completion_grace = Duration::from_millis(self.completion_grace_ms);
        config
    }
}

/// Loads settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<SettingsFile, SettingsError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            monitor_info!("No settings at {:?}; using defaults", path);
            return Ok(SettingsFile::default());
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let settings = ron::from_str(&content).map_err(|err| SettingsError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    monitor_info!("Loaded settings from {:?}", path);
    Ok(settings)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
