//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial: missing fields take their compiled default.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 3500, "heartbeatIntervalMs": 30000 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TallySettings {
    /// Listener and engine settings.
    pub server: ServerSettings,
    /// External relational store. Parsed for reporting only.
    pub database: DatabaseSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TallySettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        let non_zero = [
            ("server.tickIntervalMs", self.server.tick_interval_ms == 0),
            ("server.heartbeatIntervalMs", self.server.heartbeat_interval_ms == 0),
            ("server.maxSendQueue", self.server.max_send_queue == 0),
        ];
        if let Some((key, _)) = non_zero.into_iter().find(|(_, zero)| *zero) {
            return Err(crate::SettingsError::InvalidValue {
                key,
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }
}

/// Listener and engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listener port.
    pub port: u16,
    /// Counter clock period in milliseconds.
    pub tick_interval_ms: u64,
    /// Heartbeat period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Capacity of each connection's outbound queue.
    pub max_send_queue: usize,
    /// Upper bound on the connection drain at shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3500,
            tick_interval_ms: 1_000,
            heartbeat_interval_ms: 30_000,
            max_send_queue: 256,
            shutdown_timeout_ms: 30_000,
        }
    }
}

/// Connection parameters for the external `PostgreSQL` store.
///
/// Nothing in the server connects with these; they are carried so that a
/// deployment's environment is validated and reported consistently.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Database host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Database port.
    pub port: u16,
    /// Login role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Login password. Never serialized.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Database name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl DatabaseSettings {
    /// Whether a host has been configured at all.
    pub fn is_configured(&self) -> bool {
        self.host.is_some()
    }

    /// `user@host:port/database` with the password left out.
    pub fn display_target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user.as_deref().unwrap_or("-"),
            self.host.as_deref().unwrap_or("-"),
            self.port,
            self.database.as_deref().unwrap_or("-"),
        )
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: 5432,
            user: None,
            password: None,
            database: None,
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}
