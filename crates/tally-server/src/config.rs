//! Server configuration.

use std::time::Duration;

use tally_settings::ServerSettings;

/// Runtime configuration for [`TallyServer`](crate::server::TallyServer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Counter clock period.
    pub tick_interval: Duration,
    /// Heartbeat period. A silent client is evicted within two of these.
    pub heartbeat_interval: Duration,
    /// Outbound queue capacity per connection.
    pub max_send_queue: usize,
    /// Upper bound on the connection drain at shutdown.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            max_send_queue: settings.max_send_queue,
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
        }
    }
}
