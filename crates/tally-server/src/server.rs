//! `TallyServer`: Axum HTTP + WebSocket server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::clock::CounterClock;
use crate::config::ServerConfig;
use crate::counter::Counter;
use crate::error::{Result, ServerError};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::handler::run_connection;
use crate::websocket::heartbeat::HeartbeatMonitor;
use crate::websocket::registry::ConnectionRegistry;

/// Body returned for every plain HTTP request.
pub const BANNER: &str = "WebSocket server running\n";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Counter fan-out and admission.
    pub broadcaster: Arc<Broadcaster>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Tracks connection tasks so shutdown can wait for them.
    pub tracker: TaskTracker,
    /// Outbound queue capacity per connection.
    pub max_send_queue: usize,
}

/// The counter broadcast server.
pub struct TallyServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    shutdown: Arc<ShutdownCoordinator>,
    tracker: TaskTracker,
}

impl TallyServer {
    /// Create a new server with a counter starting at zero.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let counter = Arc::new(Counter::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), counter));
        Self {
            config,
            registry,
            broadcaster,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Build the Axum router. Every path and method lands on one handler.
    pub fn router(&self) -> Router {
        let state = AppState {
            broadcaster: self.broadcaster.clone(),
            shutdown: self.shutdown.clone(),
            tracker: self.tracker.clone(),
            max_send_queue: self.config.max_send_queue,
        };

        Router::new()
            .fallback(entry_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the listener and start the accept loop, the counter clock and the
    /// heartbeat monitor.
    pub async fn listen(&self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let token = self.shutdown.token();
        let clock = tokio::spawn(
            CounterClock::new(self.broadcaster.clone())
                .run(self.config.tick_interval, token.clone()),
        );
        let heartbeat = tokio::spawn(
            HeartbeatMonitor::new(self.registry.clone())
                .run(self.config.heartbeat_interval, token.clone()),
        );

        let app = self.router();
        let serve = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
        });

        info!(
            addr = %local_addr,
            tick_ms = duration_ms(self.config.tick_interval),
            heartbeat_ms = duration_ms(self.config.heartbeat_interval),
            "server listening"
        );

        let handle = ServerHandle {
            local_addr,
            shutdown: self.shutdown.clone(),
            registry: self.registry.clone(),
            tracker: self.tracker.clone(),
            shutdown_timeout: self.config.shutdown_timeout,
            clock,
            heartbeat,
            serve,
        };
        Ok((local_addr, handle))
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the broadcaster.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Handle to a running server, consumed by [`shutdown`](Self::shutdown).
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    registry: Arc<ConnectionRegistry>,
    tracker: TaskTracker,
    shutdown_timeout: Duration,
    clock: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    serve: JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the server.
    ///
    /// Timers stop first so nothing is broadcast past this point, then every
    /// connection is closed and drained, and finally the listener is dropped.
    pub async fn shutdown(self) -> Result<()> {
        info!(clients = self.registry.len(), "shutting down");
        self.shutdown.shutdown();

        for (name, task) in [("clock", self.clock), ("heartbeat", self.heartbeat)] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "timer task did not stop cleanly");
            }
        }

        let closed = self.registry.close_all();
        let drained = self
            .shutdown
            .drain(&self.tracker, Some(self.shutdown_timeout))
            .await;

        match self.serve.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "accept loop did not stop cleanly"),
        }

        info!(closed, drained, "shutdown complete");
        Ok(())
    }
}

/// Any path, any method: upgrade WebSocket requests, answer everything else
/// with the banner.
async fn entry_handler(
    State(state): State<AppState>,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(upgrade) = upgrade else {
        return banner().into_response();
    };
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down\n").into_response();
    }

    let AppState {
        broadcaster,
        tracker,
        max_send_queue,
        ..
    } = state;
    upgrade.on_upgrade(move |socket| {
        tracker.track_future(run_connection(socket, broadcaster, max_send_queue))
    })
}

fn banner() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], BANNER)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
