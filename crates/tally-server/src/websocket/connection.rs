//! WebSocket client connection state.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh, time-ordered identifier.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame queued for the connection's writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame. The payload is shared across every recipient.
    Text(Utf8Bytes),
    /// A liveness ping.
    Ping,
}

/// Heartbeat state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Liveness {
    /// Answered the last ping (or has not been pinged yet).
    Alive = 0,
    /// Pinged and awaiting a pong.
    Pending = 1,
}

impl Liveness {
    fn from_u8(raw: u8) -> Self {
        if raw == Self::Pending as u8 {
            Self::Pending
        } else {
            Self::Alive
        }
    }
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write loop.
    tx: mpsc::Sender<Outbound>,
    /// Cancelled once the connection is closed locally.
    closed: CancellationToken,
    /// Heartbeat state, see [`Liveness`].
    liveness: AtomicU8,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new open connection in the [`Liveness::Alive`] state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            liveness: AtomicU8::new(Liveness::Alive as u8),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the connection is closed or its queue is full or
    /// gone, and increments the dropped message counter.
    pub fn send(&self, payload: Utf8Bytes) -> bool {
        self.enqueue(Outbound::Text(payload))
    }

    /// Queue a ping frame.
    pub fn ping(&self) -> bool {
        self.enqueue(Outbound::Ping)
    }

    fn enqueue(&self, frame: Outbound) -> bool {
        if self.is_open() && self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Current heartbeat state.
    pub fn liveness(&self) -> Liveness {
        Liveness::from_u8(self.liveness.load(Ordering::Acquire))
    }

    /// A pong arrived.
    pub fn record_pong(&self) {
        self.liveness.store(Liveness::Alive as u8, Ordering::Release);
    }

    /// Move to [`Liveness::Pending`] ahead of a ping, returning the state
    /// the connection was in. `Pending` means the previous ping went
    /// unanswered.
    pub fn begin_ping(&self) -> Liveness {
        Liveness::from_u8(
            self.liveness
                .swap(Liveness::Pending as u8, Ordering::AcqRel),
        )
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once the connection has been closed locally.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("liveness", &self.liveness())
            .field("dropped", &self.drop_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new("conn_1".into(), tx);
        (conn, rx)
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
    }

    #[test]
    fn new_connection_is_open_and_alive() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.id.as_str(), "conn_1");
        assert!(conn.is_open());
        assert_eq!(conn.liveness(), Liveness::Alive);
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Utf8Bytes::from_static("hello")));
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, Outbound::Text(Utf8Bytes::from_static("hello")));
    }

    #[tokio::test]
    async fn ping_is_queued() {
        let (conn, mut rx) = make_connection();
        assert!(conn.ping());
        assert_eq!(rx.recv().await.unwrap(), Outbound::Ping);
    }

    #[test]
    fn send_to_dropped_receiver_returns_false() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(!conn.send(Utf8Bytes::from_static("hello")));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new("conn_full".into(), tx);
        assert!(conn.send(Utf8Bytes::from_static("msg1")));
        assert!(!conn.send(Utf8Bytes::from_static("msg2")));
        assert!(!conn.ping());
        assert_eq!(conn.drop_count(), 2);
    }

    #[test]
    fn send_after_close_returns_false() {
        let (conn, mut rx) = make_connection();
        conn.close();
        assert!(!conn.is_open());
        assert!(!conn.send(Utf8Bytes::from_static("late")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let (conn, _rx) = make_connection();
        conn.close();
        conn.close();
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn closed_future_resolves_after_close() {
        let (conn, _rx) = make_connection();
        conn.close();
        conn.closed().await;
    }

    #[test]
    fn ping_then_pong_returns_to_alive() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.begin_ping(), Liveness::Alive);
        assert_eq!(conn.liveness(), Liveness::Pending);
        conn.record_pong();
        assert_eq!(conn.liveness(), Liveness::Alive);
    }

    #[test]
    fn unanswered_ping_reports_pending() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.begin_ping(), Liveness::Alive);
        assert_eq!(conn.begin_ping(), Liveness::Pending);
    }

    #[test]
    fn pong_while_alive_stays_alive() {
        let (conn, _rx) = make_connection();
        conn.record_pong();
        assert_eq!(conn.liveness(), Liveness::Alive);
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }

    #[test]
    fn debug_output_names_state() {
        let (conn, _rx) = make_connection();
        let debug = format!("{conn:?}");
        assert!(debug.contains("conn_1"));
        assert!(debug.contains("Alive"));
    }
}
