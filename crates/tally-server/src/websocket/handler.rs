//! Per-connection socket task.
//!
//! Each upgraded socket gets one task that runs its reader and writer side by
//! side. Whichever side finishes first ends the connection, and the registry
//! entry is evicted on the way out.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info};

use super::broadcast::Broadcaster;
use super::connection::{ClientConnection, ConnectionId, Outbound};

/// How long a locally closed connection waits to flush its close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Drive one upgraded socket until either side goes away.
pub async fn run_connection(
    socket: WebSocket,
    broadcaster: Arc<Broadcaster>,
    queue_capacity: usize,
) {
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let conn = Arc::new(ClientConnection::new(ConnectionId::new(), tx));

    if !broadcaster.admit(Arc::clone(&conn)) {
        debug!(conn_id = %conn.id, "registry closed, refusing client");
        let mut socket = socket;
        let _ = time::timeout(CLOSE_FLUSH_TIMEOUT, socket.send(Message::Close(None))).await;
        return;
    }

    let registry = broadcaster.registry();
    info!(conn_id = %conn.id, clients = registry.len(), "client connected");

    let (sink, stream) = socket.split();
    tokio::select! {
        () = write_loop(sink, rx, &conn) => {}
        () = read_loop(stream, &conn) => {}
    }

    if registry.evict(&conn.id) {
        info!(
            conn_id = %conn.id,
            connected_secs = conn.age().as_secs(),
            dropped = conn.drop_count(),
            clients = registry.len(),
            "client disconnected"
        );
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    conn: &ClientConnection,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = conn.closed() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => return,
            },
        };
        let message = match frame {
            Outbound::Text(text) => Message::Text(text),
            Outbound::Ping => Message::Ping(Bytes::new()),
        };
        tokio::select! {
            biased;
            () = conn.closed() => break,
            result = sink.send(message) => {
                if let Err(e) = result {
                    debug!(conn_id = %conn.id, error = %e, "websocket write failed");
                    return;
                }
            }
        }
    }

    // Closed locally. A peer that stopped reading must not hold us here.
    let _ = time::timeout(CLOSE_FLUSH_TIMEOUT, sink.send(Message::Close(None))).await;
}

async fn read_loop(mut stream: SplitStream<WebSocket>, conn: &ClientConnection) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Pong(_)) => conn.record_pong(),
            Ok(Message::Close(_)) => break,
            // Client payloads carry no meaning; pings are answered by the transport.
            Ok(_) => {}
            Err(e) => {
                debug!(conn_id = %conn.id, error = %e, "websocket read failed");
                break;
            }
        }
    }
}
