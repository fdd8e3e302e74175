//! Counter fan-out to connected WebSocket clients.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::registry::{ConnectionRegistry, Members};
use crate::counter::Counter;
use crate::message::CountMessage;

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Open connections the message was offered to.
    pub recipients: usize,
    /// Connections whose queue accepted it.
    pub delivered: usize,
    /// Connections that could not take it (closed or full queue).
    pub failed: usize,
}

/// Pushes counter values to every open connection.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    counter: Arc<Counter>,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`, priming newcomers from `counter`.
    pub fn new(registry: Arc<ConnectionRegistry>, counter: Arc<Counter>) -> Self {
        Self { registry, counter }
    }

    /// The registry this broadcaster fans out to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The counter read when priming new connections.
    pub fn counter(&self) -> &Arc<Counter> {
        &self.counter
    }

    /// Send `value` to every open connection.
    pub fn publish(&self, value: u32) -> Delivery {
        self.publish_with(|| value).1
    }

    /// Compute the value with `next` and send it, all under the registry
    /// lock.
    ///
    /// The counter clock advances through this so a connection admitted
    /// concurrently sees either the old value followed by this broadcast, or
    /// the new value and not this broadcast.
    pub fn publish_with<F>(&self, next: F) -> (u32, Delivery)
    where
        F: FnOnce() -> u32,
    {
        self.registry.with_members(|members| {
            let value = next();
            let payload = match (CountMessage { count: value }).encode() {
                Ok(p) => p,
                Err(e) => {
                    warn!(count = value, error = %e, "failed to serialize count");
                    return (value, Delivery::default());
                }
            };
            let delivery = fan_out(members, &payload);
            debug!(
                count = value,
                recipients = delivery.recipients,
                failed = delivery.failed,
                "broadcast count"
            );
            (value, delivery)
        })
    }

    /// Register `connection` and send it the current value, directly and
    /// only to it.
    ///
    /// Returns `false` when the registry refused the connection (shutdown
    /// in progress).
    pub fn admit(&self, connection: Arc<ClientConnection>) -> bool {
        self.registry.admit(connection, |conn| {
            let value = self.counter.current();
            match (CountMessage { count: value }).encode() {
                Ok(payload) => {
                    if !conn.send(payload) {
                        debug!(conn_id = %conn.id, "failed to prime new client");
                    }
                }
                Err(e) => warn!(count = value, error = %e, "failed to serialize count"),
            }
        })
    }
}

fn fan_out(members: Members<'_>, payload: &Utf8Bytes) -> Delivery {
    let mut delivery = Delivery::default();
    for conn in members {
        delivery.recipients += 1;
        if conn.send(payload.clone()) {
            delivery.delivered += 1;
        } else {
            delivery.failed += 1;
            debug!(
                conn_id = %conn.id,
                dropped = conn.drop_count(),
                "failed to send count to client"
            );
        }
    }
    delivery
}
