//! Wire messages.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};

/// Server → client counter update: `{"count":N}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMessage {
    /// Counter value.
    pub count: u32,
}

impl CountMessage {
    /// Serialize to a text frame payload.
    pub fn encode(self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(&self).map(Utf8Bytes::from)
    }
}
