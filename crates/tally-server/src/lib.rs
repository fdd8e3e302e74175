//! # tally-server
//!
//! Axum HTTP + `WebSocket` server broadcasting a shared counter.
//!
//! - Any plain HTTP request gets a fixed text banner
//! - `WebSocket` clients receive `{"count":N}` on connect and on every tick
//! - Heartbeat ping/pong evicts clients that miss one full period
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod message;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use error::{Result, ServerError};
