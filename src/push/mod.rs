// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push channel.
//!
//! One long-lived [`ConnectionManager`] task per account owns the push
//! connection. It parses control reports, normalizes them against each
//! device's capabilities and queues them on a bounded channel. A single
//! consumer applies the queue to the state store, so telemetry for a device
//! is applied in arrival order. While the push channel is down for longer
//! than a grace period, a fallback poller feeds the same queue from the
//! REST API.
//!
//! # Transports
//!
//! - [`WebSocketTransport`]: WebSocket transport using `tokio-tungstenite` (requires the `websocket` feature)

mod applier;
mod connection_state;
mod manager;
mod poller;
#[cfg(feature = "websocket")]
mod websocket;

pub use connection_state::ConnectionState;
pub use manager::{ConnectionManager, HeartbeatConfig};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

pub(crate) use applier::{apply_updates, to_update};
pub(crate) use poller::run_poller;

use std::future::Future;

use crate::error::Error;

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    /// A text message, expected to be JSON.
    Text(String),
    /// A keep-alive frame with no payload.
    Heartbeat,
}

/// Opens push connections.
pub trait PushTransport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: PushConnection;

    /// Connects to `url` authenticating with the bare account `token`.
    ///
    /// Rejected credentials must be reported as [`Error::Auth`], which the
    /// connection manager treats as fatal.
    fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> impl Future<Output = Result<Self::Connection, Error>> + Send;
}

/// An open push connection.
pub trait PushConnection: Send + 'static {
    /// Waits for the next frame. Returns `None` once the server closed the
    /// connection.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<PushFrame, Error>>> + Send;

    /// Sends a keep-alive ping.
    fn ping(&mut self) -> impl Future<Output = Result<(), Error>> + Send;
}
