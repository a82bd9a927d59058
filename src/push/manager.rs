// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ProtocolError};
use crate::manager::ReconnectionPolicy;
use crate::session::Session;
use crate::state::{Provenance, StateStore, TelemetryUpdate};
use crate::telemetry::PushMessage;

use super::{ConnectionState, PushConnection, PushFrame, PushTransport, to_update};

/// Heartbeat timing of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub interval: Duration,
    /// Silence after which the connection is considered lost.
    pub timeout: Duration,
    /// Timeout of one connection attempt.
    pub connect_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Owns the account's push connection.
///
/// [`ConnectionManager::run`] connects, routes control reports into the
/// telemetry queue and reconnects with jittered exponential backoff. It
/// returns when cancelled, when credentials are rejected, or when the
/// reconnection policy gives up. The last two leave the session in
/// [`ConnectionState::Failed`].
pub struct ConnectionManager<T> {
    transport: Arc<T>,
    session: Session,
    store: Arc<StateStore>,
    updates: mpsc::Sender<TelemetryUpdate>,
    reconnection: ReconnectionPolicy,
    heartbeat: HeartbeatConfig,
    cancel: CancellationToken,
}

impl<T> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("session", &self.session)
            .field("reconnection", &self.reconnection)
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

impl<T: PushTransport> ConnectionManager<T> {
    /// Creates a connection manager feeding `updates`.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        session: Session,
        store: Arc<StateStore>,
        updates: mpsc::Sender<TelemetryUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            session,
            store,
            updates,
            reconnection: ReconnectionPolicy::default(),
            heartbeat: HeartbeatConfig::default(),
            cancel,
        }
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Sets the heartbeat timing.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Runs until cancelled or until the connection fails for good.
    ///
    /// # Errors
    ///
    /// - [`Error::Auth`] if the server rejects the credentials
    /// - [`Error::ReconnectExhausted`] if the reconnection policy gives up
    pub async fn run(self) -> Result<(), Error> {
        let mut attempt: u32 = 0;
        self.session.set_connection_state(ConnectionState::Connecting);

        let result = loop {
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break Ok(()),
                result = self.connect_and_read(&mut attempt) => result,
            };

            match outcome {
                Ok(()) => {
                    tracing::info!("Push channel disconnected cleanly");
                }
                Err(Error::Auth(reason)) => {
                    tracing::error!(reason = %reason, "Push channel rejected credentials");
                    self.session
                        .set_connection_state(ConnectionState::Failed(format!("authentication failed: {reason}")));
                    break Err(Error::Auth(reason));
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Push channel error");
                }
            }

            if !self.reconnection.should_retry(attempt) {
                tracing::error!(attempts = attempt, "Push channel reconnection limit reached, giving up");
                self.session.set_connection_state(ConnectionState::Failed(format!(
                    "gave up after {attempt} reconnection attempts"
                )));
                break Err(Error::ReconnectExhausted { attempts: attempt });
            }

            let delay = self.reconnection.jittered_delay_for_attempt(attempt);
            attempt += 1;
            self.session
                .set_connection_state(ConnectionState::Reconnecting { attempt });
            tracing::info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "Waiting before reconnect"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        };

        if result.is_ok() && !self.session.connection_state().is_failed() {
            self.session
                .set_connection_state(ConnectionState::Disconnected);
        }
        tracing::debug!("Push loop exiting");
        result
    }

    async fn connect_and_read(&self, attempt: &mut u32) -> Result<(), Error> {
        let url = &self.session.endpoints().push_url;
        tracing::info!(url = %url, attempt = *attempt, "Connecting to push channel");

        let mut connection = tokio::time::timeout(
            self.heartbeat.connect_timeout,
            self.transport.connect(url, self.session.token()),
        )
        .await
        .map_err(|_| ProtocolError::Timeout(millis(self.heartbeat.connect_timeout)))??;

        tracing::info!("Push channel connected");
        self.session.set_connection_state(ConnectionState::Connected);
        self.session.record_heartbeat();

        let mut ping = tokio::time::interval_at(
            Instant::now() + self.heartbeat.interval,
            self.heartbeat.interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_frame = Instant::now();

        loop {
            let deadline = last_frame + self.heartbeat.timeout;
            tokio::select! {
                frame = connection.next_frame() => match frame {
                    Some(Ok(frame)) => {
                        // Only a connection that delivers traffic clears the backoff.
                        *attempt = 0;
                        last_frame = Instant::now();
                        self.session.record_heartbeat();
                        if let PushFrame::Text(text) = frame {
                            self.route(&text).await?;
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
                _ = ping.tick() => connection.ping().await?,
                () = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        timeout_ms = millis(self.heartbeat.timeout),
                        "Push channel heartbeat lost"
                    );
                    return Err(ProtocolError::Timeout(millis(self.heartbeat.timeout)).into());
                }
            }
        }
    }

    // Malformed and non-report messages are dropped; only a closed queue
    // is an error.
    async fn route(&self, text: &str) -> Result<(), Error> {
        let message = match PushMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Discarding malformed push message");
                return Ok(());
            }
        };

        if !message.is_control_report() {
            tracing::trace!(method = %message.method, serial = %message.serial, "Ignoring push message");
            return Ok(());
        }

        let timestamp = message.reported_at().unwrap_or_else(Utc::now);
        let Some(update) = to_update(
            &self.store,
            &message.serial,
            &message.reported,
            timestamp,
            Provenance::Push,
        ) else {
            return Ok(());
        };

        self.updates
            .send(update)
            .await
            .map_err(|_| ProtocolError::ChannelClosed("telemetry queue".to_string()).into())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
