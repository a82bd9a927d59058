// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-account session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Error;
use crate::push::ConnectionState;
use crate::region::{Endpoints, Region, ResolvedToken, resolve_token};

/// Credentials, endpoints and push connection state of one account.
///
/// A session is cheap to clone; clones share state. The connection manager
/// is the only writer of the connection state, everything else reads it.
///
/// # Examples
///
/// ```
/// use dreo_lib::session::Session;
/// use dreo_lib::region::Region;
///
/// let session = Session::from_token("abc123:EU").unwrap();
/// assert_eq!(session.region(), Region::Eu);
/// assert!(!session.is_push_live());
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    region: Region,
    endpoints: Endpoints,
    token: String,
    state_tx: watch::Sender<ConnectionState>,
    last_heartbeat: Mutex<Option<Instant>>,
    disconnected_since: Mutex<Option<Instant>>,
}

impl Session {
    /// Creates a session from a resolved token.
    ///
    /// `endpoints` overrides the region's default endpoints.
    #[must_use]
    pub fn new(resolved: ResolvedToken, endpoints: Option<Endpoints>) -> Self {
        let endpoints = endpoints.unwrap_or_else(|| resolved.endpoints());
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                region: resolved.region,
                endpoints,
                token: resolved.token,
                state_tx,
                last_heartbeat: Mutex::new(None),
                disconnected_since: Mutex::new(Some(Instant::now())),
            }),
        }
    }

    /// Resolves a raw token and creates a session for its region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTokenFormat`] if the token is malformed.
    pub fn from_token(raw: &str) -> Result<Self, Error> {
        Ok(Self::new(resolve_token(raw)?, None))
    }

    /// Returns the account region.
    #[must_use]
    pub fn region(&self) -> Region {
        self.inner.region
    }

    /// Returns the endpoints in use.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    pub(crate) fn token(&self) -> &str {
        &self.inner.token
    }

    /// Returns the current push connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribes to push connection state changes.
    #[must_use]
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Returns `true` while the push channel is connected.
    #[must_use]
    pub fn is_push_live(&self) -> bool {
        self.inner.state_tx.borrow().is_connected()
    }

    /// Returns how long the push channel has been down, or `None` while it
    /// is connected.
    #[must_use]
    pub fn disconnected_for(&self) -> Option<Duration> {
        self.inner
            .disconnected_since
            .lock()
            .map(|since| since.elapsed())
    }

    /// Returns the time of the last frame received on the push channel.
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<Instant> {
        *self.inner.last_heartbeat.lock()
    }

    pub(crate) fn record_heartbeat(&self) {
        *self.inner.last_heartbeat.lock() = Some(Instant::now());
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        {
            let mut since = self.inner.disconnected_since.lock();
            if state.is_connected() {
                *since = None;
            } else if since.is_none() {
                *since = Some(Instant::now());
            }
        }
        self.inner.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = %current, to = %state, "Push connection state changed");
            *current = state;
            true
        });
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("region", &self.inner.region)
            .field("endpoints", &self.inner.endpoints)
            .field("token", &"<redacted>")
            .field("connection_state", &*self.inner.state_tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_override_wins() {
        let resolved = resolve_token("abc:EU").unwrap();
        let session = Session::new(
            resolved,
            Some(Endpoints::new("http://127.0.0.1:1", "ws://127.0.0.1:2")),
        );
        assert_eq!(session.region(), Region::Eu);
        assert_eq!(session.endpoints().api_base, "http://127.0.0.1:1");
        assert_eq!(session.token(), "abc");
    }

    #[test]
    fn malformed_token_fails() {
        assert!(matches!(
            Session::from_token("abc:XX"),
            Err(Error::InvalidTokenFormat(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnection_is_timed() {
        let session = Session::from_token("abc").unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(session.disconnected_for().unwrap() >= Duration::from_secs(5));

        session.set_connection_state(ConnectionState::Connected);
        assert!(session.is_push_live());
        assert!(session.disconnected_for().is_none());

        session.set_connection_state(ConnectionState::Reconnecting { attempt: 1 });
        tokio::time::advance(Duration::from_secs(2)).await;
        session.set_connection_state(ConnectionState::Reconnecting { attempt: 2 });
        let down = session.disconnected_for().unwrap();
        assert!(down >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn state_changes_are_published_once() {
        let session = Session::from_token("abc").unwrap();
        let mut rx = session.subscribe_connection();

        session.set_connection_state(ConnectionState::Connecting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);

        session.set_connection_state(ConnectionState::Connecting);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn debug_redacts_token() {
        let session = Session::from_token("secret-value:NA").unwrap();
        assert!(!format!("{session:?}").contains("secret-value"));
    }
}
