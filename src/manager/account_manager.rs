// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Account manager tying discovery, push, polling and dispatch together.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capability::CapabilityRegistry;
use crate::cloud::CloudApi;
use crate::device::Device;
use crate::discovery::{DiscoveryReport, discover};
use crate::dispatch::{CommandDispatcher, CommandOutcome, CommandTicket};
use crate::error::{Error, ProtocolError};
use crate::event::{DeviceEvent, EventBus};
use crate::push::{
    ConnectionManager, ConnectionState, HeartbeatConfig, PushTransport, apply_updates, run_poller,
};
use crate::region::resolve_token;
use crate::session::Session;
use crate::state::{StateSnapshot, StateStore};
use crate::types::{Attribute, AttributeValue, DeviceSerial};

use super::account_config::AccountConfig;

struct Tasks {
    push: JoinHandle<Result<(), Error>>,
    poller: JoinHandle<Result<(), Error>>,
    applier: JoinHandle<()>,
}

/// Manager for one cloud account.
///
/// The `AccountManager` owns the account's session, state store and
/// command dispatcher, and runs the background tasks that keep the store
/// current: the push connection, the fallback poller and the telemetry
/// applier.
///
/// Several managers can run side by side; they share nothing.
///
/// # Examples
///
/// ```no_run
/// use dreo_lib::manager::{AccountConfig, AccountManager};
/// use dreo_lib::types::{Attribute, AttributeValue};
///
/// #[tokio::main]
/// async fn main() -> dreo_lib::Result<()> {
///     let manager = AccountManager::connect(AccountConfig::new("my-token:EU"))?;
///
///     // Subscribe to events
///     let mut events = manager.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     // Register devices and start syncing
///     let report = manager.discover().await?;
///     manager.start();
///
///     // Control a device
///     if let Some(serial) = report.added.first() {
///         manager.turn_on(serial).await?;
///         manager.set_fan_speed(serial, 60).await?;
///     }
///
///     manager.shutdown();
///     manager.join().await
/// }
/// ```
pub struct AccountManager<A, T> {
    config: AccountConfig,
    session: Session,
    registry: Arc<CapabilityRegistry>,
    store: Arc<StateStore>,
    api: Arc<A>,
    transport: Arc<T>,
    dispatcher: CommandDispatcher<A>,
    cancel: CancellationToken,
    tasks: Mutex<Option<Tasks>>,
}

impl<A, T> std::fmt::Debug for AccountManager<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager")
            .field("session", &self.session)
            .field("devices", &self.store.len())
            .field("running", &self.tasks.lock().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(all(feature = "http", feature = "websocket"))]
impl AccountManager<crate::cloud::HttpCloudClient, crate::push::WebSocketTransport> {
    /// Creates a manager using the HTTP REST client and WebSocket push
    /// transport for the token's region.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTokenFormat`] if the token is malformed
    /// - [`Error::Protocol`] if the HTTP client cannot be created
    pub fn connect(config: AccountConfig) -> Result<Self, Error> {
        let resolved = resolve_token(&config.token)?;
        let endpoints = config
            .endpoints
            .clone()
            .unwrap_or_else(|| resolved.endpoints());
        let api = crate::cloud::HttpCloudConfig::new(endpoints.api_base, resolved.token.clone())
            .with_timeout(config.request_timeout)
            .into_client()?;
        Self::new(config, api, crate::push::WebSocketTransport::new())
    }
}

impl<A: CloudApi, T: PushTransport> AccountManager<A, T> {
    /// Creates a manager with the given REST client and push transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTokenFormat`] if the token is malformed.
    pub fn new(config: AccountConfig, api: A, transport: T) -> Result<Self, Error> {
        let resolved = resolve_token(&config.token)?;
        tracing::debug!(region = %resolved.region, "Account token resolved");
        let session = Session::new(resolved, config.endpoints.clone());

        let store = Arc::new(StateStore::with_event_bus(EventBus::with_capacity(
            config.event_capacity,
        )));
        let api = Arc::new(api);
        let cancel = CancellationToken::new();
        let dispatcher = CommandDispatcher::with_cancellation(
            Arc::clone(&api),
            Arc::clone(&store),
            config.dispatch.clone(),
            config.retry.clone(),
            cancel.child_token(),
        );

        Ok(Self {
            config,
            session,
            registry: Arc::new(CapabilityRegistry::builtin()),
            store,
            api,
            transport: Arc::new(transport),
            dispatcher,
            cancel,
            tasks: Mutex::new(None),
        })
    }

    /// Replaces the capability registry used by discovery.
    #[must_use]
    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the state store.
    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Returns the capability registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Returns the REST client.
    #[must_use]
    pub fn cloud(&self) -> &Arc<A> {
        &self.api
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Lists the account's devices and synchronizes the store with them.
    ///
    /// # Errors
    ///
    /// - [`Error::Auth`] if the token is rejected
    /// - [`Error::Protocol`] on network failure or timeout
    pub async fn discover(&self) -> Result<DiscoveryReport, Error> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, discover(&*self.api, &self.registry, &self.store))
            .await
            .map_err(|_| {
                ProtocolError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
            })?
    }

    /// Starts the push connection, fallback poller and telemetry applier.
    ///
    /// Does nothing if already started. Must be called within a Tokio
    /// runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel(self.config.telemetry_queue_capacity);
        // The poller cancels this when the cloud rejects the credentials.
        let sync = self.cancel.child_token();

        let applier = tokio::spawn(apply_updates(
            rx,
            Arc::clone(&self.store),
            self.session.clone(),
        ));

        let push = tokio::spawn(
            ConnectionManager::new(
                Arc::clone(&self.transport),
                self.session.clone(),
                Arc::clone(&self.store),
                tx.clone(),
                sync.child_token(),
            )
            .with_reconnection(self.config.reconnection.clone())
            .with_heartbeat(HeartbeatConfig {
                interval: self.config.heartbeat_interval,
                timeout: self.config.heartbeat_timeout,
                connect_timeout: self.config.connect_timeout,
            })
            .run(),
        );

        let poller = tokio::spawn(run_poller(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            self.session.clone(),
            tx,
            self.config.poll.clone(),
            self.config.request_timeout,
            sync,
        ));

        tracing::info!(region = %self.session.region(), "Account synchronization started");
        *tasks = Some(Tasks {
            push,
            poller,
            applier,
        });
    }

    /// Returns `true` between [`AccountManager::start`] and
    /// [`AccountManager::join`].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Stops all background work. In-flight commands are reverted.
    pub fn shutdown(&self) {
        tracing::info!("Account synchronization stopping");
        self.cancel.cancel();
    }

    /// Waits for the background tasks to finish.
    ///
    /// Returns when the push connection stops, either after
    /// [`AccountManager::shutdown`] or because it failed for good.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that stopped synchronization: [`Error::Auth`]
    /// from either the push channel or fallback polling, or
    /// [`Error::ReconnectExhausted`].
    pub async fn join(&self) -> Result<(), Error> {
        let Some(tasks) = self.tasks.lock().take() else {
            return Ok(());
        };

        let push = tasks.push.await.unwrap_or_else(|e| {
            Err(ProtocolError::ConnectionFailed(format!("push task aborted: {e}")).into())
        });
        if push.is_err() {
            // A panicked push task never marks the session failed.
            self.cancel.cancel();
        }
        let poller = tasks.poller.await.unwrap_or(Ok(()));
        if let Err(e) = &poller
            && !self.session.connection_state().is_failed()
        {
            // The push task may overwrite the state while it winds down.
            self.session
                .set_connection_state(ConnectionState::Failed(format!("polling failed: {e}")));
        }
        let _ = tasks.applier.await;
        push.and(poller)
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Returns the push connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    /// Subscribes to push connection state changes.
    #[must_use]
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.session.subscribe_connection()
    }

    /// Subscribes to device events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.store.subscribe()
    }

    /// Returns all registered devices.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.store.devices()
    }

    /// Returns one device.
    #[must_use]
    pub fn device(&self, serial: &DeviceSerial) -> Option<Device> {
        self.store.device(serial)
    }

    /// Returns the current snapshot of a device.
    #[must_use]
    pub fn snapshot(&self, serial: &DeviceSerial) -> Option<Arc<StateSnapshot>> {
        self.store.snapshot(serial)
    }

    /// Subscribes to snapshot changes of one device.
    #[must_use]
    pub fn watch(&self, serial: &DeviceSerial) -> Option<watch::Receiver<Arc<StateSnapshot>>> {
        self.store.watch(serial)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Submits an attribute change and waits for its outcome.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::submit`].
    pub async fn submit(
        &self,
        serial: &DeviceSerial,
        attribute: Attribute,
        value: AttributeValue,
    ) -> Result<CommandOutcome, Error> {
        self.dispatcher.submit(serial, attribute, value).await
    }

    /// Submits an attribute change without waiting for its outcome.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::request`].
    pub fn request(
        &self,
        serial: &DeviceSerial,
        attribute: Attribute,
        value: AttributeValue,
    ) -> Result<CommandTicket, Error> {
        self.dispatcher.request(serial, attribute, value)
    }

    /// Turns a device on.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::submit`].
    pub async fn turn_on(&self, serial: &DeviceSerial) -> Result<CommandOutcome, Error> {
        self.submit(serial, Attribute::Power, AttributeValue::Bool(true))
            .await
    }

    /// Turns a device off.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::submit`].
    pub async fn turn_off(&self, serial: &DeviceSerial) -> Result<CommandOutcome, Error> {
        self.submit(serial, Attribute::Power, AttributeValue::Bool(false))
            .await
    }

    /// Sets the fan speed as a percentage of the device's level range.
    ///
    /// `0` switches the device off; any other speed switches it on.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::submit`].
    pub async fn set_fan_speed(
        &self,
        serial: &DeviceSerial,
        percentage: u8,
    ) -> Result<CommandOutcome, Error> {
        self.submit(
            serial,
            Attribute::FanSpeed,
            AttributeValue::Percentage(percentage),
        )
        .await
    }

    /// Sets the preset mode.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::submit`].
    pub async fn set_preset_mode(
        &self,
        serial: &DeviceSerial,
        mode: &str,
    ) -> Result<CommandOutcome, Error> {
        self.submit(serial, Attribute::PresetMode, AttributeValue::from(mode))
            .await
    }
}

impl<A, T> Drop for AccountManager<A, T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
