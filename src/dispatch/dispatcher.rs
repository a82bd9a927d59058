// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Debounced command dispatch with optimistic state.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::cloud::CloudApi;
use crate::error::{DeviceError, Error, ProtocolError, ValueError};
use crate::manager::{DispatchConfig, RetryPolicy};
use crate::state::{StateSnapshot, StateStore};
use crate::telemetry::{EncodedCommand, RawState, encode_desired};
use crate::types::{Attribute, AttributeValue, DeviceSerial};

use super::command::{Command, CommandFailure, CommandId, CommandOutcome, CommandStatus};

type LaneKey = (DeviceSerial, Attribute);
type Waiter = oneshot::Sender<Result<CommandOutcome, CommandFailure>>;

// Latest desired value for a lane, plus everyone waiting on it.
struct Batch {
    command: Command,
    encoded: EncodedCommand,
    confirmed: oneshot::Receiver<()>,
    waiters: Vec<Waiter>,
    wake: Option<Wake>,
}

// Power-on sent alongside a change to a device that is off.
struct Wake {
    encoded: EncodedCommand,
    command_id: CommandId,
}

// Attributes whose change switches an idle device on.
fn wakes_device(attribute: Attribute) -> bool {
    matches!(
        attribute,
        Attribute::FanSpeed
            | Attribute::PresetMode
            | Attribute::Oscillating
            | Attribute::TargetHumidity
    )
}

// A lane exists while its driver task runs.
#[derive(Default)]
struct Lane {
    queued: Option<Batch>,
}

struct Shared<A> {
    api: Arc<A>,
    store: Arc<StateStore>,
    config: DispatchConfig,
    retry: RetryPolicy,
    lanes: Mutex<HashMap<LaneKey, Lane>>,
    cancel: CancellationToken,
}

enum Settled {
    Confirmed,
    Superseded,
}

/// Accepts attribute changes and transmits them to the cloud.
///
/// Each (device, attribute) pair is a lane with at most one command in
/// flight. A request is validated and shown optimistically at once. The
/// lane then waits for the coalescing window, and only the latest value is
/// transmitted. Requests arriving while a command is in flight are held as
/// the lane's next batch. Every caller merged into a transmission receives
/// that transmission's outcome.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use dreo_lib::cloud::HttpCloudConfig;
/// use dreo_lib::dispatch::CommandDispatcher;
/// use dreo_lib::manager::{DispatchConfig, RetryPolicy};
/// use dreo_lib::state::StateStore;
/// use dreo_lib::types::{Attribute, AttributeValue, DeviceSerial};
///
/// # async fn example() -> dreo_lib::Result<()> {
/// let api = Arc::new(HttpCloudConfig::new("https://app-api-us.dreo-tech.com", "token").into_client()?);
/// let store = Arc::new(StateStore::new());
/// let dispatcher = CommandDispatcher::new(api, store, DispatchConfig::default(), RetryPolicy::default());
///
/// let outcome = dispatcher
///     .submit(&DeviceSerial::new("SN1"), Attribute::FanSpeed, AttributeValue::Percentage(50))
///     .await?;
/// println!("confirmed: {}", outcome.confirmed);
/// # Ok(())
/// # }
/// ```
pub struct CommandDispatcher<A> {
    shared: Arc<Shared<A>>,
}

impl<A> Clone for CommandDispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A> std::fmt::Debug for CommandDispatcher<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("config", &self.shared.config)
            .field("retry", &self.shared.retry)
            .field("lanes", &self.shared.lanes.lock().len())
            .finish_non_exhaustive()
    }
}

/// A request that has been accepted and shown optimistically.
///
/// Await [`CommandTicket::outcome`] for the result of the transmission the
/// request ends up in.
#[derive(Debug)]
pub struct CommandTicket {
    serial: DeviceSerial,
    attribute: Attribute,
    snapshot: Arc<StateSnapshot>,
    receiver: oneshot::Receiver<Result<CommandOutcome, CommandFailure>>,
}

impl CommandTicket {
    /// Returns the snapshot published when the request was accepted.
    #[must_use]
    pub fn snapshot(&self) -> &Arc<StateSnapshot> {
        &self.snapshot
    }

    /// Waits for the outcome of the transmission.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::CommandTimeout`] if no confirming telemetry arrived
    /// - [`DeviceError::CommandFailed`] if the send failed or was rejected
    /// - [`Error::Auth`] if the cloud rejected the credentials
    /// - [`Error::ShuttingDown`] if the dispatcher stopped first
    pub async fn outcome(self) -> Result<CommandOutcome, Error> {
        match self.receiver.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(failure)) => Err(failure.into_error(&self.serial, self.attribute)),
            Err(_) => Err(Error::ShuttingDown),
        }
    }
}

impl<A: CloudApi> CommandDispatcher<A> {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        api: Arc<A>,
        store: Arc<StateStore>,
        config: DispatchConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_cancellation(api, store, config, retry, CancellationToken::new())
    }

    /// Creates a dispatcher that stops when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(
        api: Arc<A>,
        store: Arc<StateStore>,
        config: DispatchConfig,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                store,
                config,
                retry,
                lanes: Mutex::new(HashMap::new()),
                cancel,
            }),
        }
    }

    /// Returns the number of lanes with a command queued or in flight.
    #[must_use]
    pub fn active_lanes(&self) -> usize {
        self.shared.lanes.lock().len()
    }

    /// Stops all lanes. Queued and in-flight commands are reverted.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }

    /// Submits a change and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`CommandDispatcher::request`] and
    /// [`CommandTicket::outcome`].
    pub async fn submit(
        &self,
        serial: &DeviceSerial,
        attribute: Attribute,
        value: AttributeValue,
    ) -> Result<CommandOutcome, Error> {
        self.request(serial, attribute, value)?.outcome().await
    }

    /// Validates a change, shows it optimistically and queues it.
    ///
    /// A fan speed of 0% is a request to switch the device off. Changing
    /// the speed, preset mode, oscillation or target humidity of a device
    /// that is not on also switches it on, in the same transmission.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::NotFound`] if the serial is unknown
    /// - [`DeviceError::Unsupported`] if the model is unsupported
    /// - [`Error::Value`] if the value fails validation or the attribute's
    ///   dependency is not met; nothing is sent in that case
    /// - [`Error::ShuttingDown`] after shutdown
    pub fn request(
        &self,
        serial: &DeviceSerial,
        attribute: Attribute,
        value: AttributeValue,
    ) -> Result<CommandTicket, Error> {
        let shared = &self.shared;
        if shared.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let (attribute, value) = match (attribute, value) {
            (Attribute::FanSpeed, AttributeValue::Percentage(0)) => {
                (Attribute::Power, AttributeValue::Bool(false))
            }
            other => other,
        };

        let device = shared
            .store
            .device(serial)
            .ok_or_else(|| DeviceError::NotFound(serial.to_string()))?;
        if !device.is_supported() {
            return Err(DeviceError::Unsupported {
                model: device.model().to_string(),
            }
            .into());
        }

        let descriptor = device.descriptor();
        let encoded = encode_desired(descriptor, attribute, &value)?;

        if let Some(dependency) = descriptor
            .spec(attribute)
            .and_then(|spec| spec.requires.as_ref())
        {
            let current = shared.store.snapshot(serial);
            let current = current.as_ref().and_then(|s| s.get(dependency.attribute));
            if !dependency.is_satisfied_by(current) {
                let allowed: Vec<String> =
                    dependency.allowed.iter().map(ToString::to_string).collect();
                return Err(ValueError::InvalidAttributeValue {
                    attribute,
                    reason: format!(
                        "requires {} to be one of [{}]",
                        dependency.attribute,
                        allowed.join(", ")
                    ),
                }
                .into());
            }
        }

        let wake = if wakes_device(attribute) && descriptor.is_controllable(Attribute::Power) {
            let powered = shared
                .store
                .snapshot(serial)
                .and_then(|s| s.power())
                .unwrap_or(false);
            if powered {
                None
            } else {
                Some(encode_desired(
                    descriptor,
                    Attribute::Power,
                    &AttributeValue::Bool(true),
                )?)
            }
        } else {
            None
        };

        let command = Command::new(serial.clone(), attribute, encoded.canonical.clone());
        let (waiter, receiver) = oneshot::channel();

        let snapshot = {
            let mut lanes = shared.lanes.lock();
            let wake = match wake {
                Some(encoded) => {
                    shared.store.apply_optimistic(
                        serial,
                        Attribute::Power,
                        encoded.canonical.clone(),
                        command.id,
                    )?;
                    tracing::debug!(
                        serial = %serial,
                        attribute = %attribute,
                        command_id = %command.id,
                        "Device is off, switching it on with the command"
                    );
                    Some(Wake {
                        encoded,
                        command_id: command.id,
                    })
                }
                None => None,
            };
            let (snapshot, confirmed) = shared.store.apply_optimistic(
                serial,
                attribute,
                encoded.canonical.clone(),
                command.id,
            )?;

            tracing::debug!(
                serial = %serial,
                attribute = %attribute,
                command_id = %command.id,
                value = %command.value,
                "Command accepted"
            );

            match lanes.entry((serial.clone(), attribute)) {
                Entry::Occupied(mut lane) => {
                    let lane = lane.get_mut();
                    match lane.queued.as_mut() {
                        Some(batch) => {
                            batch.command = command;
                            batch.encoded = encoded;
                            batch.confirmed = confirmed;
                            batch.waiters.push(waiter);
                            if wake.is_some() {
                                batch.wake = wake;
                            }
                        }
                        None => {
                            lane.queued = Some(Batch {
                                command,
                                encoded,
                                confirmed,
                                waiters: vec![waiter],
                                wake,
                            });
                        }
                    }
                }
                Entry::Vacant(lane) => {
                    lane.insert(Lane {
                        queued: Some(Batch {
                            command,
                            encoded,
                            confirmed,
                            waiters: vec![waiter],
                            wake,
                        }),
                    });
                    tokio::spawn(drive(Arc::clone(shared), (serial.clone(), attribute)));
                }
            }
            snapshot
        };

        Ok(CommandTicket {
            serial: serial.clone(),
            attribute,
            snapshot,
            receiver,
        })
    }
}

async fn drive<A: CloudApi>(shared: Arc<Shared<A>>, key: LaneKey) {
    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => {
                shared.abandon(&key);
                return;
            }
            () = tokio::time::sleep(shared.config.coalesce_window) => {}
        }

        let Some(batch) = shared.take(&key) else {
            return;
        };
        let coalesced = batch.waiters.len();
        let command_id = batch.command.id;

        let wake = batch.wake.as_ref();
        let transmitted = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => None,
            result = shared.transmit(batch.command, &batch.encoded, wake, batch.confirmed) => Some(result),
        };

        let Some((command, result)) = transmitted else {
            shared.store.revert_optimistic(&key.0, key.1, command_id);
            shared.revert_wake(&key.0, wake);
            shared.abandon(&key);
            return;
        };

        let result = result.map(|settled| CommandOutcome {
            command,
            confirmed: matches!(settled, Settled::Confirmed),
            superseded: matches!(settled, Settled::Superseded),
            coalesced,
        });
        for waiter in batch.waiters {
            let _ = waiter.send(result.clone());
        }

        if !shared.has_next_or_retire(&key) {
            return;
        }
    }
}

impl<A: CloudApi> Shared<A> {
    fn take(&self, key: &LaneKey) -> Option<Batch> {
        let mut lanes = self.lanes.lock();
        let batch = lanes.get_mut(key).and_then(|lane| lane.queued.take());
        if batch.is_none() {
            lanes.remove(key);
        }
        batch
    }

    fn has_next_or_retire(&self, key: &LaneKey) -> bool {
        let mut lanes = self.lanes.lock();
        if lanes.get(key).is_some_and(|lane| lane.queued.is_some()) {
            return true;
        }
        lanes.remove(key);
        false
    }

    // Waiters of a dropped batch observe shutdown.
    fn abandon(&self, key: &LaneKey) {
        let lane = self.lanes.lock().remove(key);
        if let Some(batch) = lane.and_then(|lane| lane.queued) {
            self.store
                .revert_optimistic(&key.0, key.1, batch.command.id);
            self.revert_wake(&key.0, batch.wake.as_ref());
        }
    }

    fn revert_wake(&self, serial: &DeviceSerial, wake: Option<&Wake>) {
        if let Some(wake) = wake {
            self.store
                .revert_optimistic(serial, Attribute::Power, wake.command_id);
        }
    }

    async fn transmit(
        &self,
        mut command: Command,
        encoded: &EncodedCommand,
        wake: Option<&Wake>,
        confirmed: oneshot::Receiver<()>,
    ) -> (Command, Result<Settled, CommandFailure>) {
        let mut desired = encoded.desired();
        if let Some(wake) = wake {
            desired.extend(wake.encoded.desired());
        }

        if let Err(failure) = self.send_with_retry(&command, &desired).await {
            command.status = CommandStatus::Failed;
            self.store
                .revert_optimistic(&command.serial, command.attribute, command.id);
            self.revert_wake(&command.serial, wake);
            tracing::warn!(
                serial = %command.serial,
                attribute = %command.attribute,
                command_id = %command.id,
                failure = ?failure,
                "Command failed"
            );
            return (command, Err(failure));
        }

        command.status = CommandStatus::Acknowledged;
        tracing::debug!(
            serial = %command.serial,
            attribute = %command.attribute,
            command_id = %command.id,
            "Command acknowledged"
        );

        match tokio::time::timeout(self.config.confirmation_timeout, confirmed).await {
            Ok(Ok(())) => (command, Ok(Settled::Confirmed)),
            Ok(Err(_)) => {
                tracing::debug!(
                    serial = %command.serial,
                    attribute = %command.attribute,
                    command_id = %command.id,
                    "Command superseded before confirmation"
                );
                (command, Ok(Settled::Superseded))
            }
            Err(_) => {
                command.status = CommandStatus::TimedOut;
                self.store
                    .revert_optimistic(&command.serial, command.attribute, command.id);
                self.revert_wake(&command.serial, wake);
                let timeout_ms = millis(self.config.confirmation_timeout);
                tracing::warn!(
                    serial = %command.serial,
                    attribute = %command.attribute,
                    command_id = %command.id,
                    timeout_ms,
                    "Command not confirmed, reverted"
                );
                (command, Err(CommandFailure::Timeout { timeout_ms }))
            }
        }
    }

    async fn send_with_retry(
        &self,
        command: &Command,
        desired: &RawState,
    ) -> Result<(), CommandFailure> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(
                self.config.send_timeout,
                self.api.send_command(&command.serial, desired),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProtocolError::Timeout(millis(self.config.send_timeout)).into()),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && self.retry.should_retry(attempts) => {
                    let delay = self.retry.delay_for_retry(attempts - 1);
                    tracing::warn!(
                        serial = %command.serial,
                        attribute = %command.attribute,
                        command_id = %command.id,
                        attempt = attempts,
                        delay_ms = millis(delay),
                        error = %err,
                        "Command send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(CommandFailure::classify(&err)),
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
