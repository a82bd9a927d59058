// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authoritative in-memory device state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, oneshot, watch};

use crate::device::Device;
use crate::dispatch::CommandId;
use crate::error::DeviceError;
use crate::event::{DeviceEvent, EventBus};
use crate::types::{Attribute, AttributeValue, Connectivity, DeviceSerial};

use super::snapshot::{Provenance, StateSnapshot};

/// Normalized telemetry for one device, ready to merge.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryUpdate {
    /// Target device.
    pub serial: DeviceSerial,
    /// Decoded attribute values.
    pub values: BTreeMap<Attribute, AttributeValue>,
    /// Connectivity, if reported.
    pub connectivity: Option<Connectivity>,
    /// Report time on the reporter's clock: the device's for push, the
    /// host's for poll. Only compared against earlier reports of the same
    /// provenance.
    pub timestamp: DateTime<Utc>,
    /// Host time the update was received.
    pub received_at: DateTime<Utc>,
    /// [`Provenance::Push`] or [`Provenance::Poll`].
    pub provenance: Provenance,
}

impl TelemetryUpdate {
    /// Creates an update received now.
    #[must_use]
    pub fn new(
        serial: impl Into<DeviceSerial>,
        values: BTreeMap<Attribute, AttributeValue>,
        timestamp: DateTime<Utc>,
        provenance: Provenance,
    ) -> Self {
        Self {
            serial: serial.into(),
            values,
            connectivity: None,
            timestamp,
            received_at: Utc::now(),
            provenance,
        }
    }

    /// Sets the reported connectivity.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Option<Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }
}

/// Result of merging a telemetry update.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// A new snapshot was published.
    Applied(Arc<StateSnapshot>),
    /// The update carried nothing new.
    Unchanged,
    /// The update is older than telemetry already applied and was dropped.
    Stale,
    /// No device with this serial is registered.
    UnknownDevice,
}

/// Result of registering a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The serial was new.
    Added,
    /// The serial was already known and has been re-bound.
    Updated,
}

#[derive(Debug)]
struct PendingOptimistic {
    value: AttributeValue,
    command_id: CommandId,
    issued_at: DateTime<Utc>,
    confirm: oneshot::Sender<()>,
}

#[derive(Debug)]
struct DeviceRecord {
    device: Device,
    snapshot: Arc<StateSnapshot>,
    // Last value per attribute that came from telemetry.
    confirmed: BTreeMap<Attribute, (AttributeValue, Provenance)>,
    pending: HashMap<Attribute, PendingOptimistic>,
    // Device clock and host clock never mix: one watermark per provenance.
    last_push_at: Option<DateTime<Utc>>,
    last_poll_at: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    fn watermark(&mut self, provenance: Provenance) -> &mut Option<DateTime<Utc>> {
        match provenance {
            Provenance::Push => &mut self.last_push_at,
            Provenance::Poll | Provenance::Optimistic => &mut self.last_poll_at,
        }
    }
}

#[derive(Debug)]
struct DeviceSlot {
    record: Mutex<DeviceRecord>,
    snapshot_tx: watch::Sender<Arc<StateSnapshot>>,
}

/// Holds one current snapshot per device and serializes writes per device.
///
/// Two paths write here: telemetry (push or poll) and optimistic command
/// updates. Every write to a device happens under that device's lock, and
/// every new snapshot is published on the device's `watch` channel and as a
/// [`DeviceEvent::StateChanged`] on the event bus.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use chrono::Utc;
/// use dreo_lib::capability::CapabilityRegistry;
/// use dreo_lib::device::Device;
/// use dreo_lib::state::{ApplyOutcome, Provenance, StateStore, TelemetryUpdate};
/// use dreo_lib::types::{Attribute, AttributeValue, DeviceSerial};
///
/// let registry = CapabilityRegistry::builtin();
/// let store = StateStore::new();
/// store.upsert_device(Device::new("SN1", "DR-HTF001S", registry.lookup("DR-HTF001S")));
///
/// let mut values = BTreeMap::new();
/// values.insert(Attribute::Power, AttributeValue::Bool(true));
/// let outcome = store.apply_telemetry(TelemetryUpdate::new(
///     "SN1",
///     values,
///     Utc::now(),
///     Provenance::Push,
/// ));
///
/// assert!(matches!(outcome, ApplyOutcome::Applied(_)));
/// assert_eq!(store.snapshot(&DeviceSerial::new("SN1")).unwrap().power(), Some(true));
/// ```
#[derive(Debug)]
pub struct StateStore {
    devices: RwLock<HashMap<DeviceSerial, Arc<DeviceSlot>>>,
    events: EventBus,
    unsupported_seen: Mutex<HashSet<String>>,
}

impl StateStore {
    /// Creates an empty store with its own event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::with_event_bus(EventBus::new())
    }

    /// Creates an empty store publishing on the given event bus.
    #[must_use]
    pub fn with_event_bus(events: EventBus) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            events,
            unsupported_seen: Mutex::new(HashSet::new()),
        }
    }

    /// Subscribes to device events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn slot(&self, serial: &DeviceSerial) -> Option<Arc<DeviceSlot>> {
        self.devices.read().get(serial).cloned()
    }

    // ========================================================================
    // Device registry
    // ========================================================================

    /// Registers a device or re-binds an existing one.
    ///
    /// Re-binding keeps the snapshot, but drops values for attributes the new
    /// descriptor does not declare.
    pub fn upsert_device(&self, device: Device) -> UpsertOutcome {
        let serial = device.serial().clone();

        if let Some(slot) = self.slot(&serial) {
            let mut record = slot.record.lock();
            let connectivity = device.connectivity();
            let descriptor = Arc::clone(device.descriptor());
            let rebound = !Arc::ptr_eq(record.device.descriptor(), &descriptor);
            record
                .device
                .rebind(Arc::clone(&descriptor), device.info().clone());

            if connectivity != Connectivity::Unknown && record.device.set_connectivity(connectivity) {
                self.events.publish(DeviceEvent::ConnectivityChanged {
                    serial: serial.clone(),
                    connectivity,
                });
            }

            if rebound {
                record.confirmed.retain(|attr, _| descriptor.has(*attr));
                record.pending.retain(|attr, _| descriptor.is_controllable(*attr));
                let previous = Arc::clone(&record.snapshot);
                if previous.values().keys().any(|attr| !descriptor.has(*attr)) {
                    let mut values = previous.values().clone();
                    let mut sources = BTreeMap::new();
                    values.retain(|attr, _| descriptor.has(*attr));
                    for attr in values.keys() {
                        if let Some(source) = previous.source(*attr) {
                            sources.insert(*attr, source);
                        }
                    }
                    let snapshot = StateSnapshot::new(
                        values,
                        sources,
                        previous.timestamp(),
                        previous.provenance(),
                    );
                    self.publish(&slot, &mut record, snapshot);
                }
            }
            return UpsertOutcome::Updated;
        }

        let (snapshot_tx, _) = watch::channel(Arc::new(StateSnapshot::empty()));
        let slot = Arc::new(DeviceSlot {
            record: Mutex::new(DeviceRecord {
                device,
                snapshot: Arc::new(StateSnapshot::empty()),
                confirmed: BTreeMap::new(),
                pending: HashMap::new(),
                last_push_at: None,
                last_poll_at: None,
            }),
            snapshot_tx,
        });

        let inserted = {
            let mut devices = self.devices.write();
            if devices.contains_key(&serial) {
                false
            } else {
                devices.insert(serial.clone(), slot);
                true
            }
        };
        if !inserted {
            // Lost a race against a concurrent upsert of the same serial.
            return UpsertOutcome::Updated;
        }

        tracing::debug!(serial = %serial, "device added");
        self.events.publish(DeviceEvent::DeviceAdded { serial });
        UpsertOutcome::Added
    }

    /// Removes a device.
    ///
    /// Pending optimistic writes are dropped, which their dispatchers observe
    /// as superseded.
    pub fn remove_device(&self, serial: &DeviceSerial) -> Option<Device> {
        let slot = self.devices.write().remove(serial)?;
        let device = slot.record.lock().device.clone();
        tracing::debug!(serial = %serial, "device removed");
        self.events.publish(DeviceEvent::DeviceRemoved {
            serial: serial.clone(),
        });
        Some(device)
    }

    /// Returns a copy of a device record.
    #[must_use]
    pub fn device(&self, serial: &DeviceSerial) -> Option<Device> {
        self.slot(serial).map(|slot| slot.record.lock().device.clone())
    }

    /// Returns copies of all device records.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        let slots: Vec<_> = self.devices.read().values().cloned().collect();
        slots
            .iter()
            .map(|slot| slot.record.lock().device.clone())
            .collect()
    }

    /// Returns the serials of all registered devices.
    #[must_use]
    pub fn serials(&self) -> Vec<DeviceSerial> {
        self.devices.read().keys().cloned().collect()
    }

    /// Returns `true` if the serial is registered.
    #[must_use]
    pub fn contains(&self, serial: &DeviceSerial) -> bool {
        self.devices.read().contains_key(serial)
    }

    /// Returns the number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Returns `true` if no device is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Records that a model is unsupported.
    ///
    /// Returns `true` the first time a model is seen, so the caller logs it
    /// once per store lifetime.
    pub fn note_unsupported(&self, model: &str) -> bool {
        self.unsupported_seen
            .lock()
            .insert(model.to_ascii_uppercase())
    }

    /// Sets a device's connectivity, publishing an event if it changed.
    pub fn set_connectivity(&self, serial: &DeviceSerial, connectivity: Connectivity) -> bool {
        let Some(slot) = self.slot(serial) else {
            return false;
        };
        let mut record = slot.record.lock();
        let changed = record.device.set_connectivity(connectivity);
        if changed {
            self.events.publish(DeviceEvent::ConnectivityChanged {
                serial: serial.clone(),
                connectivity,
            });
        }
        changed
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the current snapshot of a device.
    #[must_use]
    pub fn snapshot(&self, serial: &DeviceSerial) -> Option<Arc<StateSnapshot>> {
        self.slot(serial)
            .map(|slot| Arc::clone(&slot.record.lock().snapshot))
    }

    /// Subscribes to snapshot changes of one device.
    ///
    /// The receiver always holds the latest snapshot.
    #[must_use]
    pub fn watch(&self, serial: &DeviceSerial) -> Option<watch::Receiver<Arc<StateSnapshot>>> {
        self.slot(serial).map(|slot| slot.snapshot_tx.subscribe())
    }

    /// Returns the id of the unconfirmed command on an attribute, if any.
    #[must_use]
    pub fn pending_command(&self, serial: &DeviceSerial, attribute: Attribute) -> Option<CommandId> {
        self.slot(serial).and_then(|slot| {
            slot.record
                .lock()
                .pending
                .get(&attribute)
                .map(|pending| pending.command_id)
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    fn publish(
        &self,
        slot: &DeviceSlot,
        record: &mut DeviceRecord,
        snapshot: StateSnapshot,
    ) -> Arc<StateSnapshot> {
        let snapshot = Arc::new(snapshot);
        record.snapshot = Arc::clone(&snapshot);
        slot.snapshot_tx.send_replace(Arc::clone(&snapshot));
        self.events.publish(DeviceEvent::StateChanged {
            serial: record.device.serial().clone(),
            snapshot: Arc::clone(&snapshot),
        });
        snapshot
    }

    /// Merges push or poll telemetry.
    ///
    /// - Telemetry older than the last applied telemetry of the same
    ///   provenance is dropped.
    /// - A value matching a pending optimistic write confirms it.
    /// - A pending optimistic write issued after the telemetry was received
    ///   keeps showing.
    /// - Otherwise the telemetry value is shown.
    ///
    /// Snapshot timestamps follow the host clock (`received_at`) and never
    /// decrease.
    pub fn apply_telemetry(&self, update: TelemetryUpdate) -> ApplyOutcome {
        let Some(slot) = self.slot(&update.serial) else {
            return ApplyOutcome::UnknownDevice;
        };
        let mut record = slot.record.lock();

        let watermark = record.watermark(update.provenance);
        if watermark.is_some_and(|last| update.timestamp < last) {
            tracing::debug!(
                serial = %update.serial,
                provenance = %update.provenance,
                "dropping stale telemetry"
            );
            return ApplyOutcome::Stale;
        }
        *watermark = Some(update.timestamp);

        if let Some(connectivity) = update.connectivity
            && record.device.set_connectivity(connectivity)
        {
            self.events.publish(DeviceEvent::ConnectivityChanged {
                serial: update.serial.clone(),
                connectivity,
            });
        }

        let previous = Arc::clone(&record.snapshot);
        let descriptor = Arc::clone(record.device.descriptor());
        let mut values = previous.values().clone();
        let mut sources: BTreeMap<Attribute, Provenance> = values
            .keys()
            .filter_map(|attr| previous.source(*attr).map(|source| (*attr, source)))
            .collect();

        for (attribute, value) in update.values {
            if !descriptor.has(attribute) {
                continue;
            }
            record
                .confirmed
                .insert(attribute, (value.clone(), update.provenance));

            let shown = match record.pending.remove(&attribute) {
                Some(pending) if pending.value == value => {
                    tracing::debug!(
                        serial = %update.serial,
                        attribute = %attribute,
                        command_id = %pending.command_id,
                        "optimistic value confirmed"
                    );
                    let _ = pending.confirm.send(());
                    Some(value)
                }
                Some(pending) if update.received_at < pending.issued_at => {
                    record.pending.insert(attribute, pending);
                    None
                }
                Some(pending) => {
                    record.pending.insert(attribute, pending);
                    Some(value)
                }
                None => Some(value),
            };

            if let Some(value) = shown {
                values.insert(attribute, value);
                sources.insert(attribute, update.provenance);
            }
        }

        if values == *previous.values()
            && sources
                .iter()
                .all(|(attr, source)| previous.source(*attr) == Some(*source))
        {
            return ApplyOutcome::Unchanged;
        }

        let timestamp = previous.timestamp().max(update.received_at);
        let snapshot = StateSnapshot::new(values, sources, timestamp, update.provenance);
        ApplyOutcome::Applied(self.publish(&slot, &mut record, snapshot))
    }

    /// Shows a desired value before the device confirms it.
    ///
    /// Returns the new snapshot and a receiver that completes when matching
    /// telemetry confirms the value. The receiver observes cancellation if a
    /// newer optimistic write supersedes this one or the device is removed.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] if the serial is not registered.
    pub fn apply_optimistic(
        &self,
        serial: &DeviceSerial,
        attribute: Attribute,
        value: AttributeValue,
        command_id: CommandId,
    ) -> Result<(Arc<StateSnapshot>, oneshot::Receiver<()>), DeviceError> {
        let slot = self
            .slot(serial)
            .ok_or_else(|| DeviceError::NotFound(serial.to_string()))?;
        let mut record = slot.record.lock();

        let previous = Arc::clone(&record.snapshot);
        let issued_at = Utc::now().max(previous.timestamp());
        let (confirm, confirmed) = oneshot::channel();

        if let Some(superseded) = record.pending.insert(
            attribute,
            PendingOptimistic {
                value: value.clone(),
                command_id,
                issued_at,
                confirm,
            },
        ) {
            tracing::trace!(
                serial = %serial,
                attribute = %attribute,
                command_id = %superseded.command_id,
                "optimistic value superseded"
            );
        }

        let mut values = previous.values().clone();
        let mut sources: BTreeMap<Attribute, Provenance> = values
            .keys()
            .filter_map(|attr| previous.source(*attr).map(|source| (*attr, source)))
            .collect();
        values.insert(attribute, value);
        sources.insert(attribute, Provenance::Optimistic);

        let snapshot = StateSnapshot::new(values, sources, issued_at, Provenance::Optimistic);
        Ok((self.publish(&slot, &mut record, snapshot), confirmed))
    }

    /// Reverts an unconfirmed optimistic write.
    ///
    /// Only applies if `command_id` still owns the attribute's pending write.
    /// The attribute goes back to its last telemetry value, or is cleared if
    /// telemetry never reported it. Returns `true` if the pending write was
    /// removed.
    pub fn revert_optimistic(
        &self,
        serial: &DeviceSerial,
        attribute: Attribute,
        command_id: CommandId,
    ) -> bool {
        let Some(slot) = self.slot(serial) else {
            return false;
        };
        let mut record = slot.record.lock();

        if record
            .pending
            .get(&attribute)
            .is_none_or(|pending| pending.command_id != command_id)
        {
            return false;
        }
        record.pending.remove(&attribute);

        let previous = Arc::clone(&record.snapshot);
        if !previous.is_optimistic(attribute) {
            // Telemetry already replaced the optimistic value.
            return true;
        }

        let mut values = previous.values().clone();
        let mut sources: BTreeMap<Attribute, Provenance> = values
            .keys()
            .filter_map(|attr| previous.source(*attr).map(|source| (*attr, source)))
            .collect();
        let provenance = match record.confirmed.get(&attribute) {
            Some((value, provenance)) => {
                values.insert(attribute, value.clone());
                sources.insert(attribute, *provenance);
                *provenance
            }
            None => {
                values.remove(&attribute);
                sources.remove(&attribute);
                Provenance::Poll
            }
        };

        tracing::debug!(
            serial = %serial,
            attribute = %attribute,
            command_id = %command_id,
            "optimistic value reverted"
        );
        let timestamp = Utc::now().max(previous.timestamp());
        let snapshot = StateSnapshot::new(values, sources, timestamp, provenance);
        self.publish(&slot, &mut record, snapshot);
        true
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use chrono::Duration;

    const SERIAL: &str = "SN1";

    fn store_with_fan() -> StateStore {
        let registry = CapabilityRegistry::builtin();
        let store = StateStore::new();
        store.upsert_device(Device::new(SERIAL, "DR-HTF001S", registry.lookup("DR-HTF001S")));
        store
    }

    fn serial() -> DeviceSerial {
        DeviceSerial::new(SERIAL)
    }

    fn telemetry(
        attribute: Attribute,
        value: AttributeValue,
        timestamp: DateTime<Utc>,
    ) -> TelemetryUpdate {
        let mut values = BTreeMap::new();
        values.insert(attribute, value);
        TelemetryUpdate::new(serial(), values, timestamp, Provenance::Push)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    #[test]
    fn upsert_is_idempotent() {
        let registry = CapabilityRegistry::builtin();
        let store = StateStore::new();
        let device = Device::new(SERIAL, "DR-HTF001S", registry.lookup("DR-HTF001S"));

        assert_eq!(store.upsert_device(device.clone()), UpsertOutcome::Added);
        assert_eq!(store.upsert_device(device), UpsertOutcome::Updated);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rebinding_drops_undeclared_attributes() {
        let registry = CapabilityRegistry::builtin();
        let store = store_with_fan();
        store.apply_telemetry(telemetry(
            Attribute::Oscillating,
            AttributeValue::Bool(true),
            Utc::now(),
        ));

        store.upsert_device(Device::new(SERIAL, "DR-HTF001S", registry.lookup("DR-HHM001S")));

        let snapshot = store.snapshot(&serial()).unwrap();
        assert!(snapshot.get(Attribute::Oscillating).is_none());
    }

    #[test]
    fn unsupported_model_noted_once() {
        let store = StateStore::new();
        assert!(store.note_unsupported("XX-1"));
        assert!(!store.note_unsupported("xx-1"));
        assert!(store.note_unsupported("XX-2"));
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let registry = CapabilityRegistry::builtin();
        let store = StateStore::new();
        let mut events = store.subscribe();

        store.upsert_device(Device::new(SERIAL, "DR-HTF001S", registry.lookup("DR-HTF001S")));
        store.set_connectivity(&serial(), Connectivity::Online);
        store.remove_device(&serial());

        assert!(matches!(events.recv().await.unwrap(), DeviceEvent::DeviceAdded { .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            DeviceEvent::ConnectivityChanged {
                connectivity: Connectivity::Online,
                ..
            }
        ));
        assert!(matches!(events.recv().await.unwrap(), DeviceEvent::DeviceRemoved { .. }));
        assert!(store.is_empty());
    }

    // ========================================================================
    // Telemetry merge
    // ========================================================================

    #[test]
    fn unknown_device_is_reported() {
        let store = StateStore::new();
        let outcome = store.apply_telemetry(telemetry(
            Attribute::Power,
            AttributeValue::Bool(true),
            Utc::now(),
        ));
        assert_eq!(outcome, ApplyOutcome::UnknownDevice);
    }

    #[test]
    fn stale_telemetry_is_dropped_and_timestamps_stay_monotonic() {
        let store = store_with_fan();
        let now = Utc::now();

        store.apply_telemetry(telemetry(Attribute::Power, AttributeValue::Bool(true), now));
        let applied_at = store.snapshot(&serial()).unwrap().timestamp();
        let outcome = store.apply_telemetry(telemetry(
            Attribute::Power,
            AttributeValue::Bool(false),
            now - Duration::seconds(5),
        ));

        assert_eq!(outcome, ApplyOutcome::Stale);
        let snapshot = store.snapshot(&serial()).unwrap();
        assert_eq!(snapshot.power(), Some(true));
        assert_eq!(snapshot.timestamp(), applied_at);
    }

    #[test]
    fn push_behind_host_clock_is_not_stale_after_poll() {
        let store = store_with_fan();
        let now = Utc::now();
        let mut polled = telemetry(Attribute::Power, AttributeValue::Bool(false), now);
        polled.provenance = Provenance::Poll;
        store.apply_telemetry(polled);
        let polled_at = store.snapshot(&serial()).unwrap().timestamp();

        // The device clock runs two seconds behind the host.
        let outcome = store.apply_telemetry(telemetry(
            Attribute::Power,
            AttributeValue::Bool(true),
            now - Duration::seconds(2),
        ));

        assert!(matches!(outcome, ApplyOutcome::Applied(_)));
        let snapshot = store.snapshot(&serial()).unwrap();
        assert_eq!(snapshot.power(), Some(true));
        assert!(snapshot.timestamp() >= polled_at);
    }

    #[test]
    fn poll_is_ordered_only_against_earlier_polls() {
        let store = store_with_fan();
        let now = Utc::now();
        store.apply_telemetry(telemetry(
            Attribute::Power,
            AttributeValue::Bool(true),
            now + Duration::hours(1),
        ));

        let mut polled = telemetry(Attribute::Power, AttributeValue::Bool(false), now);
        polled.provenance = Provenance::Poll;
        assert!(matches!(store.apply_telemetry(polled.clone()), ApplyOutcome::Applied(_)));

        polled.timestamp = now - Duration::seconds(1);
        assert_eq!(store.apply_telemetry(polled), ApplyOutcome::Stale);
    }

    #[test]
    fn identical_telemetry_is_unchanged() {
        let store = store_with_fan();
        let now = Utc::now();
        store.apply_telemetry(telemetry(Attribute::Power, AttributeValue::Bool(true), now));
        let outcome = store.apply_telemetry(telemetry(
            Attribute::Power,
            AttributeValue::Bool(true),
            now + Duration::seconds(1),
        ));
        assert_eq!(outcome, ApplyOutcome::Unchanged);
    }

    #[test]
    fn undeclared_attributes_are_not_stored() {
        let store = store_with_fan();
        let outcome = store.apply_telemetry(telemetry(
            Attribute::TargetHumidity,
            AttributeValue::Number(50.0),
            Utc::now(),
        ));
        assert_eq!(outcome, ApplyOutcome::Unchanged);
    }

    // ========================================================================
    // Optimistic writes
    // ========================================================================

    #[test]
    fn optimistic_write_is_visible_immediately() {
        let store = store_with_fan();
        let id = CommandId::new();
        let (snapshot, _rx) = store
            .apply_optimistic(&serial(), Attribute::FanSpeed, AttributeValue::Percentage(55), id)
            .unwrap();

        assert_eq!(snapshot.fan_speed(), Some(55));
        assert!(snapshot.is_optimistic(Attribute::FanSpeed));
        assert_eq!(snapshot.provenance(), Provenance::Optimistic);
        assert_eq!(store.pending_command(&serial(), Attribute::FanSpeed), Some(id));
    }

    #[test]
    fn matching_telemetry_confirms_and_promotes() {
        let store = store_with_fan();
        let (_, mut rx) = store
            .apply_optimistic(
                &serial(),
                Attribute::Power,
                AttributeValue::Bool(true),
                CommandId::new(),
            )
            .unwrap();

        store.apply_telemetry(telemetry(
            Attribute::Power,
            AttributeValue::Bool(true),
            Utc::now() + Duration::seconds(1),
        ));

        assert!(rx.try_recv().is_ok());
        let snapshot = store.snapshot(&serial()).unwrap();
        assert_eq!(snapshot.source(Attribute::Power), Some(Provenance::Push));
        assert!(store.pending_command(&serial(), Attribute::Power).is_none());
    }

    #[test]
    fn older_telemetry_does_not_override_optimistic_value() {
        let store = store_with_fan();
        let before = Utc::now() - Duration::seconds(30);
        store.apply_telemetry(telemetry(Attribute::Power, AttributeValue::Bool(false), before));
        store
            .apply_optimistic(
                &serial(),
                Attribute::Power,
                AttributeValue::Bool(true),
                CommandId::new(),
            )
            .unwrap();

        // Received before the command was issued, applied after.
        let mut queued = telemetry(
            Attribute::Power,
            AttributeValue::Bool(false),
            before + Duration::seconds(1),
        );
        queued.received_at = before + Duration::seconds(1);
        store.apply_telemetry(queued);

        let snapshot = store.snapshot(&serial()).unwrap();
        assert_eq!(snapshot.power(), Some(true));
        assert!(snapshot.is_optimistic(Attribute::Power));
    }

    #[test]
    fn newer_telemetry_wins_over_optimistic_value() {
        let store = store_with_fan();
        store
            .apply_optimistic(
                &serial(),
                Attribute::Power,
                AttributeValue::Bool(true),
                CommandId::new(),
            )
            .unwrap();

        // The device timestamp is irrelevant; only the receive time counts.
        let mut report = telemetry(
            Attribute::Power,
            AttributeValue::Bool(false),
            Utc::now() - Duration::seconds(30),
        );
        report.received_at = Utc::now() + Duration::seconds(1);
        store.apply_telemetry(report);

        let snapshot = store.snapshot(&serial()).unwrap();
        assert_eq!(snapshot.power(), Some(false));
        assert_eq!(snapshot.source(Attribute::Power), Some(Provenance::Push));
    }

    #[test]
    fn newer_optimistic_write_supersedes_older() {
        let store = store_with_fan();
        let (_, mut first) = store
            .apply_optimistic(
                &serial(),
                Attribute::FanSpeed,
                AttributeValue::Percentage(20),
                CommandId::new(),
            )
            .unwrap();
        store
            .apply_optimistic(
                &serial(),
                Attribute::FanSpeed,
                AttributeValue::Percentage(80),
                CommandId::new(),
            )
            .unwrap();

        assert!(matches!(
            first.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn revert_restores_last_confirmed_value() {
        let store = store_with_fan();
        let before = Utc::now() - Duration::seconds(10);
        store.apply_telemetry(telemetry(
            Attribute::FanSpeed,
            AttributeValue::Percentage(33),
            before,
        ));
        let id = CommandId::new();
        store
            .apply_optimistic(&serial(), Attribute::FanSpeed, AttributeValue::Percentage(88), id)
            .unwrap();
        let optimistic_ts = store.snapshot(&serial()).unwrap().timestamp();

        assert!(store.revert_optimistic(&serial(), Attribute::FanSpeed, id));

        let snapshot = store.snapshot(&serial()).unwrap();
        assert_eq!(snapshot.fan_speed(), Some(33));
        assert_eq!(snapshot.source(Attribute::FanSpeed), Some(Provenance::Push));
        assert!(snapshot.timestamp() >= optimistic_ts);
    }

    #[test]
    fn revert_clears_never_reported_attribute() {
        let store = store_with_fan();
        let id = CommandId::new();
        store
            .apply_optimistic(&serial(), Attribute::Display, AttributeValue::Bool(true), id)
            .unwrap();

        assert!(store.revert_optimistic(&serial(), Attribute::Display, id));
        assert!(store.snapshot(&serial()).unwrap().get(Attribute::Display).is_none());
    }

    #[test]
    fn revert_ignores_superseded_command() {
        let store = store_with_fan();
        let old = CommandId::new();
        store
            .apply_optimistic(&serial(), Attribute::Power, AttributeValue::Bool(true), old)
            .unwrap();
        store
            .apply_optimistic(
                &serial(),
                Attribute::Power,
                AttributeValue::Bool(false),
                CommandId::new(),
            )
            .unwrap();

        assert!(!store.revert_optimistic(&serial(), Attribute::Power, old));
        assert_eq!(store.snapshot(&serial()).unwrap().power(), Some(false));
    }

    #[tokio::test]
    async fn watch_receives_every_new_snapshot() {
        let store = store_with_fan();
        let mut rx = store.watch(&serial()).unwrap();

        store.apply_telemetry(telemetry(Attribute::Power, AttributeValue::Bool(true), Utc::now()));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().power(), Some(true));
    }
}
