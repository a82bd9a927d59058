// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::session::Session;
use crate::state::{ApplyOutcome, Provenance, StateStore, TelemetryUpdate};
use crate::telemetry::{RawState, decode_reported, log_issues};
use crate::types::DeviceSerial;

/// Normalizes a raw report for a registered device.
///
/// Returns `None` for unknown serials and unsupported models, after logging.
pub(crate) fn to_update(
    store: &StateStore,
    serial: &DeviceSerial,
    raw: &RawState,
    timestamp: DateTime<Utc>,
    provenance: Provenance,
) -> Option<TelemetryUpdate> {
    let Some(device) = store.device(serial) else {
        tracing::warn!(serial = %serial, provenance = %provenance, "Telemetry for unknown device");
        return None;
    };

    if !device.is_supported() {
        tracing::warn!(
            serial = %serial,
            model = device.model(),
            fields = ?raw.keys().collect::<Vec<_>>(),
            "Telemetry for unsupported model"
        );
        return None;
    }

    let decoded = decode_reported(device.descriptor(), raw);
    log_issues(serial, &decoded.issues);
    if decoded.is_empty() {
        return None;
    }

    Some(
        TelemetryUpdate::new(serial.clone(), decoded.values, timestamp, provenance)
            .with_connectivity(decoded.connectivity),
    )
}

/// Applies queued telemetry until every producer is gone.
///
/// Poll results are dropped while the push channel is live.
pub(crate) async fn apply_updates(
    mut updates: mpsc::Receiver<TelemetryUpdate>,
    store: Arc<StateStore>,
    session: Session,
) {
    while let Some(update) = updates.recv().await {
        if update.provenance == Provenance::Poll && session.is_push_live() {
            tracing::trace!(serial = %update.serial, "Dropping poll result, push channel is live");
            continue;
        }

        let serial = update.serial.clone();
        match store.apply_telemetry(update) {
            ApplyOutcome::Applied(snapshot) => {
                tracing::trace!(serial = %serial, timestamp = %snapshot.timestamp(), "Telemetry applied");
            }
            ApplyOutcome::Unchanged | ApplyOutcome::Stale => {}
            ApplyOutcome::UnknownDevice => {
                tracing::warn!(serial = %serial, "Device removed before telemetry was applied");
            }
        }
    }
    tracing::debug!("Telemetry applier exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::capability::CapabilityRegistry;
    use crate::device::Device;
    use crate::push::ConnectionState;
    use crate::types::Connectivity;

    fn raw(value: serde_json::Value) -> RawState {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn store() -> Arc<StateStore> {
        let registry = CapabilityRegistry::builtin();
        let store = Arc::new(StateStore::new());
        store.upsert_device(Device::new("SN1", "DR-HTF001S", registry.lookup("DR-HTF001S")));
        store.upsert_device(Device::new("SN2", "ZZ-9000", registry.lookup("ZZ-9000")));
        store
    }

    #[test]
    fn report_is_normalized() {
        let store = store();
        let update = to_update(
            &store,
            &DeviceSerial::new("SN1"),
            &raw(json!({"poweron": true, "connected": true, "unknown": 1})),
            Utc::now(),
            Provenance::Push,
        )
        .unwrap();

        assert_eq!(update.values.len(), 1);
        assert_eq!(update.connectivity, Some(Connectivity::Online));
    }

    #[test]
    fn unknown_and_unsupported_devices_yield_nothing() {
        let store = store();
        let report = raw(json!({"poweron": true}));
        for serial in ["SN404", "SN2"] {
            assert!(
                to_update(&store, &DeviceSerial::new(serial), &report, Utc::now(), Provenance::Push)
                    .is_none()
            );
        }
    }

    #[tokio::test]
    async fn poll_results_are_dropped_while_push_is_live() {
        let store = store();
        let session = Session::from_token("abc").unwrap();
        session.set_connection_state(ConnectionState::Connected);
        let (tx, rx) = mpsc::channel(4);

        let update = to_update(
            &store,
            &DeviceSerial::new("SN1"),
            &raw(json!({"poweron": true})),
            Utc::now(),
            Provenance::Poll,
        )
        .unwrap();
        tx.send(update).await.unwrap();
        drop(tx);

        apply_updates(rx, Arc::clone(&store), session).await;
        assert!(store.snapshot(&DeviceSerial::new("SN1")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_results_are_applied_in_order() {
        let store = store();
        let session = Session::from_token("abc").unwrap();
        let (tx, rx) = mpsc::channel(4);
        let now = Utc::now();

        for (offset, on) in [(0, true), (1, false)] {
            let update = to_update(
                &store,
                &DeviceSerial::new("SN1"),
                &raw(json!({"poweron": on})),
                now + chrono::Duration::seconds(offset),
                Provenance::Push,
            )
            .unwrap();
            tx.send(update).await.unwrap();
        }
        drop(tx);

        apply_updates(rx, Arc::clone(&store), session).await;
        assert_eq!(store.snapshot(&DeviceSerial::new("SN1")).unwrap().power(), Some(false));
    }
}
