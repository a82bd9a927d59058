// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Account device discovery.
//!
//! Discovery lists the account's devices, binds each to the capability
//! descriptor of its model and registers it in the state store together
//! with its initial reported state.
//!
//! Devices whose model is unknown are registered too, with the unsupported
//! descriptor, so push traffic for them is recognized and logged rather
//! than reported as coming from an unknown serial. Devices the account no
//! longer lists are removed.
//!
//! Discovery is idempotent: running it again re-binds known serials without
//! creating duplicates.
//!
//! # Examples
//!
//! ```no_run
//! use dreo_lib::capability::CapabilityRegistry;
//! use dreo_lib::cloud::HttpCloudConfig;
//! use dreo_lib::discovery::discover;
//! use dreo_lib::state::StateStore;
//!
//! # async fn example() -> dreo_lib::Result<()> {
//! let api = HttpCloudConfig::new("https://app-api-us.dreo-tech.com", "token").into_client()?;
//! let registry = CapabilityRegistry::builtin();
//! let store = StateStore::new();
//!
//! let report = discover(&api, &registry, &store).await?;
//! println!("Found {} devices:", report.added.len());
//! for serial in &report.added {
//!     println!("  - {serial}: {:?}", store.snapshot(serial));
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use chrono::Utc;

use crate::capability::CapabilityRegistry;
use crate::cloud::CloudApi;
use crate::device::{Device, DeviceInfo};
use crate::error::Error;
use crate::state::{Provenance, StateStore, TelemetryUpdate, UpsertOutcome};
use crate::telemetry::{decode_reported, log_issues};
use crate::types::DeviceSerial;

/// What a discovery run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Serials registered for the first time.
    pub added: Vec<DeviceSerial>,
    /// Known serials that were re-bound.
    pub updated: Vec<DeviceSerial>,
    /// Serials the account no longer lists.
    pub removed: Vec<DeviceSerial>,
    /// Serials whose model is not supported. Also listed as added or updated.
    pub unsupported: Vec<DeviceSerial>,
}

impl DiscoveryReport {
    /// Returns the number of devices the account currently lists.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.added.len() + self.updated.len()
    }
}

/// Lists the account's devices and synchronizes the store with them.
///
/// # Errors
///
/// Returns the listing error unchanged, for example [`Error::Auth`] when the
/// token is rejected. The store is left untouched in that case.
pub async fn discover<A: CloudApi>(
    api: &A,
    registry: &CapabilityRegistry,
    store: &StateStore,
) -> Result<DiscoveryReport, Error> {
    let listings = api.list_devices().await?;
    let mut report = DiscoveryReport::default();
    let mut seen = HashSet::with_capacity(listings.len());

    for listing in listings {
        if listing.serial.is_empty() {
            tracing::warn!(model = %listing.model, "Skipping device listing without serial");
            continue;
        }
        if !seen.insert(listing.serial.clone()) {
            tracing::debug!(serial = %listing.serial, "Duplicate device listing");
            continue;
        }

        let descriptor = registry.lookup(&listing.model);
        let serial = listing.serial;

        if !descriptor.is_supported() {
            if store.note_unsupported(&listing.model) {
                tracing::warn!(
                    serial = %serial,
                    model = %listing.model,
                    "Unsupported device model, device will have no controls"
                );
            }
            report.unsupported.push(serial.clone());
        }

        let decoded = decode_reported(&descriptor, &listing.state);
        log_issues(&serial, &decoded.issues);

        let mut device = Device::new(serial.clone(), listing.model, descriptor).with_info(DeviceInfo {
            name: listing.name,
            module_firmware: listing.module_firmware,
            mcu_firmware: listing.mcu_firmware,
        });
        if let Some(connectivity) = decoded.connectivity {
            device = device.with_connectivity(connectivity);
        }

        match store.upsert_device(device) {
            UpsertOutcome::Added => report.added.push(serial.clone()),
            UpsertOutcome::Updated => report.updated.push(serial.clone()),
        }

        if !decoded.values.is_empty() {
            store.apply_telemetry(TelemetryUpdate::new(
                serial,
                decoded.values,
                Utc::now(),
                Provenance::Poll,
            ));
        }
    }

    for serial in store.serials() {
        if !seen.contains(&serial) && store.remove_device(&serial).is_some() {
            tracing::info!(serial = %serial, "Device no longer listed, removed");
            report.removed.push(serial);
        }
    }

    tracing::debug!(
        added = report.added.len(),
        updated = report.updated.len(),
        removed = report.removed.len(),
        unsupported = report.unsupported.len(),
        "Discovery finished"
    );
    Ok(report)
}
