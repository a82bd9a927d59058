// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state management.
//!
//! The [`StateStore`] holds one [`StateSnapshot`] per device. Snapshots are
//! immutable and shared behind an `Arc`; every write produces a new one.
//!
//! # Examples
//!
//! ```
//! use dreo_lib::capability::CapabilityRegistry;
//! use dreo_lib::device::Device;
//! use dreo_lib::dispatch::CommandId;
//! use dreo_lib::state::StateStore;
//! use dreo_lib::types::{Attribute, AttributeValue, DeviceSerial};
//!
//! let registry = CapabilityRegistry::builtin();
//! let store = StateStore::new();
//! let serial = DeviceSerial::new("SN1");
//! store.upsert_device(Device::new(serial.clone(), "DR-HTF001S", registry.lookup("DR-HTF001S")));
//!
//! let (snapshot, _confirmed) = store
//!     .apply_optimistic(&serial, Attribute::Power, AttributeValue::Bool(true), CommandId::new())
//!     .unwrap();
//! assert!(snapshot.is_optimistic(Attribute::Power));
//! ```

mod snapshot;
mod store;

pub use snapshot::{Provenance, StateSnapshot};
pub use store::{ApplyOutcome, StateStore, TelemetryUpdate, UpsertOutcome};
