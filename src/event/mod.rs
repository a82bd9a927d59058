// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for device lifecycle and state changes.
//!
//! The [`EventBus`] wraps a tokio broadcast channel. The state store
//! publishes a [`DeviceEvent`] for every device added or removed, every
//! connectivity change, and every new snapshot.
//!
//! # Examples
//!
//! ```
//! use dreo_lib::event::{DeviceEvent, EventBus};
//! use dreo_lib::types::DeviceSerial;
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(DeviceEvent::DeviceRemoved { serial: DeviceSerial::new("SN1") });
//! assert!(!rx.try_recv().unwrap().is_state_change());
//! ```

mod device_event;
mod event_bus;

pub use device_event::DeviceEvent;
pub use event_bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
