// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event types.

use std::sync::Arc;

use crate::state::StateSnapshot;
use crate::types::{Connectivity, DeviceSerial};

/// Events emitted by the state store.
///
/// # Examples
///
/// ```
/// use dreo_lib::event::DeviceEvent;
/// use dreo_lib::types::{Connectivity, DeviceSerial};
///
/// let serial = DeviceSerial::new("SN1");
///
/// let added = DeviceEvent::DeviceAdded { serial: serial.clone() };
/// let offline = DeviceEvent::ConnectivityChanged {
///     serial: serial.clone(),
///     connectivity: Connectivity::Offline,
/// };
///
/// assert_eq!(added.serial(), &serial);
/// assert_eq!(offline.serial(), &serial);
/// ```
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device was discovered.
    DeviceAdded {
        /// Serial of the added device.
        serial: DeviceSerial,
    },

    /// The account no longer reports the device.
    DeviceRemoved {
        /// Serial of the removed device.
        serial: DeviceSerial,
    },

    /// The cloud reported a connectivity change.
    ConnectivityChanged {
        /// Serial of the device.
        serial: DeviceSerial,
        /// The new connectivity.
        connectivity: Connectivity,
    },

    /// A new snapshot replaced the previous one.
    StateChanged {
        /// Serial of the device.
        serial: DeviceSerial,
        /// The complete new snapshot.
        snapshot: Arc<StateSnapshot>,
    },
}

impl DeviceEvent {
    /// Returns the serial of the device the event concerns.
    #[must_use]
    pub fn serial(&self) -> &DeviceSerial {
        match self {
            Self::DeviceAdded { serial }
            | Self::DeviceRemoved { serial }
            | Self::ConnectivityChanged { serial, .. }
            | Self::StateChanged { serial, .. } => serial,
        }
    }

    /// Returns `true` if this is a state change.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(self, Self::StateChanged { .. })
    }
}
