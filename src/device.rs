// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device records.

use std::sync::Arc;

use crate::capability::CapabilityDescriptor;
use crate::types::{Connectivity, DeviceSerial};

/// Listing metadata kept for display and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// User-assigned device name.
    pub name: Option<String>,
    /// Wi-Fi module firmware version.
    pub module_firmware: Option<String>,
    /// Main controller firmware version.
    pub mcu_firmware: Option<String>,
}

/// A device visible to the account.
///
/// The serial and model never change. The descriptor is re-bound on each
/// discovery and connectivity follows the cloud's reports.
///
/// # Examples
///
/// ```
/// use dreo_lib::capability::CapabilityRegistry;
/// use dreo_lib::device::Device;
/// use dreo_lib::types::Connectivity;
///
/// let registry = CapabilityRegistry::builtin();
/// let device = Device::new("SN1", "DR-HTF001S", registry.lookup("DR-HTF001S"));
///
/// assert!(device.is_supported());
/// assert_eq!(device.connectivity(), Connectivity::Unknown);
/// ```
#[derive(Debug, Clone)]
pub struct Device {
    serial: DeviceSerial,
    model: String,
    descriptor: Arc<CapabilityDescriptor>,
    connectivity: Connectivity,
    info: DeviceInfo,
}

impl Device {
    /// Creates a device with unknown connectivity and no metadata.
    #[must_use]
    pub fn new(
        serial: impl Into<DeviceSerial>,
        model: impl Into<String>,
        descriptor: Arc<CapabilityDescriptor>,
    ) -> Self {
        Self {
            serial: serial.into(),
            model: model.into(),
            descriptor,
            connectivity: Connectivity::Unknown,
            info: DeviceInfo::default(),
        }
    }

    /// Sets the listing metadata.
    #[must_use]
    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.info = info;
        self
    }

    /// Sets the initial connectivity.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Returns the serial.
    #[must_use]
    pub fn serial(&self) -> &DeviceSerial {
        &self.serial
    }

    /// Returns the model code.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the bound capability descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<CapabilityDescriptor> {
        &self.descriptor
    }

    /// Returns the connectivity status.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Returns the listing metadata.
    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Returns `false` if the model matched no descriptor.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.descriptor.is_supported()
    }

    pub(crate) fn set_connectivity(&mut self, connectivity: Connectivity) -> bool {
        let changed = self.connectivity != connectivity;
        self.connectivity = connectivity;
        changed
    }

    pub(crate) fn rebind(&mut self, descriptor: Arc<CapabilityDescriptor>, info: DeviceInfo) {
        self.descriptor = descriptor;
        self.info = info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;

    #[test]
    fn unsupported_model_is_kept_visible() {
        let registry = CapabilityRegistry::builtin();
        let device = Device::new("SN9", "XX-999", registry.lookup("XX-999"));
        assert!(!device.is_supported());
        assert_eq!(device.model(), "XX-999");
        assert_eq!(device.descriptor().controllable_attributes().count(), 0);
    }

    #[test]
    fn set_connectivity_reports_change() {
        let registry = CapabilityRegistry::builtin();
        let mut device = Device::new("SN1", "DR-HHM001S", registry.lookup("DR-HHM001S"));
        assert!(device.set_connectivity(Connectivity::Online));
        assert!(!device.set_connectivity(Connectivity::Online));
    }
}
