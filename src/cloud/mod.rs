// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Account REST API.
//!
//! The [`CloudApi`] trait is the seam between the synchronization core and
//! the vendor's REST service. [`HttpCloudClient`] implements it over HTTPS;
//! tests substitute in-memory fakes.
//!
//! # Endpoints
//!
//! - [`HttpCloudClient`]: REST client using `reqwest` (requires the `http` feature)

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpCloudClient, HttpCloudConfig};

use std::future::Future;

use serde::Deserialize;

use crate::error::Error;
use crate::telemetry::RawState;
use crate::types::DeviceSerial;

/// One device entry of the account listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceListing {
    /// Device serial number.
    #[serde(rename = "deviceSn", alias = "sn", default)]
    pub serial: DeviceSerial,
    /// Vendor model code, for example `DR-HTF001S`.
    #[serde(default)]
    pub model: String,
    /// User-assigned display name.
    #[serde(rename = "deviceName", default)]
    pub name: Option<String>,
    /// Wi-Fi module firmware version.
    #[serde(rename = "moduleFirmwareVersion", default)]
    pub module_firmware: Option<String>,
    /// MCU firmware version.
    #[serde(rename = "mcuFirmwareVersion", default)]
    pub mcu_firmware: Option<String>,
    /// Raw reported state, when the listing includes it.
    #[serde(default)]
    pub state: RawState,
}

impl DeviceListing {
    /// Creates a listing with empty metadata and state.
    #[must_use]
    pub fn new(serial: impl Into<DeviceSerial>, model: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            model: model.into(),
            name: None,
            module_firmware: None,
            mcu_firmware: None,
            state: RawState::new(),
        }
    }

    /// Sets the raw reported state.
    #[must_use]
    pub fn with_state(mut self, state: RawState) -> Self {
        self.state = state;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Operations the synchronization core needs from the account REST API.
///
/// Every call must complete or fail within a bounded time. Implementations
/// report rejected credentials as [`Error::Auth`] and transport failures as
/// [`Error::Protocol`].
pub trait CloudApi: Send + Sync + 'static {
    /// Lists all devices registered to the account.
    fn list_devices(&self) -> impl Future<Output = Result<Vec<DeviceListing>, Error>> + Send;

    /// Fetches the raw reported state of one device.
    fn fetch_state(
        &self,
        serial: &DeviceSerial,
    ) -> impl Future<Output = Result<RawState, Error>> + Send;

    /// Sends a desired-state change. Success means the cloud accepted the
    /// command, not that the device applied it.
    fn send_command(
        &self,
        serial: &DeviceSerial,
        desired: &RawState,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_deserializes_vendor_fields() {
        let listing: DeviceListing = serde_json::from_str(
            r#"{
                "deviceSn": "SN1",
                "model": "DR-HTF001S",
                "deviceName": "Bedroom fan",
                "moduleFirmwareVersion": "1.2.0",
                "state": {"poweron": true, "windlevel": 3}
            }"#,
        )
        .unwrap();

        assert_eq!(listing.serial.as_str(), "SN1");
        assert_eq!(listing.name.as_deref(), Some("Bedroom fan"));
        assert_eq!(listing.module_firmware.as_deref(), Some("1.2.0"));
        assert!(listing.mcu_firmware.is_none());
        assert_eq!(listing.state["windlevel"], 3);
    }

    #[test]
    fn listing_tolerates_missing_fields() {
        let listing: DeviceListing = serde_json::from_str(r#"{"model": "DR-HTF001S"}"#).unwrap();
        assert!(listing.serial.is_empty());
        assert!(listing.state.is_empty());
    }
}
