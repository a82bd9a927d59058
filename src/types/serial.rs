// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device serial identifier type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Vendor serial number identifying a device across the REST API and the
/// push channel.
///
/// # Examples
///
/// ```
/// use dreo_lib::types::DeviceSerial;
///
/// let serial = DeviceSerial::new("HTF008S_0001");
/// assert_eq!(serial.as_str(), "HTF008S_0001");
/// ```
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceSerial(String);

impl DeviceSerial {
    /// Creates a serial from any string-like value.
    #[must_use]
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// Returns the serial as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the serial is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for DeviceSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceSerial({})", self.0)
    }
}

impl fmt::Display for DeviceSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceSerial {
    fn from(serial: &str) -> Self {
        Self::new(serial)
    }
}

impl From<String> for DeviceSerial {
    fn from(serial: String) -> Self {
        Self(serial)
    }
}

impl AsRef<str> for DeviceSerial {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
