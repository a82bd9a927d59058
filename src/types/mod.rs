// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core value types shared by every component.
//!
//! # Types
//!
//! - [`Attribute`] - Semantic attribute names (power, fan speed, ...)
//! - [`AttributeValue`] - Typed attribute values
//! - [`DeviceSerial`] - Vendor serial number of a device
//! - [`Connectivity`] - Online/offline status reported by the cloud
//! - [`Unit`] - Wire unit of a numeric attribute

mod attribute;
mod serial;
mod value;

pub use attribute::Attribute;
pub use serial::DeviceSerial;
pub use value::{AttributeValue, Connectivity, Unit};
