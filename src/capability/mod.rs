// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device capabilities.
//!
//! Per-class behavior is data, not code: each product line is a
//! [`CapabilityDescriptor`] listing its attributes, raw fields and value
//! encodings. The [`CapabilityRegistry`] maps model-code prefixes to those
//! descriptors and is read-only once built.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use dreo_lib::capability::{CapabilityDescriptor, CapabilityRegistry, DeviceClass, SpeedRange};
//! use dreo_lib::types::Attribute;
//!
//! let custom = CapabilityDescriptor::builder(DeviceClass::TowerFan)
//!     .toggle(Attribute::Power, "poweron")
//!     .speed("windlevel", SpeedRange::new(1, 4))
//!     .build();
//!
//! let registry = CapabilityRegistry::builder()
//!     .register("DR-NEW", Arc::new(custom))
//!     .build();
//!
//! assert!(registry.lookup("DR-NEW001").is_supported());
//! ```

pub(crate) mod builtin;
mod descriptor;
mod registry;

pub use descriptor::{
    AttributeKind, AttributeSpec, CapabilityDescriptor, CapabilityDescriptorBuilder, Dependency,
    DeviceClass, ModeOption, ModeSet, NumericRange, SpeedRange,
};
pub use registry::{CapabilityRegistry, RegistryBuilder};
