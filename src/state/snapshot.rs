// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Immutable per-device state snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Attribute, AttributeValue};

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Reported on the push channel.
    Push,
    /// Fetched by a REST poll or by discovery.
    Poll,
    /// Applied locally by a command that has not been confirmed yet.
    Optimistic,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("push"),
            Self::Poll => f.write_str("poll"),
            Self::Optimistic => f.write_str("optimistic"),
        }
    }
}

/// A complete, internally consistent view of one device's state.
///
/// Snapshots are never mutated after publication; every update produces a
/// new one. The timestamp never decreases from one snapshot to the next.
///
/// # Examples
///
/// ```
/// use dreo_lib::state::{Provenance, StateSnapshot};
/// use dreo_lib::types::Attribute;
///
/// let snapshot = StateSnapshot::empty();
/// assert!(snapshot.is_empty());
/// assert_eq!(snapshot.power(), None);
/// assert_eq!(snapshot.provenance(), Provenance::Poll);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    values: BTreeMap<Attribute, AttributeValue>,
    sources: BTreeMap<Attribute, Provenance>,
    timestamp: DateTime<Utc>,
    provenance: Provenance,
}

impl StateSnapshot {
    /// Returns an empty snapshot stamped at the Unix epoch.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
            sources: BTreeMap::new(),
            timestamp: DateTime::UNIX_EPOCH,
            provenance: Provenance::Poll,
        }
    }

    pub(crate) fn new(
        values: BTreeMap<Attribute, AttributeValue>,
        sources: BTreeMap<Attribute, Provenance>,
        timestamp: DateTime<Utc>,
        provenance: Provenance,
    ) -> Self {
        Self {
            values,
            sources,
            timestamp,
            provenance,
        }
    }

    /// Returns the value of an attribute.
    #[must_use]
    pub fn get(&self, attribute: Attribute) -> Option<&AttributeValue> {
        self.values.get(&attribute)
    }

    /// Returns all attribute values.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<Attribute, AttributeValue> {
        &self.values
    }

    /// Returns the provenance of the value shown for an attribute.
    #[must_use]
    pub fn source(&self, attribute: Attribute) -> Option<Provenance> {
        self.sources.get(&attribute).copied()
    }

    /// Returns `true` if the attribute currently shows an unconfirmed value.
    #[must_use]
    pub fn is_optimistic(&self, attribute: Attribute) -> bool {
        self.source(attribute) == Some(Provenance::Optimistic)
    }

    /// Returns the snapshot time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the provenance of the write that produced this snapshot.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Returns `true` if no attribute has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the power switch state.
    #[must_use]
    pub fn power(&self) -> Option<bool> {
        self.get(Attribute::Power).and_then(AttributeValue::as_bool)
    }

    /// Returns the fan speed percentage.
    #[must_use]
    pub fn fan_speed(&self) -> Option<u8> {
        self.get(Attribute::FanSpeed)
            .and_then(AttributeValue::as_percentage)
    }

    /// Returns the oscillation state.
    #[must_use]
    pub fn oscillating(&self) -> Option<bool> {
        self.get(Attribute::Oscillating)
            .and_then(AttributeValue::as_bool)
    }

    /// Returns the preset mode.
    #[must_use]
    pub fn preset_mode(&self) -> Option<&str> {
        self.get(Attribute::PresetMode)
            .and_then(AttributeValue::as_mode)
    }

    /// Returns the target temperature in degrees Celsius.
    #[must_use]
    pub fn target_temperature(&self) -> Option<f64> {
        self.get(Attribute::TargetTemperature)
            .and_then(AttributeValue::as_number)
    }

    /// Returns the target relative humidity in percent.
    #[must_use]
    pub fn target_humidity(&self) -> Option<f64> {
        self.get(Attribute::TargetHumidity)
            .and_then(AttributeValue::as_number)
    }

    /// Returns the measured temperature in degrees Celsius.
    #[must_use]
    pub fn current_temperature(&self) -> Option<f64> {
        self.get(Attribute::CurrentTemperature)
            .and_then(AttributeValue::as_number)
    }

    /// Returns the measured relative humidity in percent.
    #[must_use]
    pub fn current_humidity(&self) -> Option<f64> {
        self.get(Attribute::CurrentHumidity)
            .and_then(AttributeValue::as_number)
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
