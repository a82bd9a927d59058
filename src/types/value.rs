// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed attribute values, connectivity and units.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed, semantic attribute value.
///
/// # Examples
///
/// ```
/// use dreo_lib::types::AttributeValue;
///
/// let speed = AttributeValue::Percentage(50);
/// assert_eq!(speed.as_percentage(), Some(50));
/// assert_eq!(AttributeValue::from(true).as_bool(), Some(true));
/// assert_eq!(AttributeValue::from("sleep").as_mode(), Some("sleep"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// A boolean toggle.
    Bool(bool),
    /// A percentage in `1..=100`.
    Percentage(u8),
    /// A number in the attribute's semantic unit.
    Number(f64),
    /// A member of the attribute's mode enumeration.
    Mode(String),
    /// An inclusive pair of bounds in the attribute's semantic unit.
    Span {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },
}

impl AttributeValue {
    /// Returns the boolean value, if this is a toggle.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the percentage, if this is a percentage.
    #[must_use]
    pub fn as_percentage(&self) -> Option<u8> {
        match self {
            Self::Percentage(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the number, if this is numeric.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the mode name, if this is a mode.
    #[must_use]
    pub fn as_mode(&self) -> Option<&str> {
        match self {
            Self::Mode(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the bounds, if this is a span.
    #[must_use]
    pub fn as_span(&self) -> Option<(f64, f64)> {
        match self {
            Self::Span { low, high } => Some((*low, *high)),
            _ => None,
        }
    }

    /// Returns a short name for the value kind, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Percentage(_) => "percentage",
            Self::Number(_) => "number",
            Self::Mode(_) => "mode",
            Self::Span { .. } => "span",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("on"),
            Self::Bool(false) => f.write_str("off"),
            Self::Percentage(value) => write!(f, "{value}%"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Mode(value) => f.write_str(value),
            Self::Span { low, high } => write!(f, "{low}..={high}"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Mode(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Mode(value)
    }
}

/// Reachability of a device as reported by the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// The cloud reports the device as connected.
    Online,
    /// The cloud reports the device as disconnected.
    Offline,
    /// No connectivity information has been received yet.
    #[default]
    Unknown,
}

impl Connectivity {
    /// Maps a reported `connected` flag to a connectivity status.
    #[must_use]
    pub const fn from_connected(connected: bool) -> Self {
        if connected { Self::Online } else { Self::Offline }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Unit of a numeric attribute, as used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Degrees Celsius.
    Celsius,
    /// Degrees Fahrenheit.
    Fahrenheit,
    /// Percent (relative humidity, brightness, color temperature).
    Percent,
    /// Angular degrees.
    Degrees,
    /// A unitless level.
    Level,
}

impl Unit {
    /// Returns `true` for temperature units.
    #[must_use]
    pub const fn is_temperature(&self) -> bool {
        matches!(self, Self::Celsius | Self::Fahrenheit)
    }

    /// Converts a raw value in this unit into the semantic unit.
    ///
    /// Temperatures are normalized to Celsius; every other unit is kept.
    #[must_use]
    pub fn to_semantic(&self, raw: f64) -> f64 {
        match self {
            Self::Fahrenheit => (raw - 32.0) * 5.0 / 9.0,
            _ => raw,
        }
    }

    /// Converts a semantic value back into this unit.
    #[must_use]
    pub fn from_semantic(&self, value: f64) -> f64 {
        match self {
            Self::Fahrenheit => value * 9.0 / 5.0 + 32.0,
            _ => value,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Percent => "%",
            Self::Degrees => "°",
            Self::Level => "",
        };
        f.write_str(symbol)
    }
}
