// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Semantic attribute names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A semantic, vendor-independent device attribute.
///
/// Raw vendor field names (`poweron`, `windlevel`, `shakehorizon`, ...) are
/// mapped onto these by the capability descriptor of each device class.
///
/// # Examples
///
/// ```
/// use dreo_lib::types::Attribute;
///
/// assert_eq!(Attribute::FanSpeed.as_str(), "fan_speed");
/// assert_eq!("oscillating".parse::<Attribute>().unwrap(), Attribute::Oscillating);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Main power switch.
    Power,
    /// Fan speed as a percentage of the device's level count.
    FanSpeed,
    /// Horizontal oscillation.
    Oscillating,
    /// Front panel display.
    Display,
    /// Preset (wind) mode.
    PresetMode,
    /// Swing direction of an air circulator.
    SwingDirection,
    /// Operating mode of an air conditioner.
    HvacMode,
    /// Target temperature, in degrees Celsius.
    TargetTemperature,
    /// Target relative humidity, in percent.
    TargetHumidity,
    /// Oscillation angle, in degrees.
    OscillationAngle,
    /// Heat level of a heater.
    HeatLevel,
    /// Light switch of a ceiling fan.
    LightPower,
    /// Light brightness of a ceiling fan.
    LightBrightness,
    /// Light color temperature of a ceiling fan.
    LightColorTemperature,
    /// Measured ambient temperature, in degrees Celsius (read-only).
    CurrentTemperature,
    /// Measured relative humidity, in percent (read-only).
    CurrentHumidity,
    /// Key beep and voice prompts muted.
    Mute,
    /// Control panel locked.
    ChildLock,
    /// Display brightness follows the light sensor.
    LightSensor,
    /// Heater keeps the fan running once the target temperature is met.
    FanOnTempMet,
    /// Ambient (RGB) light switch.
    AmbientLight,
    /// Ambient light effect.
    AmbientLightMode,
    /// Animation speed of the ambient light effect.
    AmbientLightSpeed,
    /// Humidity band shown by a humidifier's ambient light, in percent.
    AmbientHumidityThresholds,
}

impl Attribute {
    /// All known attributes, in declaration order.
    pub const ALL: [Self; 24] = [
        Self::Power,
        Self::FanSpeed,
        Self::Oscillating,
        Self::Display,
        Self::PresetMode,
        Self::SwingDirection,
        Self::HvacMode,
        Self::TargetTemperature,
        Self::TargetHumidity,
        Self::OscillationAngle,
        Self::HeatLevel,
        Self::LightPower,
        Self::LightBrightness,
        Self::LightColorTemperature,
        Self::CurrentTemperature,
        Self::CurrentHumidity,
        Self::Mute,
        Self::ChildLock,
        Self::LightSensor,
        Self::FanOnTempMet,
        Self::AmbientLight,
        Self::AmbientLightMode,
        Self::AmbientLightSpeed,
        Self::AmbientHumidityThresholds,
    ];

    /// Returns the snake_case name of the attribute.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::FanSpeed => "fan_speed",
            Self::Oscillating => "oscillating",
            Self::Display => "display",
            Self::PresetMode => "preset_mode",
            Self::SwingDirection => "swing_direction",
            Self::HvacMode => "hvac_mode",
            Self::TargetTemperature => "target_temperature",
            Self::TargetHumidity => "target_humidity",
            Self::OscillationAngle => "oscillation_angle",
            Self::HeatLevel => "heat_level",
            Self::LightPower => "light_power",
            Self::LightBrightness => "light_brightness",
            Self::LightColorTemperature => "light_color_temperature",
            Self::CurrentTemperature => "current_temperature",
            Self::CurrentHumidity => "current_humidity",
            Self::Mute => "mute",
            Self::ChildLock => "child_lock",
            Self::LightSensor => "light_sensor",
            Self::FanOnTempMet => "fan_on_temp_met",
            Self::AmbientLight => "ambient_light",
            Self::AmbientLightMode => "ambient_light_mode",
            Self::AmbientLightSpeed => "ambient_light_speed",
            Self::AmbientHumidityThresholds => "ambient_humidity_thresholds",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|attr| attr.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ParseError::InvalidValue {
                field: "attribute".to_string(),
                message: format!("unknown attribute {s:?}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for attr in Attribute::ALL {
            assert_eq!(attr.as_str().parse::<Attribute>().unwrap(), attr);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("wind_level".parse::<Attribute>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Attribute::TargetTemperature).unwrap();
        assert_eq!(json, "\"target_temperature\"");
    }
}
