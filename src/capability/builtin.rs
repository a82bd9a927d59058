// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Built-in descriptor table.
//!
//! Each product line is one function returning a descriptor. Model-specific
//! variants reuse a class descriptor and override single attributes.
//!
//! Panel toggles that the device ignores while off are gated on
//! `Power = true`; child lock stays operable when off.

use crate::types::{Attribute, AttributeValue, Unit};

use super::descriptor::{
    CapabilityDescriptor, CapabilityDescriptorBuilder, DeviceClass, ModeSet, NumericRange,
    SpeedRange,
};

/// Raw vendor field names.
pub(crate) mod field {
    pub const POWER: &str = "poweron";
    pub const WIND_LEVEL: &str = "windlevel";
    pub const MODE: &str = "mode";
    pub const SHAKE_HORIZON: &str = "shakehorizon";
    pub const OSC_MODE: &str = "oscmode";
    pub const OSC_ANGLE: &str = "oscangle";
    pub const DISPLAY: &str = "ledalwayson";
    pub const HVAC_MODE: &str = "hvacmode";
    pub const TARGET_TEMPERATURE: &str = "templevel";
    pub const TARGET_HUMIDITY: &str = "rhautolevel";
    pub const HEAT_LEVEL: &str = "heatlevel";
    pub const LIGHT_SWITCH: &str = "light_switch";
    pub const BRIGHTNESS: &str = "brightness";
    pub const COLOR_TEMPERATURE: &str = "colortemp";
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "rh";
    pub const CONNECTED: &str = "connected";
    pub const MUTE: &str = "muteon";
    pub const CHILD_LOCK: &str = "childlockon";
    pub const LIGHT_SENSOR: &str = "lightsensoron";
    pub const FAN_ON_TEMP_MET: &str = "fanontempmet";
    pub const AMBIENT_SWITCH: &str = "ambient_switch";
    pub const AMBIENT_MODE: &str = "atmmode";
    pub const AMBIENT_SPEED: &str = "atmspeed";
    pub const AMBIENT_THRESHOLD: &str = "rgb_humidity_threshold";
}

const FAN_MODES: &[&str] = &["normal", "natural", "sleep", "auto"];

fn ambient_fahrenheit() -> NumericRange {
    NumericRange::new(-4.0, 140.0, 1.0, Unit::Fahrenheit)
}

fn ambient_humidity() -> NumericRange {
    NumericRange::new(0.0, 100.0, 1.0, Unit::Percent)
}

fn powered() -> [AttributeValue; 1] {
    [AttributeValue::Bool(true)]
}

// Mute and child lock, present on every product line.
fn panel(builder: CapabilityDescriptorBuilder) -> CapabilityDescriptorBuilder {
    builder
        .toggle(Attribute::Mute, field::MUTE)
        .requires(Attribute::Power, &powered())
        .toggle(Attribute::ChildLock, field::CHILD_LOCK)
}

/// Every built-in prefix with its descriptor, in no particular order.
pub(crate) fn table() -> Vec<(&'static str, CapabilityDescriptor)> {
    vec![
        ("DR-HTF", tower_fan(9)),
        ("DR-HTF008S", tower_fan(12)),
        ("DR-HAF", air_circulator()),
        ("DR-HPF", pedestal_fan()),
        ("DR-HCF", ceiling_fan()),
        ("DR-HAC", air_conditioner()),
        ("DR-HHM", humidifier()),
        ("DR-HSH", heater()),
        ("DR-HEC", evaporative_cooler()),
    ]
}

fn tower_fan(levels: u8) -> CapabilityDescriptor {
    let builder = CapabilityDescriptor::builder(DeviceClass::TowerFan)
        .toggle(Attribute::Power, field::POWER)
        .speed(field::WIND_LEVEL, SpeedRange::new(1, levels))
        .modes(
            Attribute::PresetMode,
            field::MODE,
            ModeSet::indexed(1, FAN_MODES),
        )
        .toggle(Attribute::Oscillating, field::SHAKE_HORIZON)
        .toggle(Attribute::Display, field::DISPLAY)
        .toggle(Attribute::LightSensor, field::LIGHT_SENSOR)
        .requires(Attribute::Power, &powered())
        .sensor(
            Attribute::CurrentTemperature,
            field::TEMPERATURE,
            ambient_fahrenheit(),
        );
    panel(builder).build()
}

fn air_circulator() -> CapabilityDescriptor {
    let builder = CapabilityDescriptor::builder(DeviceClass::AirCirculator)
        .toggle(Attribute::Power, field::POWER)
        .speed(field::WIND_LEVEL, SpeedRange::new(1, 9))
        .modes(
            Attribute::PresetMode,
            field::MODE,
            ModeSet::indexed(1, &["normal", "natural", "sleep", "auto", "turbo"]),
        )
        .modes(
            Attribute::SwingDirection,
            field::OSC_MODE,
            ModeSet::indexed(0, &["fixed", "horizontal", "vertical", "both"]),
        )
        .toggle(Attribute::Display, field::DISPLAY)
        .toggle(Attribute::AmbientLight, field::AMBIENT_SWITCH)
        .modes(
            Attribute::AmbientLightMode,
            field::AMBIENT_MODE,
            ModeSet::named(&["SteadyOn", "Cycle", "Fade"]),
        )
        .modes(
            Attribute::AmbientLightSpeed,
            field::AMBIENT_SPEED,
            ModeSet::indexed(1, &["slow", "medium", "fast"]),
        )
        .requires(
            Attribute::AmbientLightMode,
            &[AttributeValue::from("Cycle"), AttributeValue::from("Fade")],
        );
    panel(builder).build()
}

fn pedestal_fan() -> CapabilityDescriptor {
    let builder = CapabilityDescriptor::builder(DeviceClass::PedestalFan)
        .toggle(Attribute::Power, field::POWER)
        .speed(field::WIND_LEVEL, SpeedRange::new(1, 12))
        .modes(
            Attribute::PresetMode,
            field::MODE,
            ModeSet::indexed(1, FAN_MODES),
        )
        .toggle(Attribute::Oscillating, field::SHAKE_HORIZON)
        .range(
            Attribute::OscillationAngle,
            field::OSC_ANGLE,
            NumericRange::new(30.0, 120.0, 15.0, Unit::Degrees),
        )
        .toggle(Attribute::Display, field::DISPLAY);
    panel(builder).build()
}

fn ceiling_fan() -> CapabilityDescriptor {
    let builder = CapabilityDescriptor::builder(DeviceClass::CeilingFan)
        .toggle(Attribute::Power, field::POWER)
        .speed(field::WIND_LEVEL, SpeedRange::new(1, 12))
        .modes(
            Attribute::PresetMode,
            field::MODE,
            ModeSet::indexed(1, &["normal", "natural", "sleep", "reverse"]),
        )
        .toggle(Attribute::LightPower, field::LIGHT_SWITCH)
        .range(
            Attribute::LightBrightness,
            field::BRIGHTNESS,
            NumericRange::new(1.0, 100.0, 1.0, Unit::Percent),
        )
        .range(
            Attribute::LightColorTemperature,
            field::COLOR_TEMPERATURE,
            NumericRange::new(0.0, 100.0, 1.0, Unit::Percent),
        );
    panel(builder).build()
}

fn air_conditioner() -> CapabilityDescriptor {
    let builder = CapabilityDescriptor::builder(DeviceClass::AirConditioner)
        .toggle(Attribute::Power, field::POWER)
        .speed(field::WIND_LEVEL, SpeedRange::new(1, 3))
        .modes(
            Attribute::HvacMode,
            field::HVAC_MODE,
            ModeSet::indexed(1, &["cool", "dry", "fan_only"]),
        )
        .modes(
            Attribute::PresetMode,
            field::MODE,
            ModeSet::indexed(1, &["normal", "sleep", "eco"]),
        )
        .range(
            Attribute::TargetTemperature,
            field::TARGET_TEMPERATURE,
            NumericRange::new(64.0, 86.0, 1.0, Unit::Fahrenheit),
        )
        .requires(Attribute::HvacMode, &[AttributeValue::from("cool")])
        .range(
            Attribute::TargetHumidity,
            field::TARGET_HUMIDITY,
            NumericRange::new(30.0, 80.0, 5.0, Unit::Percent),
        )
        .requires(Attribute::HvacMode, &[AttributeValue::from("dry")])
        .toggle(Attribute::Oscillating, field::SHAKE_HORIZON)
        .toggle(Attribute::Display, field::DISPLAY)
        .sensor(
            Attribute::CurrentTemperature,
            field::TEMPERATURE,
            ambient_fahrenheit(),
        )
        .sensor(Attribute::CurrentHumidity, field::HUMIDITY, ambient_humidity());
    panel(builder).build()
}

fn humidifier() -> CapabilityDescriptor {
    let builder = CapabilityDescriptor::builder(DeviceClass::Humidifier)
        .toggle(Attribute::Power, field::POWER)
        .modes(
            Attribute::PresetMode,
            field::MODE,
            ModeSet::indexed(0, &["manual", "auto", "sleep"]),
        )
        .range(
            Attribute::TargetHumidity,
            field::TARGET_HUMIDITY,
            NumericRange::new(30.0, 90.0, 1.0, Unit::Percent),
        )
        .toggle(Attribute::Display, field::DISPLAY)
        .toggle(Attribute::AmbientLight, field::AMBIENT_SWITCH)
        .span(
            Attribute::AmbientHumidityThresholds,
            field::AMBIENT_THRESHOLD,
            NumericRange::new(0.0, 100.0, 1.0, Unit::Percent),
        )
        .requires(Attribute::AmbientLight, &[AttributeValue::Bool(true)])
        .sensor(Attribute::CurrentHumidity, field::HUMIDITY, ambient_humidity());
    panel(builder).build()
}

fn heater() -> CapabilityDescriptor {
    let builder = CapabilityDescriptor::builder(DeviceClass::Heater)
        .toggle(Attribute::Power, field::POWER)
        .modes(
            Attribute::PresetMode,
            field::MODE,
            ModeSet::named(&["hotair", "eco", "coolair"]),
        )
        .range(
            Attribute::HeatLevel,
            field::HEAT_LEVEL,
            NumericRange::new(1.0, 3.0, 1.0, Unit::Level),
        )
        .range(
            Attribute::TargetTemperature,
            field::TARGET_TEMPERATURE,
            NumericRange::new(41.0, 95.0, 1.0, Unit::Fahrenheit),
        )
        .toggle(Attribute::Oscillating, field::SHAKE_HORIZON)
        .toggle(Attribute::Display, field::DISPLAY)
        .toggle(Attribute::FanOnTempMet, field::FAN_ON_TEMP_MET)
        .requires(Attribute::Power, &powered())
        .sensor(
            Attribute::CurrentTemperature,
            field::TEMPERATURE,
            ambient_fahrenheit(),
        );
    panel(builder).build()
}

fn evaporative_cooler() -> CapabilityDescriptor {
    let builder = CapabilityDescriptor::builder(DeviceClass::EvaporativeCooler)
        .toggle(Attribute::Power, field::POWER)
        .speed(field::WIND_LEVEL, SpeedRange::new(1, 4))
        .modes(
            Attribute::PresetMode,
            field::MODE,
            ModeSet::indexed(1, FAN_MODES),
        )
        .toggle(Attribute::Oscillating, field::SHAKE_HORIZON)
        .range(
            Attribute::TargetHumidity,
            field::TARGET_HUMIDITY,
            NumericRange::new(30.0, 90.0, 5.0, Unit::Percent),
        )
        .sensor(
            Attribute::CurrentTemperature,
            field::TEMPERATURE,
            ambient_fahrenheit(),
        )
        .sensor(Attribute::CurrentHumidity, field::HUMIDITY, ambient_humidity());
    panel(builder).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::AttributeKind;

    #[test]
    fn every_entry_is_supported_and_has_power() {
        for (prefix, descriptor) in table() {
            assert!(descriptor.is_supported(), "{prefix}");
            assert!(descriptor.is_controllable(Attribute::Power), "{prefix}");
        }
    }

    #[test]
    fn raw_fields_are_unique_per_descriptor() {
        for (prefix, descriptor) in table() {
            let mut fields: Vec<_> = descriptor.attributes().iter().map(|s| &s.field).collect();
            let total = fields.len();
            fields.sort();
            fields.dedup();
            assert_eq!(fields.len(), total, "{prefix}");
        }
    }

    #[test]
    fn air_conditioner_gates_targets_on_hvac_mode() {
        let ac = air_conditioner();
        let temp = ac.spec(Attribute::TargetTemperature).unwrap();
        assert_eq!(
            temp.requires.as_ref().unwrap().allowed,
            vec![AttributeValue::from("cool")]
        );
        let humidity = ac.spec(Attribute::TargetHumidity).unwrap();
        assert!(matches!(
            humidity.kind,
            AttributeKind::Range(NumericRange { step, .. }) if (step - 5.0).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn every_line_has_mute_gated_on_power_and_an_ungated_child_lock() {
        for (prefix, descriptor) in table() {
            let mute = descriptor.spec(Attribute::Mute).unwrap();
            let dep = mute.requires.as_ref().unwrap();
            assert_eq!(dep.attribute, Attribute::Power, "{prefix}");
            assert!(dep.is_satisfied_by(Some(&AttributeValue::Bool(true))), "{prefix}");
            assert!(!dep.is_satisfied_by(Some(&AttributeValue::Bool(false))), "{prefix}");
            let lock = descriptor.spec(Attribute::ChildLock).unwrap();
            assert!(lock.requires.is_none(), "{prefix}");
        }
    }

    #[test]
    fn humidifier_thresholds_follow_the_ambient_light() {
        let humidifier = humidifier();
        let thresholds = humidifier.spec(Attribute::AmbientHumidityThresholds).unwrap();
        assert!(matches!(thresholds.kind, AttributeKind::Span(_)));
        assert_eq!(
            thresholds.requires.as_ref().unwrap().attribute,
            Attribute::AmbientLight
        );
    }

    #[test]
    fn circulator_light_speed_needs_an_animated_effect() {
        let circulator = air_circulator();
        let speed = circulator.spec(Attribute::AmbientLightSpeed).unwrap();
        let dep = speed.requires.as_ref().unwrap();
        assert!(dep.is_satisfied_by(Some(&AttributeValue::from("Fade"))));
        assert!(!dep.is_satisfied_by(Some(&AttributeValue::from("SteadyOn"))));
    }

    #[test]
    fn tower_fan_variant_has_twelve_levels() {
        assert_eq!(tower_fan(12).speed_range().unwrap().count(), 12);
    }
}
