// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capability descriptors.
//!
//! A [`CapabilityDescriptor`] lists every attribute a device class exposes,
//! the raw vendor field carrying it, and the encoding of its values. All
//! ranges are expressed in raw vendor units; conversion to semantic units
//! happens in the telemetry normalizer.

use std::fmt;

use serde_json::Value;

use crate::types::{Attribute, AttributeValue, Unit};

/// Product line a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Tower fan.
    TowerFan,
    /// Air circulator.
    AirCirculator,
    /// Pedestal fan.
    PedestalFan,
    /// Ceiling fan with light.
    CeilingFan,
    /// Portable air conditioner.
    AirConditioner,
    /// Humidifier.
    Humidifier,
    /// Space heater.
    Heater,
    /// Hybrid evaporative cooler.
    EvaporativeCooler,
    /// No descriptor matched the model.
    Unsupported,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TowerFan => "tower fan",
            Self::AirCirculator => "air circulator",
            Self::PedestalFan => "pedestal fan",
            Self::CeilingFan => "ceiling fan",
            Self::AirConditioner => "air conditioner",
            Self::Humidifier => "humidifier",
            Self::Heater => "heater",
            Self::EvaporativeCooler => "evaporative cooler",
            Self::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// Ordered discrete speed levels `low..=high`.
///
/// Levels map onto a percentage scale: level `low` is the smallest non-zero
/// percentage and level `high` is 100%.
///
/// # Examples
///
/// ```
/// use dreo_lib::capability::SpeedRange;
///
/// let range = SpeedRange::new(1, 6);
/// assert_eq!(range.count(), 6);
/// assert_eq!(range.level_to_percentage(3), 50);
/// assert_eq!(range.percentage_to_level(50), 3);
/// assert_eq!(range.percentage_to_level(51), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedRange {
    low: u8,
    high: u8,
}

impl SpeedRange {
    /// Creates a speed range, swapping the bounds if given in reverse.
    #[must_use]
    pub const fn new(low: u8, high: u8) -> Self {
        if low <= high {
            Self { low, high }
        } else {
            Self {
                low: high,
                high: low,
            }
        }
    }

    /// Returns the lowest level.
    #[must_use]
    pub const fn low(&self) -> u8 {
        self.low
    }

    /// Returns the highest level.
    #[must_use]
    pub const fn high(&self) -> u8 {
        self.high
    }

    /// Returns the canonical number of levels.
    #[must_use]
    pub const fn count(&self) -> u8 {
        self.high - self.low + 1
    }

    /// Returns `true` if the level lies within the range.
    #[must_use]
    pub fn contains(&self, level: i64) -> bool {
        (i64::from(self.low)..=i64::from(self.high)).contains(&level)
    }

    /// Clamps a raw level into the range.
    #[must_use]
    pub fn clamp(&self, level: i64) -> u8 {
        let clamped = level.clamp(i64::from(self.low), i64::from(self.high));
        u8::try_from(clamped).unwrap_or(self.high)
    }

    /// Converts a level to a percentage, rounding down.
    ///
    /// Levels outside the range are clamped first.
    #[must_use]
    pub fn level_to_percentage(&self, level: u8) -> u8 {
        let level = self.clamp(i64::from(level));
        let offset = u32::from(level - self.low + 1);
        let pct = offset * 100 / u32::from(self.count());
        u8::try_from(pct).unwrap_or(100)
    }

    /// Converts a percentage in `1..=100` to a level, rounding up.
    #[must_use]
    pub fn percentage_to_level(&self, percentage: u8) -> u8 {
        let pct = u32::from(percentage.clamp(1, 100));
        let count = u32::from(self.count());
        let offset = (pct * count).div_ceil(100);
        let level = offset + u32::from(self.low) - 1;
        u8::try_from(level).map_or(self.high, |level| level.clamp(self.low, self.high))
    }
}

/// A numeric range in raw vendor units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    /// Smallest raw value.
    pub min: f64,
    /// Largest raw value.
    pub max: f64,
    /// Raw step between valid values.
    pub step: f64,
    /// Unit of the raw values.
    pub unit: Unit,
}

impl NumericRange {
    /// Creates a range with the given bounds, step and unit.
    #[must_use]
    pub const fn new(min: f64, max: f64, step: f64, unit: Unit) -> Self {
        Self {
            min,
            max,
            step,
            unit,
        }
    }

    /// Clamps a raw value into the range.
    #[must_use]
    pub fn clamp(&self, raw: f64) -> f64 {
        raw.clamp(self.min, self.max)
    }

    /// Snaps a raw value onto the nearest step, counted from `min`.
    #[must_use]
    pub fn snap(&self, raw: f64) -> f64 {
        if self.step <= 0.0 {
            return raw;
        }
        self.min + ((raw - self.min) / self.step).round() * self.step
    }

    /// Returns `true` if raw values in this range are always integral.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        self.min.fract() == 0.0 && self.step.fract() == 0.0
    }

    /// Returns the bounds in the semantic unit.
    #[must_use]
    pub fn semantic_bounds(&self) -> (f64, f64) {
        (
            self.unit.to_semantic(self.min),
            self.unit.to_semantic(self.max),
        )
    }
}

/// One member of a mode enumeration and its raw encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeOption {
    /// Semantic mode name.
    pub name: String,
    /// Raw value sent and reported by the cloud.
    pub raw: Value,
}

/// A closed enumeration of modes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModeSet {
    options: Vec<ModeOption>,
}

impl ModeSet {
    /// Creates a mode set encoded as consecutive integers starting at `first`.
    #[must_use]
    pub fn indexed(first: i64, names: &[&str]) -> Self {
        let options = names
            .iter()
            .zip(first..)
            .map(|(name, index)| ModeOption {
                name: (*name).to_string(),
                raw: Value::from(index),
            })
            .collect();
        Self { options }
    }

    /// Creates a mode set encoded by name.
    #[must_use]
    pub fn named(names: &[&str]) -> Self {
        let options = names
            .iter()
            .map(|name| ModeOption {
                name: (*name).to_string(),
                raw: Value::from(*name),
            })
            .collect();
        Self { options }
    }

    /// Returns the options in declaration order.
    #[must_use]
    pub fn options(&self) -> &[ModeOption] {
        &self.options
    }

    /// Returns the mode names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|opt| opt.name.as_str())
    }

    /// Finds the option matching a raw value.
    ///
    /// Integers reported as floats (`2.0`) and strings matching
    /// case-insensitively are accepted.
    #[must_use]
    pub fn by_raw(&self, raw: &Value) -> Option<&ModeOption> {
        self.options.iter().find(|opt| match (&opt.raw, raw) {
            (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        })
    }

    /// Finds the option with a semantic name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&ModeOption> {
        self.options
            .iter()
            .find(|opt| opt.name.eq_ignore_ascii_case(name))
    }
}

/// How an attribute's values are encoded on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    /// Boolean switch.
    Toggle,
    /// Discrete speed levels exposed as a percentage.
    Speed(SpeedRange),
    /// Closed mode enumeration.
    Modes(ModeSet),
    /// Numeric range with unit and step.
    Range(NumericRange),
    /// Low and high bounds within one range, carried in a single field as
    /// `"low,high"`.
    Span(NumericRange),
}

/// Availability condition on another attribute's current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// The attribute whose value gates this one.
    pub attribute: Attribute,
    /// Values of `attribute` under which the gated attribute is controllable.
    pub allowed: Vec<AttributeValue>,
}

impl Dependency {
    /// Returns `true` if `current` satisfies the dependency.
    #[must_use]
    pub fn is_satisfied_by(&self, current: Option<&AttributeValue>) -> bool {
        current.is_some_and(|value| self.allowed.contains(value))
    }
}

/// Declaration of one attribute on a device class.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    /// Semantic attribute.
    pub attribute: Attribute,
    /// Raw vendor field carrying the attribute.
    pub field: String,
    /// Encoding of the attribute's values.
    pub kind: AttributeKind,
    /// Whether commands may target the attribute.
    pub writable: bool,
    /// Optional availability dependency.
    pub requires: Option<Dependency>,
}

/// Immutable description of what a device class can do.
///
/// Descriptors are shared behind an `Arc` by every device of the same class.
///
/// # Examples
///
/// ```
/// use dreo_lib::capability::{CapabilityDescriptor, DeviceClass, SpeedRange};
/// use dreo_lib::types::Attribute;
///
/// let fan = CapabilityDescriptor::builder(DeviceClass::TowerFan)
///     .toggle(Attribute::Power, "poweron")
///     .speed("windlevel", SpeedRange::new(1, 6))
///     .build();
///
/// assert!(fan.is_supported());
/// assert!(fan.is_controllable(Attribute::FanSpeed));
/// assert_eq!(fan.speed_range(), Some(SpeedRange::new(1, 6)));
///
/// let unknown = CapabilityDescriptor::unsupported();
/// assert_eq!(unknown.controllable_attributes().count(), 0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityDescriptor {
    class: DeviceClass,
    attributes: Vec<AttributeSpec>,
}

impl CapabilityDescriptor {
    /// Starts building a descriptor for a device class.
    #[must_use]
    pub fn builder(class: DeviceClass) -> CapabilityDescriptorBuilder {
        CapabilityDescriptorBuilder::new(class)
    }

    /// Returns the sentinel descriptor with no attributes.
    #[must_use]
    pub const fn unsupported() -> Self {
        Self {
            class: DeviceClass::Unsupported,
            attributes: Vec::new(),
        }
    }

    /// Returns the device class.
    #[must_use]
    pub const fn class(&self) -> DeviceClass {
        self.class
    }

    /// Returns `false` for the unsupported sentinel.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.class != DeviceClass::Unsupported
    }

    /// Returns all attribute declarations.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    /// Returns the declaration of an attribute.
    #[must_use]
    pub fn spec(&self, attribute: Attribute) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|spec| spec.attribute == attribute)
    }

    /// Returns the declaration carried by a raw vendor field.
    #[must_use]
    pub fn spec_for_field(&self, field: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|spec| spec.field == field)
    }

    /// Returns `true` if the attribute is declared at all.
    #[must_use]
    pub fn has(&self, attribute: Attribute) -> bool {
        self.spec(attribute).is_some()
    }

    /// Returns `true` if commands may target the attribute.
    #[must_use]
    pub fn is_controllable(&self, attribute: Attribute) -> bool {
        self.spec(attribute).is_some_and(|spec| spec.writable)
    }

    /// Iterates over the attributes commands may target.
    pub fn controllable_attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.attributes
            .iter()
            .filter(|spec| spec.writable)
            .map(|spec| spec.attribute)
    }

    /// Returns the fan speed range, if the class has one.
    #[must_use]
    pub fn speed_range(&self) -> Option<SpeedRange> {
        self.spec(Attribute::FanSpeed).and_then(|spec| match spec.kind {
            AttributeKind::Speed(range) => Some(range),
            _ => None,
        })
    }

    /// Returns the mode set of an enumerated attribute.
    #[must_use]
    pub fn modes(&self, attribute: Attribute) -> Option<&ModeSet> {
        self.spec(attribute).and_then(|spec| match &spec.kind {
            AttributeKind::Modes(modes) => Some(modes),
            _ => None,
        })
    }

    /// Returns the raw unit of a numeric attribute.
    ///
    /// This is the per-device unit metadata kept for display; stored values
    /// are always in the semantic unit.
    #[must_use]
    pub fn display_unit(&self, attribute: Attribute) -> Option<Unit> {
        self.spec(attribute).and_then(|spec| match spec.kind {
            AttributeKind::Range(range) | AttributeKind::Span(range) => Some(range.unit),
            _ => None,
        })
    }
}

/// Builder for [`CapabilityDescriptor`].
#[derive(Debug)]
pub struct CapabilityDescriptorBuilder {
    inner: CapabilityDescriptor,
}

impl CapabilityDescriptorBuilder {
    /// Creates a builder with no attributes.
    #[must_use]
    pub fn new(class: DeviceClass) -> Self {
        Self {
            inner: CapabilityDescriptor {
                class,
                attributes: Vec::new(),
            },
        }
    }

    /// Adds a fully specified attribute, replacing any earlier declaration
    /// of the same attribute.
    #[must_use]
    pub fn attribute(mut self, spec: AttributeSpec) -> Self {
        self.inner
            .attributes
            .retain(|existing| existing.attribute != spec.attribute);
        self.inner.attributes.push(spec);
        self
    }

    fn writable(self, attribute: Attribute, field: &str, kind: AttributeKind) -> Self {
        self.attribute(AttributeSpec {
            attribute,
            field: field.to_string(),
            kind,
            writable: true,
            requires: None,
        })
    }

    /// Adds a writable boolean switch.
    #[must_use]
    pub fn toggle(self, attribute: Attribute, field: &str) -> Self {
        self.writable(attribute, field, AttributeKind::Toggle)
    }

    /// Adds the fan speed attribute.
    #[must_use]
    pub fn speed(self, field: &str, range: SpeedRange) -> Self {
        self.writable(Attribute::FanSpeed, field, AttributeKind::Speed(range))
    }

    /// Adds a writable mode enumeration.
    #[must_use]
    pub fn modes(self, attribute: Attribute, field: &str, modes: ModeSet) -> Self {
        self.writable(attribute, field, AttributeKind::Modes(modes))
    }

    /// Adds a writable numeric range.
    #[must_use]
    pub fn range(self, attribute: Attribute, field: &str, range: NumericRange) -> Self {
        self.writable(attribute, field, AttributeKind::Range(range))
    }

    /// Adds a writable pair of bounds.
    #[must_use]
    pub fn span(self, attribute: Attribute, field: &str, range: NumericRange) -> Self {
        self.writable(attribute, field, AttributeKind::Span(range))
    }

    /// Adds a read-only sensor reading.
    #[must_use]
    pub fn sensor(self, attribute: Attribute, field: &str, range: NumericRange) -> Self {
        self.attribute(AttributeSpec {
            attribute,
            field: field.to_string(),
            kind: AttributeKind::Range(range),
            writable: false,
            requires: None,
        })
    }

    /// Gates the most recently added attribute on another attribute's value.
    #[must_use]
    pub fn requires(mut self, attribute: Attribute, allowed: &[AttributeValue]) -> Self {
        if let Some(last) = self.inner.attributes.last_mut() {
            last.requires = Some(Dependency {
                attribute,
                allowed: allowed.to_vec(),
            });
        }
        self
    }

    /// Builds the descriptor.
    #[must_use]
    pub fn build(self) -> CapabilityDescriptor {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_range_swaps_reversed_bounds() {
        let range = SpeedRange::new(9, 1);
        assert_eq!(range.low(), 1);
        assert_eq!(range.high(), 9);
        assert_eq!(range.count(), 9);
    }

    #[test]
    fn level_percentage_round_trip_for_every_level() {
        for (low, high) in [(1, 3), (1, 4), (1, 6), (1, 9), (1, 12), (2, 7)] {
            let range = SpeedRange::new(low, high);
            for level in low..=high {
                let pct = range.level_to_percentage(level);
                assert!((1..=100).contains(&pct));
                assert_eq!(range.percentage_to_level(pct), level, "{low}..={high}");
            }
        }
    }

    #[test]
    fn percentage_rounds_up_to_next_level() {
        let range = SpeedRange::new(1, 9);
        assert_eq!(range.percentage_to_level(1), 1);
        assert_eq!(range.percentage_to_level(12), 2);
        assert_eq!(range.percentage_to_level(100), 9);
        assert_eq!(range.level_to_percentage(9), 100);
    }

    #[test]
    fn speed_clamp() {
        let range = SpeedRange::new(1, 6);
        assert_eq!(range.clamp(0), 1);
        assert_eq!(range.clamp(7), 6);
        assert!(range.contains(4));
        assert!(!range.contains(-1));
    }

    #[test]
    fn numeric_range_snaps_to_step() {
        let range = NumericRange::new(30.0, 80.0, 5.0, Unit::Percent);
        assert!((range.snap(47.0) - 45.0).abs() < f64::EPSILON);
        assert!((range.snap(48.0) - 50.0).abs() < f64::EPSILON);
        assert!(range.is_integral());
    }

    #[test]
    fn mode_set_lookups() {
        let modes = ModeSet::indexed(1, &["normal", "natural", "sleep"]);
        assert_eq!(modes.by_raw(&Value::from(2)).unwrap().name, "natural");
        assert_eq!(modes.by_raw(&serde_json::json!(3.0)).unwrap().name, "sleep");
        assert!(modes.by_raw(&Value::from(4)).is_none());
        assert_eq!(modes.by_name("SLEEP").unwrap().raw, Value::from(3));

        let named = ModeSet::named(&["cool", "dry"]);
        assert_eq!(named.by_raw(&Value::from("Dry")).unwrap().name, "dry");
        assert_eq!(named.names().collect::<Vec<_>>(), ["cool", "dry"]);
    }

    #[test]
    fn builder_replaces_duplicate_attribute() {
        let descriptor = CapabilityDescriptor::builder(DeviceClass::PedestalFan)
            .speed("windlevel", SpeedRange::new(1, 4))
            .speed("windlevel", SpeedRange::new(1, 8))
            .build();
        assert_eq!(descriptor.attributes().len(), 1);
        assert_eq!(descriptor.speed_range(), Some(SpeedRange::new(1, 8)));
    }

    #[test]
    fn sensors_are_not_controllable() {
        let descriptor = CapabilityDescriptor::builder(DeviceClass::Humidifier)
            .sensor(
                Attribute::CurrentHumidity,
                "rh",
                NumericRange::new(0.0, 100.0, 1.0, Unit::Percent),
            )
            .build();
        assert!(descriptor.has(Attribute::CurrentHumidity));
        assert!(!descriptor.is_controllable(Attribute::CurrentHumidity));
        assert_eq!(
            descriptor.display_unit(Attribute::CurrentHumidity),
            Some(Unit::Percent)
        );
    }

    #[test]
    fn requires_applies_to_last_attribute() {
        let descriptor = CapabilityDescriptor::builder(DeviceClass::AirConditioner)
            .modes(
                Attribute::HvacMode,
                "hvacmode",
                ModeSet::indexed(1, &["cool", "dry"]),
            )
            .range(
                Attribute::TargetHumidity,
                "rhautolevel",
                NumericRange::new(30.0, 80.0, 5.0, Unit::Percent),
            )
            .requires(Attribute::HvacMode, &[AttributeValue::from("dry")])
            .build();

        let dep = descriptor
            .spec(Attribute::TargetHumidity)
            .and_then(|spec| spec.requires.as_ref())
            .unwrap();
        assert!(dep.is_satisfied_by(Some(&AttributeValue::from("dry"))));
        assert!(!dep.is_satisfied_by(Some(&AttributeValue::from("cool"))));
        assert!(!dep.is_satisfied_by(None));
        assert!(descriptor.spec(Attribute::HvacMode).unwrap().requires.is_none());
    }
}
