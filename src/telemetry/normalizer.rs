// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation between raw vendor fields and semantic attributes.
//!
//! Decoding never fails: out-of-range numbers are clamped, unknown modes and
//! wrongly typed values are dropped, and each such event is returned as a
//! [`DataQualityIssue`]. Encoding validates against the descriptor and
//! rejects anything outside the declared ranges.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::capability::{
    AttributeKind, AttributeSpec, CapabilityDescriptor, NumericRange, builtin::field,
};
use crate::error::ValueError;
use crate::types::{Attribute, AttributeValue, Connectivity, DeviceSerial};

use super::RawState;

/// Tolerance for floating point range checks after unit conversion.
const RANGE_EPSILON: f64 = 1e-6;

/// What went wrong with a raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    /// The value was outside the declared range and has been clamped.
    Clamped {
        /// The stored value after clamping.
        stored: AttributeValue,
    },
    /// The mode is not in the declared enumeration; the value was dropped.
    UnknownMode,
    /// The value has the wrong JSON type; the value was dropped.
    TypeMismatch {
        /// The expected JSON type.
        expected: &'static str,
    },
}

/// A data-quality event raised while decoding telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct DataQualityIssue {
    /// The attribute the field maps to.
    pub attribute: Attribute,
    /// The raw vendor field.
    pub field: String,
    /// The raw value as reported.
    pub raw: Value,
    /// What happened to the value.
    pub kind: IssueKind,
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Clamped { stored } => {
                write!(f, "{}={} clamped to {stored}", self.field, self.raw)
            }
            IssueKind::UnknownMode => write!(f, "{}={} is not a known mode", self.field, self.raw),
            IssueKind::TypeMismatch { expected } => {
                write!(f, "{}={} is not a {expected}", self.field, self.raw)
            }
        }
    }
}

/// Semantic view of one raw report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedState {
    /// Decoded, in-range attribute values.
    pub values: BTreeMap<Attribute, AttributeValue>,
    /// Connectivity, if the report carried a `connected` flag.
    pub connectivity: Option<Connectivity>,
    /// Data-quality events raised while decoding.
    pub issues: Vec<DataQualityIssue>,
}

impl DecodedState {
    /// Returns `true` if the report carried nothing usable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.connectivity.is_none()
    }
}

/// A validated command ready for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCommand {
    /// The target attribute.
    pub attribute: Attribute,
    /// The raw vendor field.
    pub field: String,
    /// The raw value to send.
    pub raw: Value,
    /// The semantic value the device will report once the command applies.
    pub canonical: AttributeValue,
}

impl EncodedCommand {
    /// Returns the `desired` payload for the REST API.
    #[must_use]
    pub fn desired(&self) -> RawState {
        let mut desired = RawState::new();
        desired.insert(self.field.clone(), self.raw.clone());
        desired
    }
}

/// Decodes a raw report against a descriptor.
///
/// # Examples
///
/// ```
/// use dreo_lib::capability::CapabilityRegistry;
/// use dreo_lib::telemetry::decode_reported;
/// use dreo_lib::types::{Attribute, AttributeValue};
///
/// let registry = CapabilityRegistry::builtin();
/// let fan = registry.lookup("DR-HTF001S");
///
/// let raw = serde_json::json!({"poweron": true, "windlevel": 3, "shakehorizon": false});
/// let decoded = decode_reported(&fan, raw.as_object().unwrap());
///
/// assert_eq!(decoded.values[&Attribute::Power], AttributeValue::Bool(true));
/// assert_eq!(decoded.values[&Attribute::FanSpeed], AttributeValue::Percentage(33));
/// assert!(decoded.issues.is_empty());
/// ```
#[must_use]
pub fn decode_reported(descriptor: &CapabilityDescriptor, raw: &RawState) -> DecodedState {
    let mut decoded = DecodedState::default();

    for (name, value) in raw {
        if name == field::CONNECTED {
            match decode_flag(value) {
                Some(connected) => {
                    decoded.connectivity = Some(Connectivity::from_connected(connected));
                }
                None => tracing::trace!(field = %name, raw = %value, "ignoring non-boolean connected flag"),
            }
            continue;
        }

        let Some(spec) = descriptor.spec_for_field(name) else {
            tracing::trace!(field = %name, "ignoring unmapped field");
            continue;
        };

        match decode_value(spec, value) {
            Ok((stored, clamped)) => {
                if clamped {
                    decoded.issues.push(DataQualityIssue {
                        attribute: spec.attribute,
                        field: name.clone(),
                        raw: value.clone(),
                        kind: IssueKind::Clamped {
                            stored: stored.clone(),
                        },
                    });
                }
                decoded.values.insert(spec.attribute, stored);
            }
            Err(kind) => decoded.issues.push(DataQualityIssue {
                attribute: spec.attribute,
                field: name.clone(),
                raw: value.clone(),
                kind,
            }),
        }
    }

    decoded
}

/// Decodes a single raw value.
///
/// Returns the stored value and whether it had to be clamped.
fn decode_value(spec: &AttributeSpec, raw: &Value) -> Result<(AttributeValue, bool), IssueKind> {
    match &spec.kind {
        AttributeKind::Toggle => decode_flag(raw)
            .map(|on| (AttributeValue::Bool(on), false))
            .ok_or(IssueKind::TypeMismatch { expected: "boolean" }),
        AttributeKind::Speed(range) => {
            let level = raw
                .as_f64()
                .ok_or(IssueKind::TypeMismatch { expected: "number" })?;
            // Levels are small integers; rounding keeps `2.0` and `2` equal.
            #[allow(clippy::cast_possible_truncation)]
            let level = level.round() as i64;
            let clamped = range.clamp(level);
            Ok((
                AttributeValue::Percentage(range.level_to_percentage(clamped)),
                !range.contains(level),
            ))
        }
        AttributeKind::Modes(modes) => modes
            .by_raw(raw)
            .map(|opt| (AttributeValue::Mode(opt.name.clone()), false))
            .ok_or(IssueKind::UnknownMode),
        AttributeKind::Range(range) => {
            let value = raw
                .as_f64()
                .ok_or(IssueKind::TypeMismatch { expected: "number" })?;
            let (stored, clamped) = decode_bound(range, value);
            Ok((AttributeValue::Number(range.unit.to_semantic(stored)), clamped))
        }
        AttributeKind::Span(range) => {
            let (a, b) =
                parse_span(raw).ok_or(IssueKind::TypeMismatch { expected: "bounds pair" })?;
            let (low, low_clamped) = decode_bound(range, a.min(b));
            let (high, high_clamped) = decode_bound(range, a.max(b));
            Ok((
                AttributeValue::Span {
                    low: range.unit.to_semantic(low),
                    high: range.unit.to_semantic(high),
                },
                low_clamped || high_clamped,
            ))
        }
    }
}

// Clamps, then snaps onto the step grid. Snapping can overshoot a bound
// that is off the grid, so the result is clamped again.
fn decode_bound(range: &NumericRange, value: f64) -> (f64, bool) {
    let clamped = range.clamp(value);
    let stored = range.clamp(range.snap(clamped));
    (stored, (clamped - value).abs() > f64::EPSILON)
}

// Accepts `"40,60"` and `[40, 60]`.
fn parse_span(raw: &Value) -> Option<(f64, f64)> {
    match raw {
        Value::String(text) => {
            let (low, high) = text.split_once(',')?;
            Some((low.trim().parse().ok()?, high.trim().parse().ok()?))
        }
        Value::Array(items) if items.len() == 2 => Some((items[0].as_f64()?, items[1].as_f64()?)),
        _ => None,
    }
}

fn decode_flag(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

// Validates one semantic number against a range and returns the snapped
// raw value.
fn encode_bound(range: &NumericRange, attribute: Attribute, value: f64) -> Result<f64, ValueError> {
    if !value.is_finite() {
        return Err(ValueError::InvalidAttributeValue {
            attribute,
            reason: format!("{value} is not a finite number"),
        });
    }
    let raw = range.unit.from_semantic(value);
    if raw < range.min - RANGE_EPSILON || raw > range.max + RANGE_EPSILON {
        let (min, max) = range.semantic_bounds();
        return Err(ValueError::OutOfRange {
            attribute,
            min,
            max,
            actual: value,
        });
    }
    Ok(range.clamp(range.snap(raw)))
}

/// Validates a desired value and encodes it for transmission.
///
/// # Errors
///
/// Returns a [`ValueError`] if the attribute is not controllable on this
/// descriptor, or if the value has the wrong kind or lies outside the
/// declared range or enumeration.
///
/// # Examples
///
/// ```
/// use dreo_lib::capability::CapabilityRegistry;
/// use dreo_lib::telemetry::encode_desired;
/// use dreo_lib::types::{Attribute, AttributeValue};
///
/// let registry = CapabilityRegistry::builtin();
/// let fan = registry.lookup("DR-HTF001S");
///
/// let cmd = encode_desired(&fan, Attribute::FanSpeed, &AttributeValue::Percentage(50)).unwrap();
/// assert_eq!(cmd.field, "windlevel");
/// assert_eq!(cmd.raw, 5);
///
/// assert!(encode_desired(&fan, Attribute::FanSpeed, &AttributeValue::Percentage(0)).is_err());
/// ```
pub fn encode_desired(
    descriptor: &CapabilityDescriptor,
    attribute: Attribute,
    value: &AttributeValue,
) -> Result<EncodedCommand, ValueError> {
    let spec = descriptor
        .spec(attribute)
        .filter(|spec| spec.writable)
        .ok_or(ValueError::UnsupportedAttribute { attribute })?;

    let raw = match (&spec.kind, value) {
        (AttributeKind::Toggle, AttributeValue::Bool(on)) => Value::Bool(*on),
        (AttributeKind::Toggle, _) => {
            return Err(ValueError::TypeMismatch {
                attribute,
                expected: "boolean",
            });
        }
        (AttributeKind::Speed(range), AttributeValue::Percentage(pct)) => {
            if !(1..=100).contains(pct) {
                return Err(ValueError::OutOfRange {
                    attribute,
                    min: 1.0,
                    max: 100.0,
                    actual: f64::from(*pct),
                });
            }
            Value::from(range.percentage_to_level(*pct))
        }
        (AttributeKind::Speed(_), _) => {
            return Err(ValueError::TypeMismatch {
                attribute,
                expected: "percentage",
            });
        }
        (AttributeKind::Modes(modes), AttributeValue::Mode(name)) => modes
            .by_name(name)
            .map(|opt| opt.raw.clone())
            .ok_or_else(|| ValueError::UnknownMode {
                attribute,
                value: name.clone(),
            })?,
        (AttributeKind::Modes(_), _) => {
            return Err(ValueError::TypeMismatch {
                attribute,
                expected: "mode",
            });
        }
        (AttributeKind::Range(range), AttributeValue::Number(value)) => {
            let snapped = encode_bound(range, attribute, *value)?;
            if range.is_integral() {
                // Bounded by the declared range, which fits in i64.
                #[allow(clippy::cast_possible_truncation)]
                let integral = snapped.round() as i64;
                Value::from(integral)
            } else {
                Value::from(snapped)
            }
        }
        (AttributeKind::Range(_), _) => {
            return Err(ValueError::TypeMismatch {
                attribute,
                expected: "number",
            });
        }
        (AttributeKind::Span(range), AttributeValue::Span { low, high }) => {
            if low > high {
                return Err(ValueError::InvalidAttributeValue {
                    attribute,
                    reason: format!("lower bound {low} exceeds upper bound {high}"),
                });
            }
            let low = encode_bound(range, attribute, *low)?;
            let high = encode_bound(range, attribute, *high)?;
            let text = if range.is_integral() {
                #[allow(clippy::cast_possible_truncation)]
                let (low, high) = (low.round() as i64, high.round() as i64);
                format!("{low},{high}")
            } else {
                format!("{low},{high}")
            };
            Value::from(text)
        }
        (AttributeKind::Span(_), _) => {
            return Err(ValueError::TypeMismatch {
                attribute,
                expected: "span",
            });
        }
    };

    let (canonical, _) =
        decode_value(spec, &raw).map_err(|kind| ValueError::InvalidAttributeValue {
            attribute,
            reason: format!("encoded value {raw} does not decode: {kind:?}"),
        })?;

    Ok(EncodedCommand {
        attribute,
        field: spec.field.clone(),
        raw,
        canonical,
    })
}

/// Logs data-quality issues for a device at `warn` level.
pub fn log_issues(serial: &DeviceSerial, issues: &[DataQualityIssue]) {
    for issue in issues {
        tracing::warn!(
            serial = %serial,
            attribute = %issue.attribute,
            field = %issue.field,
            raw = %issue.raw,
            "data quality: {issue}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn lookup(model: &str) -> Arc<CapabilityDescriptor> {
        CapabilityRegistry::builtin().lookup(model)
    }

    fn raw(value: &Value) -> RawState {
        value.as_object().cloned().unwrap()
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    #[test]
    fn decodes_fan_report() {
        let fan = lookup("DR-HTF001S");
        let decoded = decode_reported(
            &fan,
            &raw(&json!({
                "poweron": 1,
                "windlevel": 9,
                "mode": 3,
                "shakehorizon": true,
                "ledalwayson": false,
                "connected": true
            })),
        );

        assert_eq!(decoded.values[&Attribute::Power], AttributeValue::Bool(true));
        assert_eq!(
            decoded.values[&Attribute::FanSpeed],
            AttributeValue::Percentage(100)
        );
        assert_eq!(
            decoded.values[&Attribute::PresetMode],
            AttributeValue::from("sleep")
        );
        assert_eq!(
            decoded.values[&Attribute::Oscillating],
            AttributeValue::Bool(true)
        );
        assert_eq!(decoded.connectivity, Some(Connectivity::Online));
        assert!(decoded.issues.is_empty());
    }

    #[test]
    fn out_of_range_speed_is_clamped_and_reported() {
        let fan = lookup("DR-HTF001S");
        let decoded = decode_reported(&fan, &raw(&json!({"windlevel": 15})));

        assert_eq!(
            decoded.values[&Attribute::FanSpeed],
            AttributeValue::Percentage(100)
        );
        assert_eq!(decoded.issues.len(), 1);
        assert!(matches!(decoded.issues[0].kind, IssueKind::Clamped { .. }));
    }

    #[test]
    fn out_of_range_humidity_is_clamped() {
        let ac = lookup("DR-HAC005S");
        let decoded = decode_reported(&ac, &raw(&json!({"rhautolevel": 95})));
        assert_eq!(
            decoded.values[&Attribute::TargetHumidity],
            AttributeValue::Number(80.0)
        );
        assert_eq!(decoded.issues[0].field, "rhautolevel");
    }

    #[test]
    fn off_step_humidity_is_snapped_without_issue() {
        let ac = lookup("DR-HAC005S");
        let decoded = decode_reported(&ac, &raw(&json!({"rhautolevel": 47})));
        assert_eq!(
            decoded.values[&Attribute::TargetHumidity],
            AttributeValue::Number(45.0)
        );
        assert!(decoded.issues.is_empty());
    }

    #[test]
    fn unknown_mode_is_dropped() {
        let fan = lookup("DR-HTF001S");
        let decoded = decode_reported(&fan, &raw(&json!({"mode": 42, "poweron": true})));
        assert!(!decoded.values.contains_key(&Attribute::PresetMode));
        assert!(decoded.values.contains_key(&Attribute::Power));
        assert_eq!(decoded.issues[0].kind, IssueKind::UnknownMode);
    }

    #[test]
    fn wrong_type_is_dropped() {
        let fan = lookup("DR-HTF001S");
        let decoded = decode_reported(&fan, &raw(&json!({"windlevel": "fast"})));
        assert!(decoded.values.is_empty());
        assert_eq!(
            decoded.issues[0].kind,
            IssueKind::TypeMismatch { expected: "number" }
        );
    }

    #[test]
    fn fahrenheit_is_normalized_to_celsius() {
        let ac = lookup("DR-HAC005S");
        let decoded = decode_reported(&ac, &raw(&json!({"templevel": 77, "temperature": 68})));
        let target = decoded.values[&Attribute::TargetTemperature]
            .as_number()
            .unwrap();
        assert!((target - 25.0).abs() < 1e-9);
        let current = decoded.values[&Attribute::CurrentTemperature]
            .as_number()
            .unwrap();
        assert!((current - 20.0).abs() < 1e-9);
    }

    #[test]
    fn unmapped_fields_are_ignored() {
        let fan = lookup("DR-HTF001S");
        let decoded = decode_reported(&fan, &raw(&json!({"wrong": 1, "fwversion": "1.0"})));
        assert!(decoded.is_empty());
        assert!(decoded.issues.is_empty());
    }

    #[test]
    fn panel_toggles_decode_from_flags() {
        let fan = lookup("DR-HTF001S");
        let decoded = decode_reported(
            &fan,
            &raw(&json!({"childlockon": 1, "muteon": false, "lightsensoron": true})),
        );
        assert_eq!(decoded.values[&Attribute::ChildLock], AttributeValue::Bool(true));
        assert_eq!(decoded.values[&Attribute::Mute], AttributeValue::Bool(false));
        assert_eq!(decoded.values[&Attribute::LightSensor], AttributeValue::Bool(true));
        assert!(decoded.issues.is_empty());
    }

    #[test]
    fn humidity_thresholds_decode_from_string_or_array() {
        let humidifier = lookup("DR-HHM001S");
        let expected = AttributeValue::Span { low: 40.0, high: 65.0 };

        let decoded = decode_reported(&humidifier, &raw(&json!({"rgb_humidity_threshold": "40,65"})));
        assert_eq!(decoded.values[&Attribute::AmbientHumidityThresholds], expected);

        let decoded = decode_reported(&humidifier, &raw(&json!({"rgb_humidity_threshold": [65, 40]})));
        assert_eq!(decoded.values[&Attribute::AmbientHumidityThresholds], expected);

        let decoded = decode_reported(&humidifier, &raw(&json!({"rgb_humidity_threshold": "high"})));
        assert!(decoded.values.is_empty());
        assert_eq!(
            decoded.issues[0].kind,
            IssueKind::TypeMismatch { expected: "bounds pair" }
        );
    }

    #[test]
    fn humidity_thresholds_encode_as_one_pair() {
        let humidifier = lookup("DR-HHM001S");
        let cmd = encode_desired(
            &humidifier,
            Attribute::AmbientHumidityThresholds,
            &AttributeValue::Span { low: 35.0, high: 70.0 },
        )
        .unwrap();
        assert_eq!(cmd.field, "rgb_humidity_threshold");
        assert_eq!(cmd.raw, json!("35,70"));

        let reversed = encode_desired(
            &humidifier,
            Attribute::AmbientHumidityThresholds,
            &AttributeValue::Span { low: 70.0, high: 35.0 },
        );
        assert!(matches!(reversed, Err(ValueError::InvalidAttributeValue { .. })));
    }

    #[test]
    fn unsupported_descriptor_decodes_only_connectivity() {
        let unknown = CapabilityDescriptor::unsupported();
        let decoded = decode_reported(&unknown, &raw(&json!({"poweron": true, "connected": false})));
        assert!(decoded.values.is_empty());
        assert_eq!(decoded.connectivity, Some(Connectivity::Offline));
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    #[test]
    fn encodes_speed_percentage_as_level() {
        let fan = lookup("DR-HTF001S");
        let cmd = encode_desired(&fan, Attribute::FanSpeed, &AttributeValue::Percentage(34)).unwrap();
        assert_eq!(cmd.raw, json!(4));
        assert_eq!(cmd.canonical, AttributeValue::Percentage(44));
        assert_eq!(cmd.desired(), raw(&json!({"windlevel": 4})));
    }

    #[test]
    fn rejects_zero_and_excess_percentages() {
        let fan = lookup("DR-HTF001S");
        for pct in [0, 101] {
            let err =
                encode_desired(&fan, Attribute::FanSpeed, &AttributeValue::Percentage(pct)).unwrap_err();
            assert!(matches!(err, ValueError::OutOfRange { .. }));
        }
    }

    #[test]
    fn rejects_out_of_range_humidity() {
        let ac = lookup("DR-HAC005S");
        let err = encode_desired(&ac, Attribute::TargetHumidity, &AttributeValue::Number(95.0))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "target_humidity value 95 is out of range [30, 80]"
        );
        assert!(
            encode_desired(&ac, Attribute::TargetHumidity, &AttributeValue::Number(81.0)).is_err()
        );
    }

    #[test]
    fn snaps_to_raw_step() {
        let ac = lookup("DR-HAC005S");
        let cmd =
            encode_desired(&ac, Attribute::TargetHumidity, &AttributeValue::Number(47.0)).unwrap();
        assert_eq!(cmd.raw, json!(45));
        assert_eq!(cmd.canonical, AttributeValue::Number(45.0));
    }

    #[test]
    fn encodes_celsius_to_fahrenheit() {
        let ac = lookup("DR-HAC005S");
        let cmd = encode_desired(
            &ac,
            Attribute::TargetTemperature,
            &AttributeValue::Number(25.0),
        )
        .unwrap();
        assert_eq!(cmd.field, "templevel");
        assert_eq!(cmd.raw, json!(77));
    }

    #[test]
    fn rejects_unknown_mode_and_wrong_kind() {
        let fan = lookup("DR-HTF001S");
        assert!(matches!(
            encode_desired(&fan, Attribute::PresetMode, &AttributeValue::from("turbo")),
            Err(ValueError::UnknownMode { .. })
        ));
        assert!(matches!(
            encode_desired(&fan, Attribute::Power, &AttributeValue::Percentage(50)),
            Err(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn sensors_and_missing_attributes_are_not_controllable() {
        let ac = lookup("DR-HAC005S");
        assert!(matches!(
            encode_desired(&ac, Attribute::CurrentTemperature, &AttributeValue::Number(20.0)),
            Err(ValueError::UnsupportedAttribute { .. })
        ));
        let unknown = CapabilityDescriptor::unsupported();
        assert!(matches!(
            encode_desired(&unknown, Attribute::Power, &AttributeValue::Bool(true)),
            Err(ValueError::UnsupportedAttribute { .. })
        ));
    }

    // ========================================================================
    // Round trip: decode then encode preserves the raw value
    // ========================================================================

    fn valid_raw_values(spec: &AttributeSpec) -> Vec<Value> {
        match &spec.kind {
            AttributeKind::Toggle => vec![json!(true), json!(false)],
            AttributeKind::Speed(range) => (range.low()..=range.high()).map(Value::from).collect(),
            AttributeKind::Modes(modes) => modes.options().iter().map(|o| o.raw.clone()).collect(),
            AttributeKind::Range(range) => {
                let mut values = Vec::new();
                let mut v = range.min;
                while v <= range.max + RANGE_EPSILON {
                    #[allow(clippy::cast_possible_truncation)]
                    values.push(Value::from(v.round() as i64));
                    v += range.step;
                }
                values
            }
            AttributeKind::Span(range) => {
                #[allow(clippy::cast_possible_truncation)]
                let (min, max) = (range.min.round() as i64, range.max.round() as i64);
                vec![json!(format!("{min},{max}")), json!(format!("{min},{min}"))]
            }
        }
    }

    #[test]
    fn decode_then_encode_preserves_raw_for_every_builtin_prefix() {
        let registry = CapabilityRegistry::builtin();
        for prefix in registry.prefixes() {
            let descriptor = registry.lookup(prefix);
            for spec in descriptor.attributes().iter().filter(|s| s.writable) {
                for raw_value in valid_raw_values(spec) {
                    let mut report = RawState::new();
                    report.insert(spec.field.clone(), raw_value.clone());
                    let decoded = decode_reported(&descriptor, &report);
                    let value = &decoded.values[&spec.attribute];
                    let cmd = encode_desired(&descriptor, spec.attribute, value).unwrap();
                    assert_eq!(cmd.raw, raw_value, "{prefix} {}", spec.attribute);
                    assert_eq!(&cmd.canonical, value);
                }
            }
        }
    }
}
