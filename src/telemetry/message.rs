// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push channel message envelope.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ParseError;
use crate::types::DeviceSerial;

use super::RawState;

/// Method name of state reports on the push channel.
pub const CONTROL_REPORT: &str = "control-report";

/// A message received on the push channel.
///
/// # Examples
///
/// ```
/// use dreo_lib::telemetry::PushMessage;
///
/// let json = r#"{
///     "method": "control-report",
///     "devicesn": "HTF008S_01",
///     "messageid": "m-1",
///     "timestamp": 1700000000000,
///     "reported": {"windlevel": 3}
/// }"#;
/// let msg = PushMessage::parse(json).unwrap();
///
/// assert!(msg.is_control_report());
/// assert_eq!(msg.serial.as_str(), "HTF008S_01");
/// assert_eq!(msg.reported["windlevel"], 3);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    /// Message method; only [`CONTROL_REPORT`] carries telemetry.
    pub method: String,

    /// Serial of the reporting device.
    #[serde(rename = "devicesn")]
    pub serial: DeviceSerial,

    /// Vendor message id.
    #[serde(rename = "messageid", default)]
    pub message_id: Option<String>,

    /// Report time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,

    /// Raw reported fields.
    #[serde(default)]
    pub reported: RawState,
}

impl PushMessage {
    /// Parses a push message from a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Json`] if the frame is not a valid message.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns `true` if the message is a state report.
    #[must_use]
    pub fn is_control_report(&self) -> bool {
        self.method == CONTROL_REPORT
    }

    /// Returns the report time, if the message carries a valid one.
    #[must_use]
    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::from_timestamp_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_message() {
        let msg = PushMessage::parse(r#"{"method":"heartbeat","devicesn":"SN1"}"#).unwrap();
        assert!(!msg.is_control_report());
        assert!(msg.reported.is_empty());
        assert!(msg.reported_at().is_none());
    }

    #[test]
    fn timestamp_is_epoch_millis() {
        let msg = PushMessage::parse(
            r#"{"method":"control-report","devicesn":"SN1","timestamp":1700000000123,"reported":{}}"#,
        )
        .unwrap();
        let at = msg.reported_at().unwrap();
        assert_eq!(at.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn rejects_missing_serial() {
        let err = PushMessage::parse(r#"{"method":"control-report"}"#).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn rejects_non_json() {
        assert!(PushMessage::parse("pong").is_err());
    }
}
