// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `dreo_lib` library.
//!
//! Errors are grouped by where they originate: local value validation,
//! transport communication, payload parsing, and per-device operations.
//! Only [`Error::Auth`] and [`Error::ReconnectExhausted`] are fatal to a
//! whole session; everything else is scoped to one device or one command.

use thiserror::Error;

use crate::types::Attribute;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A value was rejected locally before any network call.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during transport communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred during a device operation.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Credentials were rejected by the cloud.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The account token carries a malformed region suffix.
    #[error("invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// The push channel could not be re-established.
    #[error("push channel reconnection gave up after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnection attempts made.
        attempts: u32,
    },

    /// The account is shutting down and no longer accepts work.
    #[error("account is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Returns `true` if the error ends the whole session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::ReconnectExhausted { .. })
    }

    /// Returns `true` if retrying the same operation may succeed.
    ///
    /// API rejections are not retryable: the cloud answered and said no.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Protocol(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Errors raised while validating attribute values against a descriptor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// The value is not acceptable for the attribute.
    #[error("invalid value for {attribute}: {reason}")]
    InvalidAttributeValue {
        /// The attribute being set.
        attribute: Attribute,
        /// Why the value was rejected.
        reason: String,
    },

    /// A numeric value lies outside the declared range.
    #[error("{attribute} value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// The attribute being set.
        attribute: Attribute,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
        /// The value that was provided.
        actual: f64,
    },

    /// A mode is not part of the declared enumeration.
    #[error("{attribute} does not support mode {value:?}")]
    UnknownMode {
        /// The attribute being set.
        attribute: Attribute,
        /// The rejected mode.
        value: String,
    },

    /// The value has the wrong kind for the attribute.
    #[error("{attribute} expects a {expected} value")]
    TypeMismatch {
        /// The attribute being set.
        attribute: Attribute,
        /// The expected value kind.
        expected: &'static str,
    },

    /// The device does not expose the attribute as controllable.
    #[error("attribute {attribute} is not controllable on this device")]
    UnsupportedAttribute {
        /// The requested attribute.
        attribute: Attribute,
    },
}

/// Errors related to transport communication (REST and push channel).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket connection or communication failed.
    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection to the cloud failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The cloud answered with a non-success envelope.
    #[error("API returned code {code}: {message}")]
    Api {
        /// Vendor result code.
        code: i64,
        /// Vendor message.
        message: String,
    },

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl ProtocolError {
    /// Returns `true` for connect and timeout failures that are worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "http")]
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            #[cfg(feature = "websocket")]
            Self::WebSocket(_) => true,
            Self::ConnectionFailed(_) | Self::Timeout(_) => true,
            Self::Api { .. } | Self::ChannelClosed(_) => false,
        }
    }
}

/// Errors related to parsing cloud payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the payload.
    #[error("missing field in payload: {0}")]
    MissingField(String),

    /// Unexpected payload format.
    #[error("unexpected payload format: {0}")]
    UnexpectedFormat(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

/// Errors related to device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No device with this serial is known.
    #[error("device {0} not found")]
    NotFound(String),

    /// The device model has no capability descriptor.
    #[error("device model {model} is not supported")]
    Unsupported {
        /// The reported model code.
        model: String,
    },

    /// The command was not confirmed by telemetry in time.
    #[error("command {attribute} on {serial} timed out after {timeout_ms} ms")]
    CommandTimeout {
        /// Target device.
        serial: String,
        /// Target attribute.
        attribute: Attribute,
        /// The confirmation timeout that elapsed.
        timeout_ms: u64,
    },

    /// The command could not be delivered.
    #[error("command {attribute} on {serial} failed: {reason}")]
    CommandFailed {
        /// Target device.
        serial: String,
        /// Target attribute.
        attribute: Attribute,
        /// Description of the failure.
        reason: String,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        let err = ValueError::OutOfRange {
            attribute: Attribute::TargetHumidity,
            min: 30.0,
            max: 80.0,
            actual: 95.0,
        };
        assert_eq!(
            err.to_string(),
            "target_humidity value 95 is out of range [30, 80]"
        );
    }

    #[test]
    fn error_from_value_error() {
        let err: Error = ValueError::UnsupportedAttribute {
            attribute: Attribute::Power,
        }
        .into();
        assert!(matches!(
            err,
            Error::Value(ValueError::UnsupportedAttribute { .. })
        ));
    }

    #[test]
    fn only_auth_and_exhaustion_are_fatal() {
        assert!(Error::Auth("expired".into()).is_fatal());
        assert!(Error::ReconnectExhausted { attempts: 10 }.is_fatal());
        assert!(!Error::InvalidTokenFormat("abc:XX".into()).is_fatal());
        assert!(!Error::Protocol(ProtocolError::Timeout(500)).is_fatal());
        assert!(
            !Error::Device(DeviceError::Unsupported {
                model: "XX-1".into()
            })
            .is_fatal()
        );
    }

    #[test]
    fn transient_protocol_errors_are_retryable() {
        assert!(Error::Protocol(ProtocolError::Timeout(100)).is_retryable());
        assert!(Error::Protocol(ProtocolError::ConnectionFailed("reset".into())).is_retryable());
        assert!(
            !Error::Protocol(ProtocolError::Api {
                code: 11_000,
                message: "bad request".into()
            })
            .is_retryable()
        );
        assert!(!Error::Auth("denied".into()).is_retryable());
    }

    #[test]
    fn device_error_display() {
        let err = DeviceError::CommandTimeout {
            serial: "SN1".into(),
            attribute: Attribute::FanSpeed,
            timeout_ms: 10_000,
        };
        assert_eq!(
            err.to_string(),
            "command fan_speed on SN1 timed out after 10000 ms"
        );
    }
}
