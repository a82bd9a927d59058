// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command records and outcomes.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{DeviceError, Error};
use crate::types::{Attribute, AttributeValue, DeviceSerial};

/// Unique identifier of one transmitted command.
///
/// # Examples
///
/// ```
/// use dreo_lib::dispatch::CommandId;
///
/// let a = CommandId::new();
/// let b = CommandId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Generates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandId({})", self.0)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    /// Waiting for the coalescing window or being sent.
    Pending,
    /// Accepted by the cloud.
    Acknowledged,
    /// Rejected, or the send failed after all retries.
    Failed,
    /// Accepted, but no confirming telemetry arrived in time.
    TimedOut,
}

impl CommandStatus {
    /// Returns `true` once the command will not change status again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Acknowledged => "acknowledged",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// A desired change to one attribute of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Identifier.
    pub id: CommandId,
    /// Target device.
    pub serial: DeviceSerial,
    /// Target attribute.
    pub attribute: Attribute,
    /// Desired semantic value.
    pub value: AttributeValue,
    /// Time the value was requested.
    pub issued_at: DateTime<Utc>,
    /// Current status.
    pub status: CommandStatus,
}

impl Command {
    pub(crate) fn new(serial: DeviceSerial, attribute: Attribute, value: AttributeValue) -> Self {
        Self {
            id: CommandId::new(),
            serial,
            attribute,
            value,
            issued_at: Utc::now(),
            status: CommandStatus::Pending,
        }
    }
}

/// Result of a transmitted command, shared by every caller coalesced into it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// The transmitted command, with its final status.
    pub command: Command,
    /// Matching telemetry confirmed the value.
    pub confirmed: bool,
    /// A newer value replaced this one before confirmation.
    pub superseded: bool,
    /// Number of requests merged into this transmission.
    pub coalesced: usize,
}

/// Why a transmitted command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandFailure {
    Timeout { timeout_ms: u64 },
    Auth(String),
    Rejected(String),
    Network(String),
}

impl CommandFailure {
    pub(crate) fn classify(err: &Error) -> Self {
        match err {
            Error::Auth(message) => Self::Auth(message.clone()),
            err if err.is_retryable() => Self::Network(err.to_string()),
            err => Self::Rejected(err.to_string()),
        }
    }

    pub(crate) fn into_error(self, serial: &DeviceSerial, attribute: Attribute) -> Error {
        match self {
            Self::Timeout { timeout_ms } => DeviceError::CommandTimeout {
                serial: serial.to_string(),
                attribute,
                timeout_ms,
            }
            .into(),
            Self::Auth(message) => Error::Auth(message),
            Self::Rejected(reason) | Self::Network(reason) => DeviceError::CommandFailed {
                serial: serial.to_string(),
                attribute,
                reason,
            }
            .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn status_terminality() {
        assert!(!CommandStatus::Pending.is_terminal());
        assert!(CommandStatus::Acknowledged.is_terminal());
        assert!(CommandStatus::TimedOut.is_terminal());
        assert_eq!(CommandStatus::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn new_command_is_pending() {
        let command = Command::new(
            DeviceSerial::new("SN1"),
            Attribute::Power,
            AttributeValue::Bool(true),
        );
        assert_eq!(command.status, CommandStatus::Pending);
    }

    #[test]
    fn failures_are_classified() {
        assert_eq!(
            CommandFailure::classify(&Error::Auth("expired".into())),
            CommandFailure::Auth("expired".into())
        );
        assert!(matches!(
            CommandFailure::classify(&ProtocolError::Timeout(100).into()),
            CommandFailure::Network(_)
        ));
        assert!(matches!(
            CommandFailure::classify(
                &ProtocolError::Api {
                    code: 11_000,
                    message: "bad".into()
                }
                .into()
            ),
            CommandFailure::Rejected(_)
        ));
    }

    #[test]
    fn timeout_maps_to_command_timeout_error() {
        let err = CommandFailure::Timeout { timeout_ms: 500 }
            .into_error(&DeviceSerial::new("SN1"), Attribute::FanSpeed);
        assert!(matches!(
            err,
            Error::Device(DeviceError::CommandTimeout { timeout_ms: 500, .. })
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn auth_failure_stays_fatal() {
        let err = CommandFailure::Auth("denied".into())
            .into_error(&DeviceSerial::new("SN1"), Attribute::Power);
        assert!(err.is_fatal());
    }
}
