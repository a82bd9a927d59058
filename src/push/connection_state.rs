// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

/// State of the account's push channel.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Reconnecting { attempt } -> Connected
///                                                   \-> Failed (gave up, or credentials rejected)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected and not trying.
    #[default]
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Connected and receiving heartbeats.
    Connected,
    /// Gave up. Only a restart recovers from here.
    Failed(String),
    /// Reconnecting after a connection loss.
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    /// Returns true if the push channel is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true if the push channel has given up.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}
