// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command dispatch.
//!
//! Requests are validated against the device's capabilities, applied to the
//! state store optimistically, coalesced per (device, attribute) and sent to
//! the cloud with bounded retry. The outcome reports whether telemetry
//! confirmed the value, a newer value superseded it, or it timed out and
//! was reverted.

mod command;
mod dispatcher;

pub(crate) use command::CommandFailure;
pub use command::{Command, CommandId, CommandOutcome, CommandStatus};
pub use dispatcher::{CommandDispatcher, CommandTicket};
