// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Telemetry parsing and normalization.
//!
//! The cloud reports device state as a flat JSON object of raw vendor
//! fields, both in push messages and in REST state responses:
//!
//! - [`PushMessage`] - Envelope of a push channel frame
//! - [`decode_reported`] - Raw fields to semantic attributes
//! - [`encode_desired`] - Semantic value to raw command payload
//!
//! # Examples
//!
//! ```
//! use dreo_lib::capability::CapabilityRegistry;
//! use dreo_lib::telemetry::{PushMessage, decode_reported};
//! use dreo_lib::types::{Attribute, AttributeValue};
//!
//! let registry = CapabilityRegistry::builtin();
//! let frame = r#"{"method":"control-report","devicesn":"SN1","reported":{"poweron":false}}"#;
//!
//! let msg = PushMessage::parse(frame).unwrap();
//! let decoded = decode_reported(&registry.lookup("DR-HPF001S"), &msg.reported);
//!
//! assert_eq!(decoded.values[&Attribute::Power], AttributeValue::Bool(false));
//! ```

mod message;
mod normalizer;

pub use message::{CONTROL_REPORT, PushMessage};
pub use normalizer::{
    DataQualityIssue, DecodedState, EncodedCommand, IssueKind, decode_reported, encode_desired,
    log_issues,
};

/// Raw vendor fields as reported or sent by the cloud.
pub type RawState = serde_json::Map<String, serde_json::Value>;
