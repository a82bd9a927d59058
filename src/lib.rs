// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Dreo` Lib - A Rust library to mirror and control Dreo cloud appliances.
//!
//! This library keeps a local mirror of every appliance on a Dreo account
//! (fans, heaters, humidifiers, air conditioners, purifiers) and sends
//! attribute changes back through the vendor cloud.
//!
//! # Supported Features
//!
//! - **Discovery**: List the account's devices and bind each to the
//!   capabilities of its model
//! - **Push telemetry**: WebSocket control reports applied in order, with
//!   stale reports discarded
//! - **Fallback polling**: REST polling while the push channel is down
//! - **Commands**: Rapid changes to one attribute are coalesced into a
//!   single send, applied optimistically and reverted if never confirmed
//! - **Events**: Device and snapshot changes via broadcast channels
//!
//! # Regions
//!
//! The account token may carry a region suffix (`token:EU`, `token:NA`).
//! Without one the North American endpoints are used.
//!
//! # Quick Start
//!
//! ```no_run
//! use dreo_lib::manager::{AccountConfig, AccountManager};
//!
//! #[tokio::main]
//! async fn main() -> dreo_lib::Result<()> {
//!     let manager = AccountManager::connect(AccountConfig::new("my-token:EU"))?;
//!
//!     let report = manager.discover().await?;
//!     manager.start();
//!
//!     for serial in &report.added {
//!         if let Some(snapshot) = manager.snapshot(serial) {
//!             println!("{serial}: power={:?} speed={:?}", snapshot.power(), snapshot.fan_speed());
//!         }
//!     }
//!
//!     if let Some(serial) = report.added.first() {
//!         let outcome = manager.set_fan_speed(serial, 50).await?;
//!         println!("confirmed: {}", outcome.confirmed);
//!     }
//!
//!     manager.shutdown();
//!     manager.join().await
//! }
//! ```
//!
//! ## Custom Transports
//!
//! [`manager::AccountManager::new`] accepts any [`cloud::CloudApi`] and
//! [`push::PushTransport`] implementation, which is how the test suite runs
//! the full pipeline without network access.

pub mod capability;
pub mod cloud;
pub mod device;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod manager;
pub mod push;
pub mod region;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod types;

pub use capability::{CapabilityDescriptor, CapabilityRegistry};
pub use device::{Device, DeviceInfo};
pub use dispatch::{CommandId, CommandOutcome, CommandStatus};
pub use error::{DeviceError, Error, ParseError, ProtocolError, Result, ValueError};
pub use manager::{AccountConfig, AccountManager};
pub use region::{Endpoints, Region};
pub use session::Session;
pub use types::{Attribute, AttributeValue, Connectivity, DeviceSerial};
