// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Account manager for mirroring and controlling Dreo appliances.
//!
//! # Overview
//!
//! The [`AccountManager`] is the entry point for applications. For one
//! cloud account it provides:
//!
//! - **Discovery**: List the account's devices and bind them to capabilities
//! - **State tracking**: Snapshots are kept current from push telemetry and,
//!   while push is down, from REST polling
//! - **Commands**: Coalesced, optimistic attribute changes with revert on failure
//! - **Event system**: Subscribe to device events via broadcast channels
//! - **Auto-reconnection**: Jittered exponential backoff for the push channel
//!
//! # Examples
//!
//! ## Event Subscription
//!
//! ```no_run
//! use dreo_lib::event::DeviceEvent;
//! use dreo_lib::manager::{AccountConfig, AccountManager};
//!
//! # fn example() -> dreo_lib::Result<()> {
//! let manager = AccountManager::connect(AccountConfig::new("my-token"))?;
//! let mut events = manager.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let DeviceEvent::StateChanged { serial, snapshot, .. } = event {
//!             println!("{serial}: power {:?}", snapshot.power());
//!         }
//!     }
//! });
//! # Ok(())
//! # }
//! ```
//!
//! ## Watching Device State
//!
//! ```no_run
//! use dreo_lib::manager::{AccountConfig, AccountManager};
//! use dreo_lib::types::DeviceSerial;
//!
//! # async fn example() -> dreo_lib::Result<()> {
//! let manager = AccountManager::connect(AccountConfig::new("my-token:EU"))?;
//! manager.discover().await?;
//! manager.start();
//!
//! if let Some(mut state_rx) = manager.watch(&DeviceSerial::new("SN123")) {
//!     tokio::spawn(async move {
//!         while state_rx.changed().await.is_ok() {
//!             let snapshot = state_rx.borrow().clone();
//!             println!("Current fan speed: {:?}", snapshot.fan_speed());
//!         }
//!     });
//! }
//! # Ok(())
//! # }
//! ```

mod account_config;
mod account_manager;

pub use account_config::{
    AccountConfig, DispatchConfig, PollConfig, ReconnectionPolicy, RetryPolicy,
};
pub use account_manager::AccountManager;
