// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cloud::CloudApi;
use crate::error::Error;
use crate::manager::PollConfig;
use crate::session::Session;
use crate::state::{Provenance, StateStore, TelemetryUpdate};

use super::{ConnectionState, to_update};

/// Polls every device while the push channel has been down for longer than
/// the grace period.
///
/// Stops when cancelled, when the queue closes, or once the push channel
/// has failed for good. Rejected credentials mark the session failed and
/// cancel `cancel`, which also stops the push channel.
///
/// # Errors
///
/// Returns the fatal error that stopped polling.
pub(crate) async fn run_poller<A: CloudApi>(
    api: Arc<A>,
    store: Arc<StateStore>,
    session: Session,
    updates: mpsc::Sender<TelemetryUpdate>,
    config: PollConfig,
    request_timeout: Duration,
    cancel: CancellationToken,
) -> Result<(), Error> {
    if !config.enabled {
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if session.connection_state().is_failed() {
            tracing::info!("Push channel failed, stopping fallback polling");
            break;
        }

        if session
            .disconnected_for()
            .is_none_or(|down| down < config.grace)
        {
            continue;
        }

        tracing::debug!(devices = store.len(), "Polling device state");
        for serial in store.serials() {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let raw = match tokio::time::timeout(request_timeout, api.fetch_state(&serial)).await {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) if e.is_fatal() => {
                    tracing::error!(serial = %serial, error = %e, "Fallback poll rejected, stopping synchronization");
                    session.set_connection_state(ConnectionState::Failed(format!("polling failed: {e}")));
                    cancel.cancel();
                    return Err(e);
                }
                Ok(Err(e)) => {
                    tracing::warn!(serial = %serial, error = %e, "Fallback poll failed");
                    continue;
                }
                Err(_) => {
                    tracing::warn!(serial = %serial, "Fallback poll timed out");
                    continue;
                }
            };

            let Some(update) = to_update(&store, &serial, &raw, Utc::now(), Provenance::Poll)
            else {
                continue;
            };
            if updates.send(update).await.is_err() {
                return Ok(());
            }
        }
    }
    tracing::debug!("Fallback poller exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use crate::capability::CapabilityRegistry;
    use crate::cloud::DeviceListing;
    use crate::device::Device;
    use crate::telemetry::RawState;
    use crate::types::DeviceSerial;

    #[derive(Default)]
    struct CountingCloud {
        polls: AtomicU32,
        rejected: bool,
    }

    impl CloudApi for CountingCloud {
        async fn list_devices(&self) -> Result<Vec<DeviceListing>, Error> {
            Ok(Vec::new())
        }

        async fn fetch_state(&self, _serial: &DeviceSerial) -> Result<RawState, Error> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.rejected {
                return Err(Error::Auth("token expired".into()));
            }
            Ok(json!({"poweron": true}).as_object().cloned().unwrap_or_default())
        }

        async fn send_command(&self, _serial: &DeviceSerial, _desired: &RawState) -> Result<(), Error> {
            Ok(())
        }
    }

    fn config() -> PollConfig {
        PollConfig::default()
            .with_interval(Duration::from_secs(10))
            .with_grace(Duration::from_secs(30))
    }

    fn spawn_poller(
        session: &Session,
    ) -> (Arc<CountingCloud>, mpsc::Receiver<TelemetryUpdate>, CancellationToken) {
        let (cloud, rx, cancel, _task) = spawn_with(session, CountingCloud::default());
        (cloud, rx, cancel)
    }

    fn spawn_with(
        session: &Session,
        cloud: CountingCloud,
    ) -> (
        Arc<CountingCloud>,
        mpsc::Receiver<TelemetryUpdate>,
        CancellationToken,
        tokio::task::JoinHandle<Result<(), Error>>,
    ) {
        let registry = CapabilityRegistry::builtin();
        let store = Arc::new(StateStore::new());
        store.upsert_device(Device::new("SN1", "DR-HTF001S", registry.lookup("DR-HTF001S")));
        store.upsert_device(Device::new("SN2", "DR-HTF001S", registry.lookup("DR-HTF001S")));
        let cloud = Arc::new(cloud);
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_poller(
            Arc::clone(&cloud),
            store,
            session.clone(),
            tx,
            config(),
            Duration::from_secs(5),
            cancel.clone(),
        ));
        (cloud, rx, cancel, task)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_only_after_grace_period() {
        let session = Session::from_token("abc").unwrap();
        let (cloud, mut rx, cancel) = spawn_poller(&session);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(cloud.polls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let update = rx.recv().await.unwrap();
        assert_eq!(update.provenance, Provenance::Poll);
        assert!(cloud.polls.load(Ordering::SeqCst) >= 1);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn polling_pauses_while_push_is_connected() {
        let session = Session::from_token("abc").unwrap();
        session.set_connection_state(ConnectionState::Connected);
        let (cloud, _rx, cancel) = spawn_poller(&session);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(cloud.polls.load(Ordering::SeqCst), 0);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_when_push_has_failed() {
        let session = Session::from_token("abc").unwrap();
        session.set_connection_state(ConnectionState::Failed("gave up".into()));
        let (cloud, mut rx, _cancel) = spawn_poller(&session);

        assert!(rx.recv().await.is_none());
        assert_eq!(cloud.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credentials_stop_polling_and_fail_session() {
        let session = Session::from_token("abc").unwrap();
        let cloud = CountingCloud {
            rejected: true,
            ..CountingCloud::default()
        };
        let (cloud, _rx, cancel, task) = spawn_with(&session, cloud);

        tokio::time::sleep(Duration::from_secs(300)).await;

        assert!(task.is_finished());
        assert!(matches!(task.await.unwrap(), Err(Error::Auth(_))));
        assert_eq!(cloud.polls.load(Ordering::SeqCst), 1);
        assert!(session.connection_state().is_failed());
        assert!(cancel.is_cancelled());
    }
}
