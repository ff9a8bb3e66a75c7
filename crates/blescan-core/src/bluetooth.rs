//! Radio backends for the producer.
//!
//! Backends implement [`Radio`] and report what they see on an unbounded
//! channel of [`RadioEvent`]s. The owner of the [`ScanSession`] drains that
//! channel and feeds each event to the session in order.
//!
//! - [`BluezRadio`] scans with the system adapter through BlueZ (`bluetooth`
//!   feature, Linux only)
//! - [`MockRadio`] replays scripted sightings (`mock-bluetooth` feature)
//!
//! [`ScanSession`]: crate::session::ScanSession

use tokio::sync::mpsc;

use crate::session::{RadioError, RadioEvent};

/// Sending half of a radio event channel.
pub type EventSender = mpsc::UnboundedSender<RadioEvent>;

/// Receiving half of a radio event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

/// Create a channel for radio events.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

fn deliver(events: &EventSender, event: RadioEvent) -> Result<(), RadioError> {
    events.send(event).map_err(|_| RadioError::Unavailable {
        message: "event receiver closed".into(),
    })
}

// ============================================================================
// Mock radio
// ============================================================================

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use mock::MockRadio;

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
mod mock {
    use std::time::Duration;

    use tracing::debug;

    use super::{deliver, EventSender};
    use crate::session::{Radio, RadioError, RadioEvent};
    use crate::types::Sighting;

    /// Scripted radio.
    ///
    /// Every window replays the same sightings immediately, then (unless
    /// [`manual_completion`](Self::manual_completion) is set) reports the
    /// window complete.
    #[derive(Debug)]
    pub struct MockRadio {
        events: EventSender,
        script: Vec<Sighting>,
        complete_on_start: bool,
        fail_start: bool,
        windows: Vec<Duration>,
    }

    impl MockRadio {
        /// Create a radio that sees nothing.
        #[must_use]
        pub fn new(events: EventSender) -> Self {
            Self {
                events,
                script: Vec::new(),
                complete_on_start: true,
                fail_start: false,
                windows: Vec::new(),
            }
        }

        /// Sightings replayed in every window.
        #[must_use]
        pub fn with_sightings(mut self, script: Vec<Sighting>) -> Self {
            self.script = script;
            self
        }

        /// Leave windows open until [`Radio::stop_scan`] is called.
        #[must_use]
        pub fn manual_completion(mut self) -> Self {
            self.complete_on_start = false;
            self
        }

        /// Refuse to start any window.
        #[must_use]
        pub fn failing(mut self) -> Self {
            self.fail_start = true;
            self
        }

        /// Window lengths requested so far.
        #[must_use]
        pub fn windows(&self) -> &[Duration] {
            &self.windows
        }
    }

    impl Radio for MockRadio {
        fn start_scan(&mut self, window: Duration) -> Result<(), RadioError> {
            if self.fail_start {
                return Err(RadioError::ScanFailed {
                    message: "mock radio configured to fail".into(),
                });
            }
            debug!(?window, sightings = self.script.len(), "mock scan started");
            self.windows.push(window);

            for sighting in &self.script {
                deliver(&self.events, RadioEvent::Sighting(sighting.clone()))?;
            }
            if self.complete_on_start {
                deliver(&self.events, RadioEvent::WindowComplete)?;
            }
            Ok(())
        }

        fn stop_scan(&mut self) -> Result<(), RadioError> {
            deliver(&self.events, RadioEvent::WindowStopped)
        }
    }
}

// ============================================================================
// BlueZ radio
// ============================================================================

#[cfg(feature = "bluetooth")]
pub use bluez::BluezRadio;

#[cfg(feature = "bluetooth")]
mod bluez {
    use std::time::Duration;

    use bluer::{Adapter, AdapterEvent, Address};
    use futures::{pin_mut, StreamExt};
    use tokio::runtime::Handle;
    use tokio::sync::oneshot;
    use tracing::{debug, info, warn};

    use super::{deliver, EventSender};
    use crate::session::{Radio, RadioError, RadioEvent};
    use crate::types::{AdvertisementData, MacAddress, Sighting};

    /// Radio backed by the default BlueZ adapter.
    pub struct BluezRadio {
        adapter: Adapter,
        events: EventSender,
        runtime: Handle,
        cancel: Option<oneshot::Sender<()>>,
    }

    impl std::fmt::Debug for BluezRadio {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BluezRadio")
                .field("adapter", &self.adapter.name())
                .field("scanning", &self.cancel.is_some())
                .finish_non_exhaustive()
        }
    }

    impl BluezRadio {
        /// Connect to BlueZ and power on the default adapter.
        ///
        /// Must be called from within a Tokio runtime; windows run as tasks
        /// on that runtime.
        ///
        /// # Errors
        ///
        /// [`RadioError::Unavailable`] if BlueZ or the adapter cannot be used.
        pub async fn new(events: EventSender) -> Result<Self, RadioError> {
            let unavailable = |e: bluer::Error| RadioError::Unavailable {
                message: e.to_string(),
            };

            let session = bluer::Session::new().await.map_err(unavailable)?;
            let adapter = session.default_adapter().await.map_err(unavailable)?;
            adapter.set_powered(true).await.map_err(unavailable)?;

            info!(adapter = adapter.name(), "Bluetooth adapter ready");
            Ok(Self {
                adapter,
                events,
                runtime: Handle::current(),
                cancel: None,
            })
        }
    }

    impl Radio for BluezRadio {
        fn start_scan(&mut self, window: Duration) -> Result<(), RadioError> {
            let (cancel_tx, cancel_rx) = oneshot::channel();
            self.cancel = Some(cancel_tx);

            let adapter = self.adapter.clone();
            let events = self.events.clone();
            self.runtime.spawn(async move {
                let end = tokio::select! {
                    () = tokio::time::sleep(window) => RadioEvent::WindowComplete,
                    _ = cancel_rx => RadioEvent::WindowStopped,
                    result = forward_sightings(&adapter, &events) => {
                        if let Err(e) = result {
                            warn!(error = %e, "Discovery failed, ending window");
                        }
                        RadioEvent::WindowStopped
                    }
                };
                if deliver(&events, end).is_err() {
                    debug!("event receiver closed before window end");
                }
            });
            Ok(())
        }

        fn stop_scan(&mut self) -> Result<(), RadioError> {
            match self.cancel.take() {
                Some(cancel) => {
                    // The task may already have ended the window.
                    let _ = cancel.send(());
                    Ok(())
                }
                None => Ok(()),
            }
        }
    }

    /// Forward every discovered or updated device until the stream ends.
    async fn forward_sightings(adapter: &Adapter, events: &EventSender) -> bluer::Result<()> {
        let stream = adapter.discover_devices_with_changes().await?;
        pin_mut!(stream);

        while let Some(event) = stream.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            match sighting_for(adapter, address).await {
                Ok(Some(sighting)) => {
                    if deliver(events, RadioEvent::Sighting(sighting)).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(%address, error = %e, "could not read device properties"),
            }
        }
        Ok(())
    }

    async fn sighting_for(adapter: &Adapter, address: Address) -> bluer::Result<Option<Sighting>> {
        let device = adapter.device(address)?;
        // Cached devices carry no RSSI until they advertise again.
        let Some(rssi) = device.rssi().await? else {
            return Ok(None);
        };

        let manufacturer_data = device
            .manufacturer_data()
            .await?
            .and_then(|entries| entries.into_iter().min_by_key(|(id, _)| *id))
            .map(|(company_id, payload)| {
                let mut bytes = company_id.to_le_bytes().to_vec();
                bytes.extend(payload);
                bytes
            });
        let advert = AdvertisementData {
            complete_name: device.name().await?.map(String::into_bytes),
            short_name: None,
            manufacturer_data,
        };

        Ok(Some(Sighting::from_advertisement(
            MacAddress::new(address.0),
            rssi,
            &advert,
        )))
    }
}
