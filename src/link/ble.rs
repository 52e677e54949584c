//! btleplug backed transport.
//!
//! The radio side runs on a tokio runtime: one task watches adapter events
//! (advertisements, disconnects) and one task per connection forwards
//! notifications of the data characteristic into the frame queue. Session
//! calls block on the runtime handle and must not be made from a runtime
//! worker thread.

use crate::link::queue::RadioHandle;
use crate::link::transport::{Channel, Transport};
use crate::link::types::{ConnectionParams, LinkError, LinkEvent, PeerAddress};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;

/// BLE transport for the bike's control unit.
pub struct BleTransport {
    runtime: Handle,
    adapter: Adapter,
    radio: RadioHandle,
    /// Connected peripheral
    peripheral: Option<Peripheral>,
    /// Address of the connected peripheral, shared with the event task
    connected_id: Arc<Mutex<Option<String>>>,
    is_scanning: Arc<AtomicBool>,
    authenticated: bool,
    connect_timeout: Duration,
}

impl BleTransport {
    /// Initialize the first BLE adapter and start watching its events.
    pub fn new(
        runtime: Handle,
        radio: RadioHandle,
        connect_timeout: Duration,
    ) -> Result<Self, LinkError> {
        tracing::info!("Initializing BLE transport");

        let adapter = runtime.block_on(async {
            let manager = Manager::new()
                .await
                .map_err(|e| LinkError::BleError(e.to_string()))?;

            let adapters = manager
                .adapters()
                .await
                .map_err(|e| LinkError::BleError(e.to_string()))?;

            adapters.into_iter().next().ok_or(LinkError::AdapterNotFound)
        })?;

        tracing::info!("BLE adapter initialized");

        let transport = Self {
            runtime,
            adapter,
            radio,
            peripheral: None,
            connected_id: Arc::new(Mutex::new(None)),
            is_scanning: Arc::new(AtomicBool::new(false)),
            authenticated: false,
            connect_timeout,
        };
        transport.spawn_event_task();

        Ok(transport)
    }

    fn spawn_event_task(&self) {
        let adapter = self.adapter.clone();
        let radio = self.radio.clone();
        let is_scanning = self.is_scanning.clone();
        let connected_id = self.connected_id.clone();

        self.runtime.spawn(async move {
            Self::process_adapter_events(adapter, radio, is_scanning, connected_id).await;
        });
    }

    /// Forward advertisements while scanning and disconnects of our peer.
    async fn process_adapter_events(
        adapter: Adapter,
        radio: RadioHandle,
        is_scanning: Arc<AtomicBool>,
        connected_id: Arc<Mutex<Option<String>>>,
    ) {
        use futures::stream::StreamExt;

        let mut events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Failed to get adapter events: {}", e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            match event {
                CentralEvent::ManufacturerDataAdvertisement {
                    id,
                    manufacturer_data,
                } => {
                    if !is_scanning.load(Ordering::Relaxed) {
                        continue;
                    }
                    for (company_id, data) in manufacturer_data {
                        let mut payload = company_id.to_le_bytes().to_vec();
                        payload.extend_from_slice(&data);
                        radio.post_event(LinkEvent::Advertisement {
                            address: PeerAddress(id.to_string()),
                            manufacturer_data: payload,
                        });
                    }
                }
                CentralEvent::DeviceDisconnected(id) => {
                    let mut connected = connected_id.lock().await;
                    if connected.as_deref() == Some(id.to_string().as_str()) {
                        *connected = None;
                        radio.post_event(LinkEvent::Disconnected);
                    }
                }
                _ => {}
            }
        }
    }

    /// Push notifications of the data characteristic into the frame queue.
    async fn handle_notifications(peripheral: Peripheral, radio: RadioHandle) {
        use futures::stream::StreamExt;

        let mut notification_stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to get notification stream: {}", e);
                return;
            }
        };

        while let Some(notification) = notification_stream.next().await {
            if notification.uuid == Channel::Data.char_uuid() {
                radio.push_frame(&notification.value);
            }
        }

        tracing::debug!("Notification stream ended");
    }

    fn peripheral(&self) -> Result<&Peripheral, LinkError> {
        self.peripheral.as_ref().ok_or(LinkError::NotConnected)
    }

    fn characteristic(&self, channel: Channel) -> Result<Characteristic, LinkError> {
        self.peripheral()?
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == channel.char_uuid() && c.service_uuid == channel.service_uuid())
            .ok_or_else(|| LinkError::UnsupportedChannel(channel.to_string()))
    }
}

impl Transport for BleTransport {
    fn start_scan(&mut self) -> Result<(), LinkError> {
        if self.is_scanning.swap(true, Ordering::Relaxed) {
            return Ok(());
        }

        tracing::info!("Starting bike discovery");

        let result = self
            .runtime
            .block_on(self.adapter.start_scan(ScanFilter::default()));

        if let Err(e) = result {
            self.is_scanning.store(false, Ordering::Relaxed);
            return Err(LinkError::ScanFailed(e.to_string()));
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), LinkError> {
        if !self.is_scanning.swap(false, Ordering::Relaxed) {
            return Ok(());
        }

        tracing::info!("Stopping bike discovery");

        self.runtime
            .block_on(self.adapter.stop_scan())
            .map_err(|e| LinkError::ScanFailed(e.to_string()))
    }

    fn connect(&mut self, peer: &PeerAddress, passkey: u32) -> Result<(), LinkError> {
        // Pairing is handled by the platform's bluetooth agent.
        tracing::debug!("Connecting with passkey {:06}", passkey);

        let adapter = self.adapter.clone();
        let timeout = self.connect_timeout;
        let address = peer.0.clone();

        let peripheral = self.runtime.block_on(async move {
            let peripherals = adapter
                .peripherals()
                .await
                .map_err(|e| LinkError::BleError(e.to_string()))?;

            let peripheral = peripherals
                .into_iter()
                .find(|p| p.id().to_string() == address)
                .ok_or_else(|| LinkError::ConnectionFailed(format!("{} not found", address)))?;

            tokio::time::timeout(timeout, peripheral.connect())
                .await
                .map_err(|_| LinkError::ConnectionTimeout)?
                .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;

            peripheral
                .discover_services()
                .await
                .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;

            Ok::<_, LinkError>(peripheral)
        })?;

        *self.connected_id.blocking_lock() = Some(peer.0.clone());
        self.authenticated = false;

        let radio = self.radio.clone();
        let notifier = peripheral.clone();
        self.runtime.spawn(async move {
            Self::handle_notifications(notifier, radio).await;
        });

        self.peripheral = Some(peripheral);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        let peripheral = match self.peripheral.take() {
            Some(p) => p,
            None => return Ok(()),
        };

        // Report the disconnect ourselves, the adapter event is ignored.
        *self.connected_id.blocking_lock() = None;

        let result = self
            .runtime
            .block_on(peripheral.disconnect())
            .map_err(|e| LinkError::BleError(e.to_string()));

        self.radio.post_event(LinkEvent::Disconnected);
        result
    }

    fn update_connection_params(&mut self, params: ConnectionParams) -> Result<(), LinkError> {
        // Connection timings are negotiated by the platform stack.
        tracing::debug!(
            "Connection parameters left to the platform (requested {}-{}, latency {}, timeout {})",
            params.min_interval,
            params.max_interval,
            params.latency,
            params.supervision_timeout
        );
        Ok(())
    }

    fn read(&mut self, channel: Channel) -> Result<Vec<u8>, LinkError> {
        let characteristic = self.characteristic(channel)?;
        let result = self
            .runtime
            .block_on(self.peripheral()?.read(&characteristic))
            .map_err(|e| LinkError::ReadFailed(e.to_string()));

        // The first read of the data channel triggers pairing.
        if channel == Channel::Data && !self.authenticated {
            self.authenticated = result.is_ok();
            self.radio.post_event(LinkEvent::AuthenticationComplete {
                encrypted: result.is_ok(),
            });
        }

        result
    }

    fn write(&mut self, channel: Channel, frame: &[u8]) -> Result<(), LinkError> {
        let characteristic = self.characteristic(channel)?;
        self.runtime
            .block_on(
                self.peripheral()?
                    .write(&characteristic, frame, WriteType::WithResponse),
            )
            .map_err(|e| LinkError::WriteFailed(e.to_string()))
    }

    fn subscribe(&mut self) -> Result<(), LinkError> {
        let characteristic = self.characteristic(Channel::Data)?;
        self.runtime
            .block_on(self.peripheral()?.subscribe(&characteristic))
            .map_err(|e| LinkError::SubscriptionFailed(e.to_string()))?;

        tracing::debug!("Subscribed to characteristic: {}", characteristic.uuid);
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), LinkError> {
        let characteristic = self.characteristic(Channel::Data)?;
        self.runtime
            .block_on(self.peripheral()?.unsubscribe(&characteristic))
            .map_err(|e| LinkError::SubscriptionFailed(e.to_string()))
    }
}
