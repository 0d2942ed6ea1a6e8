//! btleplug-backed reader transport
//!
//! Maps the [`ReaderTransport`] capability onto a platform BLE central.
//! Power transitions and discoveries arrive on the adapter's event stream
//! and are pumped onto tokio channels; everything else is a direct call
//! into btleplug.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tessera_core::{
    transport::{PowerState, ReaderTransport},
    TransportError,
};

use crate::error::BleInitError;

/// Buffer for discovery and notification channels.
const CHANNEL_CAPACITY: usize = 16;

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// A [`ReaderTransport`] over the first available platform BLE adapter.
pub struct BtleplugTransport {
    adapter: Adapter,
    power_tx: watch::Sender<PowerState>,
    /// Advertised names observed during scanning, for the session view.
    names: Arc<Mutex<HashMap<PeripheralId, String>>>,
    scan_pump: Mutex<Option<JoinHandle<()>>>,
    _event_pump: JoinHandle<()>,
}

impl BtleplugTransport {
    /// Bring up the central on the first available adapter.
    ///
    /// `restore_identifier` is accepted for configuration parity; btleplug
    /// exposes no platform state-restoration hook, so a background wake
    /// starts a fresh session from `Idle`.
    pub async fn new(restore_identifier: Option<&str>) -> Result<Self, BleInitError> {
        if let Some(token) = restore_identifier {
            info!(token, "state restoration unavailable on this backend; starting fresh");
        }

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleInitError::NoAdapter)?;

        // The platform reports the initial state on the event stream.
        let (power_tx, _) = watch::channel(PowerState::Unknown);
        let mut events = adapter.events().await?;
        let power = power_tx.clone();
        let event_pump = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::StateUpdate(state) = event {
                    let mapped = map_central_state(state);
                    debug!(?mapped, "radio power transition");
                    let _ = power.send(mapped);
                }
            }
        });

        Ok(Self {
            adapter,
            power_tx,
            names: Arc::new(Mutex::new(HashMap::new())),
            scan_pump: Mutex::new(None),
            _event_pump: event_pump,
        })
    }

    fn abort_scan_pump(&self) {
        if let Some(pump) = self.scan_pump.lock().unwrap().take() {
            pump.abort();
        }
    }
}

fn map_central_state(state: CentralState) -> PowerState {
    match state {
        CentralState::PoweredOn => PowerState::PoweredOn,
        CentralState::PoweredOff => PowerState::PoweredOff,
        _ => PowerState::Unknown,
    }
}

#[async_trait::async_trait]
impl ReaderTransport for BtleplugTransport {
    type Peripheral = Peripheral;
    type Characteristic = btleplug::api::Characteristic;

    fn power_state(&self) -> PowerState {
        *self.power_tx.borrow()
    }

    fn power_changes(&self) -> watch::Receiver<PowerState> {
        self.power_tx.subscribe()
    }

    async fn start_scan(
        &self,
        service: Uuid,
    ) -> Result<mpsc::Receiver<Peripheral>, TransportError> {
        let filter = ScanFilter {
            services: vec![service],
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| TransportError::ScanFailed(e.to_string()))?;

        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| TransportError::ScanFailed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let adapter = self.adapter.clone();
        let names = self.names.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                if let Some(name) = properties.local_name {
                    names.lock().unwrap().insert(id, name);
                }
                // Some backends deliver events the scan filter should have
                // dropped; verify the advertised services ourselves.
                if !properties.services.contains(&service) {
                    continue;
                }
                if tx.send(peripheral).await.is_err() {
                    break;
                }
            }
        });

        self.abort_scan_pump();
        *self.scan_pump.lock().unwrap() = Some(pump);
        Ok(rx)
    }

    async fn stop_scan(&self) {
        self.abort_scan_pump();
        if let Err(e) = self.adapter.stop_scan().await {
            debug!(error = %e, "stop_scan failed");
        }
    }

    fn peripheral_name(&self, peripheral: &Peripheral) -> Option<String> {
        self.names.lock().unwrap().get(&peripheral.id()).cloned()
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<(), TransportError> {
        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))
    }

    async fn discover_service(
        &self,
        peripheral: &Peripheral,
        service: Uuid,
    ) -> Result<(), TransportError> {
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::DiscoveryFailed(e.to_string()))?;

        if peripheral.services().iter().any(|s| s.uuid == service) {
            Ok(())
        } else {
            Err(TransportError::ServiceNotFound(service))
        }
    }

    async fn discover_characteristic(
        &self,
        peripheral: &Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Self::Characteristic, TransportError> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))
    }

    async fn subscribe(
        &self,
        peripheral: &Peripheral,
        characteristic: &Self::Characteristic,
    ) -> Result<(), TransportError> {
        peripheral
            .subscribe(characteristic)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
    }

    async fn notifications(
        &self,
        peripheral: &Peripheral,
        characteristic: &Self::Characteristic,
    ) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
        let mut stream = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::NotificationsFailed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let wanted = characteristic.uuid;
        tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != wanted {
                    continue;
                }
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
            debug!("notification stream ended");
        });

        Ok(rx)
    }

    async fn write_without_response(
        &self,
        peripheral: &Peripheral,
        characteristic: &Self::Characteristic,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        peripheral
            .write(characteristic, bytes, WriteType::WithoutResponse)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn unsubscribe(&self, peripheral: &Peripheral, characteristic: &Self::Characteristic) {
        if let Err(e) = peripheral.unsubscribe(characteristic).await {
            debug!(error = %e, "unsubscribe failed");
        }
    }

    async fn disconnect(&self, peripheral: &Peripheral) {
        if let Err(e) = peripheral.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_state_mapping() {
        assert_eq!(
            map_central_state(CentralState::PoweredOn),
            PowerState::PoweredOn
        );
        assert_eq!(
            map_central_state(CentralState::PoweredOff),
            PowerState::PoweredOff
        );
        assert_eq!(
            map_central_state(CentralState::Unknown),
            PowerState::Unknown
        );
    }
}
