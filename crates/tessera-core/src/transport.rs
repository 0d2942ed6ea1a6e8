//! Radio transport abstraction
//!
//! The presentation engine consumes this capability and nothing else; the
//! concrete adapter (see the `tessera-ble` crate) maps it onto a real BLE
//! central. Completions are async method returns and channel receivers, all
//! awaited from the engine task, so the engine observes a single serialized
//! stream of transport events. The transport never cancels the engine; only
//! the engine cancels itself.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::errors::TransportError;

// ----------------------------------------------------------------------------
// Power State
// ----------------------------------------------------------------------------

/// Radio power lifecycle as reported by the platform stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl PowerState {
    /// Whether scanning can start in this state.
    pub fn is_powered_on(&self) -> bool {
        matches!(self, PowerState::PoweredOn)
    }

    /// States that will never transition to powered-on by waiting.
    ///
    /// Waiting on an unauthorized or unsupported radio would park the
    /// attempt forever; these fail immediately instead.
    pub fn permanent_failure(&self) -> Option<TransportError> {
        match self {
            PowerState::Unauthorized => Some(TransportError::Unauthorized),
            PowerState::Unsupported => Some(TransportError::Unsupported),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Transport Capability
// ----------------------------------------------------------------------------

/// Capability consumed by the presentation engine.
///
/// All operations are asynchronous; discovery and notification data arrive
/// on channel receivers owned by the current attempt. Implementations must
/// tolerate `disconnect`/`unsubscribe` on peripherals in any state — the
/// engine calls them best-effort during cleanup.
#[async_trait]
pub trait ReaderTransport: Send + Sync + 'static {
    /// Handle to a discovered reader peripheral.
    type Peripheral: Clone + Send + Sync + 'static;
    /// Handle to the data-transfer characteristic.
    type Characteristic: Clone + Send + Sync + 'static;

    /// Current radio power state.
    fn power_state(&self) -> PowerState;

    /// Stream of power transitions.
    fn power_changes(&self) -> watch::Receiver<PowerState>;

    /// Begin scanning for peripherals advertising `service`.
    ///
    /// Discovered peripherals are delivered on the returned receiver until
    /// [`stop_scan`](Self::stop_scan) is called. Duplicates are allowed.
    async fn start_scan(
        &self,
        service: Uuid,
    ) -> Result<mpsc::Receiver<Self::Peripheral>, TransportError>;

    /// Stop an in-progress scan. Best-effort.
    async fn stop_scan(&self);

    /// Advertised local name of a peripheral, when known.
    fn peripheral_name(&self, peripheral: &Self::Peripheral) -> Option<String>;

    /// Establish a connection to a discovered peripheral.
    async fn connect(&self, peripheral: &Self::Peripheral) -> Result<(), TransportError>;

    /// Discover `service` on a connected peripheral.
    async fn discover_service(
        &self,
        peripheral: &Self::Peripheral,
        service: Uuid,
    ) -> Result<(), TransportError>;

    /// Discover `characteristic` under `service`.
    async fn discover_characteristic(
        &self,
        peripheral: &Self::Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Self::Characteristic, TransportError>;

    /// Enable notifications on the characteristic.
    async fn subscribe(
        &self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
    ) -> Result<(), TransportError>;

    /// Stream of notification payloads for the subscribed characteristic.
    ///
    /// Must be called after [`subscribe`](Self::subscribe) has completed; a
    /// payload can therefore never precede its subscribe confirmation.
    async fn notifications(
        &self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
    ) -> Result<mpsc::Receiver<Vec<u8>>, TransportError>;

    /// Fire-and-forget write to the characteristic.
    async fn write_without_response(
        &self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    /// Disable notifications. Best-effort; used during cleanup.
    async fn unsubscribe(
        &self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
    );

    /// Tear down the connection. Best-effort; used during cleanup.
    async fn disconnect(&self, peripheral: &Self::Peripheral);
}
