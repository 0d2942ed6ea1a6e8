//! Error types for the BLE transport adapter

use thiserror::Error;

/// Failures while bringing up the BLE central.
///
/// Once running, operational failures are reported through
/// [`tessera_core::TransportError`] so the engine's retry policy sees one
/// uniform taxonomy.
#[derive(Debug, Error)]
pub enum BleInitError {
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    #[error("bluetooth stack error: {0}")]
    Stack(#[from] btleplug::Error),
}
