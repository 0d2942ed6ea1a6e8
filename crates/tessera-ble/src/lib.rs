//! Bluetooth Low Energy transport for the Tessera access client
//!
//! This crate provides a [`ReaderTransport`] implementation over `btleplug`,
//! letting the headless engine in `tessera-core` talk to a real access
//! reader through the platform BLE central.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tessera_ble::BtleplugTransport;
//! use tessera_core::{engine::PresentationEngine, EngineConfig};
//!
//! # async fn example(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(
//!     BtleplugTransport::new(config.restore_identifier.as_deref()).await?,
//! );
//! let engine = PresentationEngine::new(transport, config);
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform notes
//!
//! Scanning, connecting, and notifications ride on btleplug's central mode
//! (Linux via BlueZ, macOS via Core Bluetooth, Windows via WinRT). The
//! backend exposes no state-restoration hook, so background-wake continuity
//! degrades to a fresh `Idle` start.

mod central;
mod error;

pub use central::BtleplugTransport;
pub use error::BleInitError;

// Re-export the capability trait for convenience.
pub use tessera_core::transport::ReaderTransport;
