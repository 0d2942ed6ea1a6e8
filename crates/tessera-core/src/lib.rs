//! Tessera core: a headless access-credential engine
//!
//! Tessera is the mobile side of a beacon-armed access system. A location
//! beacon marks an entry zone; entering it arms a single credential
//! presentation: the client scans for a reader advertising a known service,
//! connects, negotiates framed messaging over one characteristic, performs
//! a challenge/response mutual authentication under a preshared symmetric
//! key, and transmits an encrypted credential.
//!
//! This crate is the engine only. It has no knowledge of any user
//! interface or of a concrete radio; it consumes the
//! [`ReaderTransport`](transport::ReaderTransport) capability (see the
//! `tessera-ble` crate for the production adapter) and can be driven from a
//! test harness without any changes.
//!
//! ## Architecture
//!
//! - [`crypto`] — AES-128-CBC + PKCS#7 primitives and the random source
//! - [`wire`] — builders/parsers for the five framed reader messages
//! - [`transport`] — the radio capability the engine consumes
//! - [`engine`] — the credential presentation state machine: timeouts,
//!   retries, nonce-echo verification, observable session view
//! - [`region`] — beacon region trigger with exactly-once arming per
//!   inside-period
//! - [`ranging`] — per-batch beacon observation deduplication (UI side
//!   channel; never a control input)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tessera_core::{
//!     config::{EngineConfig, RegionConfig},
//!     engine::PresentationEngine,
//!     region::RegionTrigger,
//!     types::{DeviceId, DeviceKey},
//! };
//! use uuid::Uuid;
//!
//! # async fn example<T: tessera_core::transport::ReaderTransport>(
//! #     transport: Arc<T>,
//! # ) -> tessera_core::Result<()> {
//! let config = EngineConfig::new(
//!     Uuid::parse_str("0000aa10-0000-1000-8000-00805f9b34fb").unwrap(),
//!     Uuid::parse_str("0000aa11-0000-1000-8000-00805f9b34fb").unwrap(),
//!     DeviceId::from_hex("a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4")?,
//!     DeviceKey::from_hex("13f75379273f324d31335278a66062af")?,
//!     "prod-pin_access_tool-7603489",
//! );
//!
//! let engine = Arc::new(
//!     PresentationEngine::new(transport, config)
//!         .with_completion(|result| println!("{}", result)),
//! );
//!
//! let region = RegionConfig::new(
//!     Uuid::parse_str("f7826da6-4fa2-4e98-8024-bc5b71e0893e").unwrap(),
//!     "front-door",
//! );
//! let (events_tx, events_rx) = tokio::sync::mpsc::channel(16);
//! tokio::spawn(RegionTrigger::new(region, engine).run(events_rx));
//! # let _ = events_tx;
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod crypto;
pub mod engine;
pub mod errors;
pub mod ranging;
pub mod region;
pub mod transport;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public Re-exports
// ----------------------------------------------------------------------------

pub use config::{EngineConfig, RegionConfig};
pub use engine::{PresentationEngine, SessionState, SessionView};
pub use errors::{CodecError, CryptoError, Result, TesseraError, TransportError};
pub use ranging::dedupe_observations;
pub use region::{Presenter, RegionEvent, RegionTrigger};
pub use transport::{PowerState, ReaderTransport};
pub use types::{
    BeaconObservation, CredentialResult, DeviceId, DeviceKey, Nonce, Occupancy, Proximity,
};
