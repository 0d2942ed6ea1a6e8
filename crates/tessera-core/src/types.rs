//! Core types for the Tessera access client
//!
//! This module defines the fundamental types used throughout the engine,
//! using newtype patterns for semantic validation and type safety. Secret
//! material (device key, nonces) gets redacting `Debug` impls and is zeroized
//! on drop.

use core::fmt;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{ConfigError, Result};

/// Length of the device identity and of the preshared device key, in bytes.
pub const DEVICE_ID_SIZE: usize = 16;
pub const DEVICE_KEY_SIZE: usize = 16;

/// Length of a session challenge nonce, in bytes.
pub const NONCE_SIZE: usize = 16;

// ----------------------------------------------------------------------------
// Device Identity
// ----------------------------------------------------------------------------

/// Opaque 16-byte identity sent to the reader during authentication.
///
/// `Debug` is redacted: the identity is linkable and must not leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceId([u8; DEVICE_ID_SIZE]);

impl DeviceId {
    pub fn new(bytes: [u8; DEVICE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let raw = hex::decode(hex_str).map_err(|_| ConfigError::InvalidDeviceId)?;
        let bytes: [u8; DEVICE_ID_SIZE] =
            raw.try_into().map_err(|_| ConfigError::InvalidDeviceId)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; DEVICE_ID_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId(..)")
    }
}

// ----------------------------------------------------------------------------
// Device Key
// ----------------------------------------------------------------------------

/// Preshared 16-byte symmetric key used for all session encryption.
///
/// Zeroized on drop; `Debug` is redacted. Never derives serde: key material
/// must not be exportable by accident.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DeviceKey([u8; DEVICE_KEY_SIZE]);

impl DeviceKey {
    pub fn new(bytes: [u8; DEVICE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let raw = hex::decode(hex_str).map_err(|_| ConfigError::InvalidDeviceKey)?;
        let bytes: [u8; DEVICE_KEY_SIZE] =
            raw.try_into().map_err(|_| ConfigError::InvalidDeviceKey)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; DEVICE_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceKey(..)")
    }
}

// ----------------------------------------------------------------------------
// Nonce
// ----------------------------------------------------------------------------

/// 16-byte freshly-random challenge, used once per session.
///
/// Equality is constant-time only; there is deliberately no `PartialEq`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn new(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Constant-time comparison against a raw byte slot.
    ///
    /// The echo check must not expose a timing oracle on how many leading
    /// bytes matched.
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        if other.len() != NONCE_SIZE {
            return false;
        }
        self.0.ct_eq(other).into()
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce(..)")
    }
}

// ----------------------------------------------------------------------------
// Region Occupancy
// ----------------------------------------------------------------------------

/// Tri-state occupancy of the configured beacon region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupancy {
    Inside,
    Outside,
    Unknown,
}

// ----------------------------------------------------------------------------
// Beacon Observations
// ----------------------------------------------------------------------------

/// Estimated proximity bucket reported by the ranging layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proximity {
    Immediate,
    Near,
    Far,
    Unknown,
}

/// A single ranged beacon sighting.
///
/// `accuracy` is meters; a negative value means the platform could not
/// produce a usable estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconObservation {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Estimated distance in meters; negative when unusable.
    pub accuracy: f64,
    pub proximity: Proximity,
}

impl BeaconObservation {
    /// The identity of the physical beacon this observation belongs to.
    pub fn dedup_key(&self) -> (Uuid, u16, u16) {
        (self.uuid, self.major, self.minor)
    }
}

// ----------------------------------------------------------------------------
// Credential Result
// ----------------------------------------------------------------------------

/// Terminal outcome of a presentation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialResult {
    pub success: bool,
    pub message: String,
}

impl CredentialResult {
    pub fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
        }
    }
}

impl fmt::Display for CredentialResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            if self.success { "granted" } else { "denied" },
            self.message
        )
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
