//! Engine and region configuration

use std::time::Duration;

use uuid::Uuid;

use crate::types::{DeviceId, DeviceKey};

// ----------------------------------------------------------------------------
// Engine Configuration
// ----------------------------------------------------------------------------

/// Configuration for a presentation engine instance.
///
/// Immutable for the life of the engine; provisioned externally. Does not
/// derive serde: it carries the preshared device key, and key material must
/// never ride along with an exported config.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Service advertised by readers; used for the scan filter and service
    /// discovery.
    pub service_uuid: Uuid,
    /// Data-transfer characteristic to subscribe and write.
    pub characteristic_uuid: Uuid,
    /// Identity sent in AUTH_REQUEST.
    pub device_id: DeviceId,
    /// Preshared symmetric key for all session encryption.
    pub device_key: DeviceKey,
    /// Payload sent after successful authentication.
    pub credential: String,
    /// Maximum time to wait for a reader to be discovered.
    pub scan_timeout: Duration,
    /// Maximum time to wait for the connection to establish.
    pub connection_timeout: Duration,
    /// Maximum time to wait for each reader reply.
    pub response_timeout: Duration,
    /// Total attempts per presentation call.
    pub retry_max: u32,
    /// Pause between attempts.
    pub retry_backoff: Duration,
    /// Opaque token for background-wake continuity, when the platform
    /// supports it.
    pub restore_identifier: Option<String>,
}

impl EngineConfig {
    pub fn new(
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        device_id: DeviceId,
        device_key: DeviceKey,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            service_uuid,
            characteristic_uuid,
            device_id,
            device_key,
            credential: credential.into(),
            scan_timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(3),
            retry_max: 3,
            retry_backoff: Duration::from_secs(1),
            restore_identifier: None,
        }
    }

    /// Set scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set per-reply response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the total attempt bound
    pub fn with_retry_max(mut self, attempts: u32) -> Self {
        self.retry_max = attempts.max(1);
        self
    }

    /// Set the pause between attempts
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the background-wake restoration token
    pub fn with_restore_identifier(mut self, token: impl Into<String>) -> Self {
        self.restore_identifier = Some(token.into());
        self
    }
}

// ----------------------------------------------------------------------------
// Region Configuration
// ----------------------------------------------------------------------------

/// The beacon region whose occupancy arms credential presentation.
///
/// Constant for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegionConfig {
    /// 128-bit region identifier matched against incoming beacon events.
    pub id: Uuid,
    /// Opaque display name.
    pub name: String,
}

impl RegionConfig {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
