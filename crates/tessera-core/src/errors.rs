//! Error types for the Tessera access client
//!
//! Errors are partitioned by concern (crypto, wire codec, transport,
//! configuration) and unified under [`TesseraError`]. The engine's retry
//! policy keys off [`TesseraError::is_fatal`]: most failures are retried up
//! to the configured bound, but a nonce-echo mismatch or a malformed key is
//! terminal on first occurrence.

use uuid::Uuid;

use crate::wire::ReaderErrorCode;

// ----------------------------------------------------------------------------
// Crypto Errors
// ----------------------------------------------------------------------------

/// Failures of the symmetric primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key size: {actual} bytes (expected 16)")]
    InvalidKeySize { actual: usize },
    #[error("invalid IV size: {actual} bytes (expected 16)")]
    InvalidIvSize { actual: usize },
    #[error("invalid PKCS#7 padding")]
    InvalidPadding,
    #[error("cipher operation failed")]
    CipherFailure,
    #[error("random number generation failed")]
    RandomFailure,
}

// ----------------------------------------------------------------------------
// Codec Errors
// ----------------------------------------------------------------------------

/// Failures while parsing a framed reader message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("empty response from reader")]
    EmptyResponse,
    #[error("unexpected message type: {actual:#04x} (expected {expected:#04x})")]
    UnexpectedType { expected: u8, actual: u8 },
    #[error("response too short: {actual} bytes (need {expected})")]
    ResponseTooShort { expected: usize, actual: usize },
    #[error("decrypted payload has wrong length: {actual} bytes (expected {expected})")]
    BadPlaintextLength { expected: usize, actual: usize },
    #[error("reader failed to echo the session challenge")]
    NonceMismatch,
    #[error("unknown status code: {0:#04x}")]
    UnknownStatus(u8),
    #[error("reader reported an unrecognized error")]
    UnknownError,
    #[error("reader error: {}", .0.message())]
    Reader(ReaderErrorCode),
}

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures surfaced by the radio transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("radio is powered off")]
    PoweredOff,
    #[error("radio use is unauthorized")]
    Unauthorized,
    #[error("radio is unsupported on this host")]
    Unsupported,
    #[error("radio is resetting")]
    Resetting,
    #[error("no radio adapter available")]
    AdapterUnavailable,
    #[error("scan failed: {0}")]
    ScanFailed(String),
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    #[error("peripheral disconnected")]
    Disconnected,
    #[error("service discovery failed: {0}")]
    DiscoveryFailed(String),
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("notification stream failed: {0}")]
    NotificationsFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("device id must be 16 bytes of hex")]
    InvalidDeviceId,
    #[error("device key must be 16 bytes of hex")]
    InvalidDeviceKey,
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Top-level error for the Tessera core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TesseraError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no reader found")]
    ScanTimeout,

    #[error("connection timed out")]
    ConnectTimeout,

    #[error("reader did not respond in time")]
    ResponseTimeout,

    #[error("attempt cancelled")]
    Cancelled,

    #[error("a presentation attempt is already in progress")]
    Busy,
}

impl TesseraError {
    /// Errors that must not be retried.
    ///
    /// A wrong nonce echo means key mismatch or an active man-in-the-middle;
    /// further attempts cannot help and may leak traffic. A malformed key is
    /// configuration corruption, not a transient fault.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TesseraError::Codec(CodecError::NonceMismatch)
                | TesseraError::Crypto(CryptoError::InvalidKeySize { .. })
        )
    }

    /// Human-readable message for the terminal `Failed` state.
    pub fn user_message(&self) -> String {
        match self {
            TesseraError::ScanTimeout => "No reader found".to_string(),
            TesseraError::Codec(CodecError::NonceMismatch) => {
                "reader verification failed".to_string()
            }
            TesseraError::Codec(CodecError::Reader(code)) => code.message().to_string(),
            other => other.to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T, E = TesseraError> = core::result::Result<T, E>;
