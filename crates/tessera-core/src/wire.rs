//! Wire codec for reader sessions
//!
//! Builders and parsers for the five framed messages exchanged with an
//! access reader over the data-transfer characteristic. Frames are
//! fixed-layout byte strings; the first byte is the message type. All
//! length and type checks live here so the engine never touches raw
//! offsets.
//!
//! | Type                | Code | Payload                                    |
//! |---------------------|------|--------------------------------------------|
//! | AUTH_REQUEST        | 0x01 | device_id(16) ‖ iv(16) ‖ enc(nonce_M)(32)  |
//! | AUTH_RESPONSE       | 0x02 | iv(16) ‖ enc(nonce_M ‖ nonce_R)(48)        |
//! | CREDENTIAL          | 0x03 | iv(16) ‖ enc(utf8(credential))             |
//! | CREDENTIAL_RESPONSE | 0x04 | status(1)                                  |
//! | ERROR               | 0xFF | error_code(1)                              |

use zeroize::Zeroize;

use crate::crypto;
use crate::errors::{CodecError, Result};
use crate::types::{CredentialResult, DeviceId, DeviceKey, Nonce, NONCE_SIZE};

// ----------------------------------------------------------------------------
// Frame Constants
// ----------------------------------------------------------------------------

pub const MSG_AUTH_REQUEST: u8 = 0x01;
pub const MSG_AUTH_RESPONSE: u8 = 0x02;
pub const MSG_CREDENTIAL: u8 = 0x03;
pub const MSG_CREDENTIAL_RESPONSE: u8 = 0x04;
pub const MSG_ERROR: u8 = 0xFF;

/// type(1) + device_id(16) + iv(16) + enc(nonce)(32)
pub const AUTH_REQUEST_LEN: usize = 65;
/// type(1) + iv(16) + enc(nonce_M ‖ nonce_R)(48)
pub const AUTH_RESPONSE_LEN: usize = 65;
/// Decrypted AUTH_RESPONSE body: the echoed nonce_M followed by nonce_R.
const AUTH_RESPONSE_PLAINTEXT_LEN: usize = 2 * NONCE_SIZE;

// ----------------------------------------------------------------------------
// Status and Error Tables
// ----------------------------------------------------------------------------

/// Reader verdict carried by CREDENTIAL_RESPONSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Success,
    Rejected,
    Expired,
    Revoked,
    InvalidFormat,
}

impl AccessStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(AccessStatus::Success),
            0x01 => Some(AccessStatus::Rejected),
            0x02 => Some(AccessStatus::Expired),
            0x03 => Some(AccessStatus::Revoked),
            0x04 => Some(AccessStatus::InvalidFormat),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AccessStatus::Success => "Access granted",
            AccessStatus::Rejected => "Access denied",
            AccessStatus::Expired => "Credential expired",
            AccessStatus::Revoked => "Credential revoked",
            AccessStatus::InvalidFormat => "Invalid credential",
        }
    }
}

/// Protocol-level failure carried by an ERROR frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderErrorCode {
    InvalidMessage,
    UnknownDevice,
    DecryptionFailed,
    InvalidState,
    AuthFailed,
    Timeout,
}

impl ReaderErrorCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ReaderErrorCode::InvalidMessage),
            0x02 => Some(ReaderErrorCode::UnknownDevice),
            0x03 => Some(ReaderErrorCode::DecryptionFailed),
            0x04 => Some(ReaderErrorCode::InvalidState),
            0x05 => Some(ReaderErrorCode::AuthFailed),
            0x06 => Some(ReaderErrorCode::Timeout),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReaderErrorCode::InvalidMessage => "Communication error",
            ReaderErrorCode::UnknownDevice => "Device not recognized",
            ReaderErrorCode::DecryptionFailed => "Authentication failed",
            ReaderErrorCode::InvalidState => "Protocol error",
            ReaderErrorCode::AuthFailed => "Authentication failed",
            ReaderErrorCode::Timeout => "Reader timeout",
        }
    }
}

// ----------------------------------------------------------------------------
// AUTH_REQUEST
// ----------------------------------------------------------------------------

/// A built AUTH_REQUEST frame together with the challenge it carries.
///
/// The engine keeps `nonce` for the echo check and drops it with the
/// session ephemera; it never outlives the attempt.
pub struct AuthRequest {
    pub frame: Vec<u8>,
    pub nonce: Nonce,
}

/// Build an AUTH_REQUEST: generate a fresh nonce_M, encrypt it under the
/// device key with a fresh IV, and frame it with the device identity.
pub fn build_auth_request(device_id: &DeviceId, key: &DeviceKey) -> Result<AuthRequest> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(&crypto::random_bytes(NONCE_SIZE)?);
    let nonce = Nonce::new(nonce_bytes);
    nonce_bytes.zeroize();

    let (iv, ciphertext) = crypto::encrypt(key.as_bytes(), nonce.as_bytes(), None)?;

    let mut frame = Vec::with_capacity(AUTH_REQUEST_LEN);
    frame.push(MSG_AUTH_REQUEST);
    frame.extend_from_slice(device_id.as_bytes());
    frame.extend_from_slice(&iv);
    frame.extend_from_slice(&ciphertext);
    debug_assert_eq!(frame.len(), AUTH_REQUEST_LEN);

    Ok(AuthRequest { frame, nonce })
}

// ----------------------------------------------------------------------------
// AUTH_RESPONSE
// ----------------------------------------------------------------------------

/// Parse an AUTH_RESPONSE, verifying the reader echoed our challenge.
///
/// Returns the reader's own challenge nonce_R. The echo comparison is
/// constant-time; a mismatch is security-fatal and the caller must not
/// retry.
pub fn parse_auth_response(bytes: &[u8], key: &DeviceKey, expected: &Nonce) -> Result<Nonce> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyResponse.into());
    }
    if bytes[0] == MSG_ERROR {
        return Err(parse_error_frame(bytes).into());
    }
    if bytes[0] != MSG_AUTH_RESPONSE {
        return Err(CodecError::UnexpectedType {
            expected: MSG_AUTH_RESPONSE,
            actual: bytes[0],
        }
        .into());
    }
    if bytes.len() < AUTH_RESPONSE_LEN {
        return Err(CodecError::ResponseTooShort {
            expected: AUTH_RESPONSE_LEN,
            actual: bytes.len(),
        }
        .into());
    }

    let iv = &bytes[1..17];
    let ciphertext = &bytes[17..AUTH_RESPONSE_LEN];
    let mut plaintext = crypto::decrypt(key.as_bytes(), iv, ciphertext)?;

    if plaintext.len() != AUTH_RESPONSE_PLAINTEXT_LEN {
        let actual = plaintext.len();
        plaintext.zeroize();
        return Err(CodecError::BadPlaintextLength {
            expected: AUTH_RESPONSE_PLAINTEXT_LEN,
            actual,
        }
        .into());
    }

    let echoed_ok = expected.ct_eq(&plaintext[..NONCE_SIZE]);
    if !echoed_ok {
        plaintext.zeroize();
        return Err(CodecError::NonceMismatch.into());
    }

    let mut reader_nonce = [0u8; NONCE_SIZE];
    reader_nonce.copy_from_slice(&plaintext[NONCE_SIZE..]);
    plaintext.zeroize();

    Ok(Nonce::new(reader_nonce))
}

// ----------------------------------------------------------------------------
// CREDENTIAL
// ----------------------------------------------------------------------------

/// Build a CREDENTIAL frame: the UTF-8 credential encrypted under the
/// device key with a fresh IV.
pub fn build_credential(key: &DeviceKey, credential: &str) -> Result<Vec<u8>> {
    let (iv, ciphertext) = crypto::encrypt(key.as_bytes(), credential.as_bytes(), None)?;

    let mut frame = Vec::with_capacity(1 + iv.len() + ciphertext.len());
    frame.push(MSG_CREDENTIAL);
    frame.extend_from_slice(&iv);
    frame.extend_from_slice(&ciphertext);

    Ok(frame)
}

// ----------------------------------------------------------------------------
// CREDENTIAL_RESPONSE
// ----------------------------------------------------------------------------

/// Parse a CREDENTIAL_RESPONSE into the terminal result.
///
/// Every status in the table is a protocol completion, including the
/// rejections; only an unknown status byte is an error.
pub fn parse_credential_response(bytes: &[u8]) -> Result<CredentialResult> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyResponse.into());
    }
    if bytes[0] == MSG_ERROR {
        return Err(parse_error_frame(bytes).into());
    }
    if bytes[0] != MSG_CREDENTIAL_RESPONSE {
        return Err(CodecError::UnexpectedType {
            expected: MSG_CREDENTIAL_RESPONSE,
            actual: bytes[0],
        }
        .into());
    }
    if bytes.len() < 2 {
        return Err(CodecError::ResponseTooShort {
            expected: 2,
            actual: bytes.len(),
        }
        .into());
    }

    let status = AccessStatus::from_byte(bytes[1]).ok_or(CodecError::UnknownStatus(bytes[1]))?;
    Ok(CredentialResult::new(
        status == AccessStatus::Success,
        status.message(),
    ))
}

// ----------------------------------------------------------------------------
// ERROR Frames
// ----------------------------------------------------------------------------

fn parse_error_frame(bytes: &[u8]) -> CodecError {
    debug_assert_eq!(bytes[0], MSG_ERROR);
    bytes
        .get(1)
        .and_then(|code| ReaderErrorCode::from_byte(*code))
        .map(CodecError::Reader)
        .unwrap_or(CodecError::UnknownError)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
