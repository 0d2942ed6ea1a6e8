//! Symmetric primitives for reader sessions
//!
//! Thin, safe wrappers around AES-128-CBC with PKCS#7 padding and an
//! OS-grade random source. Pure functions; all key/IV/length validation
//! happens here so callers never hand malformed material to the cipher.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand_core::{OsRng, RngCore};

use crate::errors::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size; also the key, IV, and nonce size for this protocol.
pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 16;
pub const IV_SIZE: usize = 16;

// ----------------------------------------------------------------------------
// Random Source
// ----------------------------------------------------------------------------

/// Fill a fresh buffer with `n` bytes from the OS CSPRNG.
pub fn random_bytes(n: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|_| CryptoError::RandomFailure)?;
    Ok(buf)
}

/// Generate a random 16-byte IV.
pub fn random_iv() -> Result<[u8; IV_SIZE], CryptoError> {
    let mut iv = [0u8; IV_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|_| CryptoError::RandomFailure)?;
    Ok(iv)
}

// ----------------------------------------------------------------------------
// CBC Encrypt / Decrypt
// ----------------------------------------------------------------------------

/// Encrypt `plaintext` under `key` with CBC + PKCS#7.
///
/// A fresh random IV is generated when `iv` is `None`. Returns the IV used
/// together with the ciphertext; the wire format transmits both.
pub fn encrypt(
    key: &[u8],
    plaintext: &[u8],
    iv: Option<&[u8]>,
) -> Result<([u8; IV_SIZE], Vec<u8>), CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeySize { actual: key.len() });
    }

    let iv = match iv {
        Some(bytes) => {
            if bytes.len() != IV_SIZE {
                return Err(CryptoError::InvalidIvSize {
                    actual: bytes.len(),
                });
            }
            let mut fixed = [0u8; IV_SIZE];
            fixed.copy_from_slice(bytes);
            fixed
        }
        None => random_iv()?,
    };

    let cipher =
        Aes128CbcEnc::new_from_slices(key, &iv).map_err(|_| CryptoError::CipherFailure)?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Ok((iv, ciphertext))
}

/// Decrypt CBC ciphertext under `key` and strip PKCS#7 padding.
///
/// Padding validation is strict: the final byte `p` must satisfy
/// `1 <= p <= 16`, all `p` trailing bytes must equal `p`, and `p` may not
/// exceed the buffer. Any violation yields [`CryptoError::InvalidPadding`]
/// with no partial plaintext.
pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeySize { actual: key.len() });
    }
    if iv.len() != IV_SIZE {
        return Err(CryptoError::InvalidIvSize { actual: iv.len() });
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::CipherFailure);
    }

    let cipher =
        Aes128CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::CipherFailure)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::InvalidPadding)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};

    const KEY: [u8; KEY_SIZE] = [0x13; KEY_SIZE];

    #[test]
    fn roundtrip_with_generated_iv() {
        let plaintext = b"prod-pin_access_tool-7603489";
        let (iv, ct) = encrypt(&KEY, plaintext, None).unwrap();
        assert_eq!(ct.len() % BLOCK_SIZE, 0);
        let out = decrypt(&KEY, &iv, &ct).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    fn roundtrip_with_explicit_iv() {
        let iv = [0xA5u8; IV_SIZE];
        let (iv_out, ct) = encrypt(&KEY, &[0u8; 16], Some(&iv)).unwrap();
        assert_eq!(iv_out, iv);
        // A 16-byte plaintext pads out to two blocks.
        assert_eq!(ct.len(), 32);
        assert_eq!(decrypt(&KEY, &iv, &ct).unwrap(), [0u8; 16]);
    }

    #[test]
    fn rejects_bad_key_and_iv_sizes() {
        assert_eq!(
            encrypt(&[0u8; 8], b"x", None).unwrap_err(),
            CryptoError::InvalidKeySize { actual: 8 }
        );
        assert_eq!(
            encrypt(&KEY, b"x", Some(&[0u8; 12])).unwrap_err(),
            CryptoError::InvalidIvSize { actual: 12 }
        );
        assert_eq!(
            decrypt(&[0u8; 24], &[0u8; IV_SIZE], &[0u8; 16]).unwrap_err(),
            CryptoError::InvalidKeySize { actual: 24 }
        );
        assert_eq!(
            decrypt(&KEY, &[0u8; 4], &[0u8; 16]).unwrap_err(),
            CryptoError::InvalidIvSize { actual: 4 }
        );
    }

    #[test]
    fn rejects_empty_and_ragged_ciphertext() {
        assert_eq!(
            decrypt(&KEY, &[0u8; IV_SIZE], &[]).unwrap_err(),
            CryptoError::CipherFailure
        );
        assert_eq!(
            decrypt(&KEY, &[0u8; IV_SIZE], &[0u8; 17]).unwrap_err(),
            CryptoError::CipherFailure
        );
    }

    /// Build one CBC block by hand so the decrypted plaintext is exactly
    /// `block`, allowing deterministic padding-byte corruption.
    fn cbc_block_for(plaintext_block: &[u8; BLOCK_SIZE], iv: &[u8; IV_SIZE]) -> Vec<u8> {
        let raw = aes::Aes128::new(GenericArray::from_slice(&KEY));
        let mut block = *plaintext_block;
        for (b, v) in block.iter_mut().zip(iv.iter()) {
            *b ^= v;
        }
        let mut ga = GenericArray::clone_from_slice(&block);
        raw.encrypt_block(&mut ga);
        ga.to_vec()
    }

    #[test]
    fn rejects_zero_padding_byte() {
        let iv = [0u8; IV_SIZE];
        // p == 0 is outside 1..=16.
        let block = [0u8; BLOCK_SIZE];
        let ct = cbc_block_for(&block, &iv);
        assert_eq!(decrypt(&KEY, &iv, &ct).unwrap_err(), CryptoError::InvalidPadding);
    }

    #[test]
    fn rejects_oversized_padding_byte() {
        let iv = [0u8; IV_SIZE];
        let mut block = [0x11u8; BLOCK_SIZE];
        block[BLOCK_SIZE - 1] = 0x11; // p == 17 > 16
        let ct = cbc_block_for(&block, &iv);
        assert_eq!(decrypt(&KEY, &iv, &ct).unwrap_err(), CryptoError::InvalidPadding);
    }

    #[test]
    fn rejects_inconsistent_padding_run() {
        let iv = [0u8; IV_SIZE];
        // Claims p == 4 but the run is broken.
        let mut block = [0x00u8; BLOCK_SIZE];
        block[12] = 0x09;
        block[13] = 0x04;
        block[14] = 0x04;
        block[15] = 0x04;
        let ct = cbc_block_for(&block, &iv);
        assert_eq!(decrypt(&KEY, &iv, &ct).unwrap_err(), CryptoError::InvalidPadding);
    }

    #[test]
    fn random_bytes_are_fresh() {
        let a = random_bytes(16).unwrap();
        let b = random_bytes(16).unwrap();
        assert_eq!(a.len(), 16);
        // Collision of two 128-bit draws would indicate a broken source.
        assert_ne!(a, b);
    }
}
