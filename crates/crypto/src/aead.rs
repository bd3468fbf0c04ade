// Path: crates/crypto/src/aead.rs
//! AES-256-GCM sealing used for capsule payloads and key wrapping.

use crate::error::CryptoError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

/// AEAD nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Output of a seal operation: IV plus ciphertext with the tag appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Fresh random nonce.
    pub iv: Vec<u8>,
    /// Ciphertext ‖ tag.
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under a 32-byte key with a fresh random nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Sealed, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut iv = vec![0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::OperationFailed("AEAD encryption failed".to_string()))?;
    Ok(Sealed { iv, ciphertext })
}

/// Decrypts and authenticates a sealed payload.
pub fn open(key: &[u8; 32], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != NONCE_LEN {
        return Err(CryptoError::DecryptionFailed(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            iv.len()
        )));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("authentication failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = [7u8; 32];
        let sealed = seal(&key, b"plan output").unwrap();
        let opened = open(&key, &sealed.iv, &sealed.ciphertext).unwrap();
        assert_eq!(opened, b"plan output");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = [7u8; 32];
        let mut sealed = seal(&key, b"plan output").unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(open(&key, &sealed.iv, &sealed.ciphertext).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal(&[7u8; 32], b"plan output").unwrap();
        assert!(open(&[8u8; 32], &sealed.iv, &sealed.ciphertext).is_err());
    }
}
