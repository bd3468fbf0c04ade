// Path: crates/crypto/src/key_store.rs
//! Secure storage for sensitive keys, file-backed.
//!
//! Format V1:
//! [ Magic: "VEIL-KEY" (8) ]
//! [ Version: u16 (2) ]
//! [ KDF Iters: u32 (4) ]
//! [ Salt: 16B ]
//! [ Nonce: 12B ]
//! [ Ciphertext + Tag: N + 16 ]
//!
//! The KEK is derived from the store passphrase with PBKDF2-HMAC-SHA256;
//! wrong passphrase, wrong parameters, or a modified file all surface as an
//! AEAD tag failure.

use crate::aead;
use crate::error::CryptoError;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};
use veil_api::storage::SecureStore;
use zeroize::{Zeroize, Zeroizing, ZeroizeOnDrop};

// Header constants
const HEADER_MAGIC: &[u8; 8] = b"VEIL-KEY";
const HEADER_VERSION: u16 = 1;
const KDF_ITERS: u32 = 600_000;
const SALT_LEN: usize = 16;
const KEK_LEN: usize = 32;
const HEADER_LEN: usize = 8 + 2 + 4 + SALT_LEN + aead::NONCE_LEN;

/// A container for sensitive data that zeroizes on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(pub Vec<u8>);

/// A directory-backed [`SecureStore`]. Not hardware-backed.
pub struct FileKeyStore {
    dir: PathBuf,
    passphrase: Zeroizing<String>,
}

impl FileKeyStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn open(dir: &Path, passphrase: &str) -> Result<Self, CryptoError> {
        fs::create_dir_all(dir)
            .map_err(|e| CryptoError::OperationFailed(format!("key store dir: {}", e)))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            passphrase: Zeroizing::new(passphrase.to_string()),
        })
    }

    fn path_for(&self, label: &str) -> Result<PathBuf, CryptoError> {
        // Labels become file names; keep them boring.
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(CryptoError::OperationFailed(format!(
                "invalid key label '{}'",
                label
            )));
        }
        Ok(self.dir.join(format!("{}.vk", label)))
    }

    fn derive_kek(&self, salt: &[u8], iters: u32) -> [u8; KEK_LEN] {
        let mut kek = [0u8; KEK_LEN];
        pbkdf2_hmac::<Sha256>(self.passphrase.as_bytes(), salt, iters, &mut kek);
        kek
    }

    fn wrap(&self, secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let mut kek = self.derive_kek(&salt, KDF_ITERS);
        let sealed = aead::seal(&kek, secret);
        kek.zeroize();
        let sealed = sealed?;

        // Manually pack bytes for a stable, endian-independent on-disk form.
        let mut out = Vec::with_capacity(HEADER_LEN + sealed.ciphertext.len());
        out.extend_from_slice(HEADER_MAGIC);
        out.extend_from_slice(&HEADER_VERSION.to_be_bytes());
        out.extend_from_slice(&KDF_ITERS.to_be_bytes());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&sealed.iv);
        out.extend_from_slice(&sealed.ciphertext);
        Ok(out)
    }

    fn unwrap_bytes(&self, raw: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if raw.len() < HEADER_LEN {
            return Err(CryptoError::OperationFailed(
                "key file truncated".to_string(),
            ));
        }
        let (magic, rest) = raw.split_at(HEADER_MAGIC.len());
        if magic != HEADER_MAGIC {
            return Err(CryptoError::OperationFailed(
                "key file magic mismatch".to_string(),
            ));
        }
        let (version_bytes, rest) = rest.split_at(2);
        let version = u16::from_be_bytes(version_bytes.try_into().map_err(|_| {
            CryptoError::OperationFailed("key file header malformed".to_string())
        })?);
        if version != HEADER_VERSION {
            return Err(CryptoError::OperationFailed(format!(
                "unsupported key file version {}",
                version
            )));
        }
        let (iter_bytes, rest) = rest.split_at(4);
        let iters = u32::from_be_bytes(iter_bytes.try_into().map_err(|_| {
            CryptoError::OperationFailed("key file header malformed".to_string())
        })?);
        let (salt, rest) = rest.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(aead::NONCE_LEN);

        let mut kek = self.derive_kek(salt, iters);
        let opened = aead::open(&kek, nonce, ciphertext);
        kek.zeroize();
        opened.map(Zeroizing::new)
    }
}

impl SecureStore for FileKeyStore {
    fn hardware_backed(&self) -> bool {
        false
    }

    fn put(&self, label: &str, secret: &[u8]) -> Result<(), CryptoError> {
        let path = self.path_for(label)?;
        let wrapped = self.wrap(secret)?;
        fs::write(&path, wrapped)
            .map_err(|e| CryptoError::OperationFailed(format!("key store write: {}", e)))
    }

    fn get(&self, label: &str) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError> {
        let path = self.path_for(label)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CryptoError::OperationFailed(format!(
                    "key store read: {}",
                    e
                )))
            }
        };
        self.unwrap_bytes(&raw).map(Some)
    }

    fn delete(&self, label: &str) -> Result<(), CryptoError> {
        let path = self.path_for(label)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CryptoError::OperationFailed(format!(
                "key store delete: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::open(dir.path(), "correct horse").unwrap();
        store.put("root", b"private-scalar-bytes").unwrap();
        let loaded = store.get("root").unwrap().unwrap();
        assert_eq!(loaded.as_slice(), b"private-scalar-bytes");
        assert!(!store.hardware_backed());
    }

    #[test]
    fn wrong_passphrase_fails_closed() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::open(dir.path(), "correct horse").unwrap();
        store.put("root", b"private-scalar-bytes").unwrap();

        let other = FileKeyStore::open(dir.path(), "battery staple").unwrap();
        assert!(other.get("root").is_err());
    }

    #[test]
    fn missing_label_is_none_and_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::open(dir.path(), "p").unwrap();
        assert!(store.get("absent").unwrap().is_none());
        store.delete("absent").unwrap();
    }

    #[test]
    fn hostile_labels_rejected() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::open(dir.path(), "p").unwrap();
        assert!(store.put("../escape", b"x").is_err());
        assert!(store.put("", b"x").is_err());
    }
}
