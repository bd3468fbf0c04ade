// Path: crates/crypto/src/kdf.rs
//! Session-key derivation: P-256 ECDH followed by HKDF-SHA256.
//!
//! The session identity is bound into the derivation as the HKDF `info`
//! parameter, so two sessions between the same peers never share a key.

use crate::error::CryptoError;
use hkdf::Hkdf;
use p256::ecdsa::{SigningKey, VerifyingKey};
use sha2::Sha256;
use veil_api::crypto::SessionKeyDerivation;
use zeroize::Zeroizing;

/// ECDH + HKDF-SHA256 session-key derivation over P-256.
#[derive(Debug, Default, Clone, Copy)]
pub struct P256SessionKdf;

impl SessionKeyDerivation for P256SessionKdf {
    type PrivateKey = SigningKey;
    type PublicKey = VerifyingKey;

    fn derive_session_key(
        &self,
        local: &Self::PrivateKey,
        peer: &Self::PublicKey,
        info: &[u8],
    ) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        let shared = p256::ecdh::diffie_hellman(local.as_nonzero_scalar(), peer.as_affine());
        let hk = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());
        let mut okm = Zeroizing::new([0u8; 32]);
        hk.expand(info, okm.as_mut())
            .map_err(|e| CryptoError::DerivationFailed(e.to_string()))?;
        Ok(okm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn both_sides_derive_the_same_key() {
        let a = SigningKey::random(&mut OsRng);
        let b = SigningKey::random(&mut OsRng);
        let kdf = P256SessionKdf;

        let ab = kdf
            .derive_session_key(&a, &VerifyingKey::from(&b), b"session-1")
            .unwrap();
        let ba = kdf
            .derive_session_key(&b, &VerifyingKey::from(&a), b"session-1")
            .unwrap();
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn session_id_separates_keys() {
        let a = SigningKey::random(&mut OsRng);
        let b = SigningKey::random(&mut OsRng);
        let kdf = P256SessionKdf;

        let one = kdf
            .derive_session_key(&a, &VerifyingKey::from(&b), b"session-1")
            .unwrap();
        let two = kdf
            .derive_session_key(&a, &VerifyingKey::from(&b), b"session-2")
            .unwrap();
        assert_ne!(*one, *two);
    }
}
