// Path: crates/crypto/src/sign/mod.rs
//! P-256 ECDSA signing (SHA-256 digests) implementing the veil-api traits.

use crate::error::CryptoError;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use veil_api::crypto::{
    SerializableKey, Signature as SignatureTrait, SigningKey as SigningKeyTrait, SigningKeyPair,
    VerifyingKey as VerifyingKeyTrait,
};

/// P-256 key pair.
#[derive(Clone)]
pub struct P256KeyPair {
    /// Private signing key.
    secret_key: SigningKey,
    /// Public verification key.
    public_key: VerifyingKey,
}

/// P-256 ECDSA signature (fixed 64-byte form).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P256Signature(EcdsaSignature);

/// P-256 public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P256PublicKey(VerifyingKey);

/// P-256 private key.
#[derive(Clone)]
pub struct P256PrivateKey(SigningKey);

impl P256KeyPair {
    /// Generate a new P-256 key pair.
    pub fn generate() -> Self {
        let secret_key = SigningKey::random(&mut OsRng);
        let public_key = VerifyingKey::from(&secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create from an existing private key.
    pub fn from_private_key(private_key: &P256PrivateKey) -> Self {
        let secret_key = private_key.0.clone();
        let public_key = VerifyingKey::from(&secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// The inner ECDSA signing key, for key-agreement use.
    pub fn ecdsa_signing_key(&self) -> &SigningKey {
        &self.secret_key
    }

    /// The inner ECDSA verifying key.
    pub fn ecdsa_verifying_key(&self) -> &VerifyingKey {
        &self.public_key
    }
}

impl SigningKeyPair for P256KeyPair {
    type PublicKey = P256PublicKey;
    type PrivateKey = P256PrivateKey;
    type Signature = P256Signature;

    fn public_key(&self) -> Self::PublicKey {
        P256PublicKey(self.public_key)
    }

    fn private_key(&self) -> Self::PrivateKey {
        P256PrivateKey(self.secret_key.clone())
    }

    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError> {
        let signature: EcdsaSignature = self
            .secret_key
            .try_sign(message)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(P256Signature(signature))
    }
}

impl P256PublicKey {
    /// Wraps an ECDSA verifying key.
    pub fn from_verifying_key(vk: VerifyingKey) -> Self {
        Self(vk)
    }

    /// The inner ECDSA verifying key.
    pub fn ecdsa_verifying_key(&self) -> &VerifyingKey {
        &self.0
    }
}

impl VerifyingKeyTrait for P256PublicKey {
    type Signature = P256Signature;

    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError> {
        self.0
            .verify(message, &signature.0)
            .map_err(|_| CryptoError::OperationFailed("signature mismatch".to_string()))
    }
}

impl SerializableKey for P256PublicKey {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_sec1_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(P256PublicKey)
            .map_err(|e| CryptoError::InvalidKey(format!("Failed to parse public key: {}", e)))
    }
}

impl SigningKeyTrait for P256PrivateKey {
    type Signature = P256Signature;

    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError> {
        let signature: EcdsaSignature = self
            .0
            .try_sign(message)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(P256Signature(signature))
    }
}

impl SerializableKey for P256PrivateKey {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        SigningKey::from_slice(bytes)
            .map(P256PrivateKey)
            .map_err(|e| CryptoError::InvalidKey(format!("Failed to parse private key: {}", e)))
    }
}

impl SerializableKey for P256Signature {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        EcdsaSignature::from_slice(bytes)
            .map(P256Signature)
            .map_err(|e| CryptoError::InvalidKey(format!("Failed to parse signature: {}", e)))
    }
}

impl SignatureTrait for P256Signature {}

/// Verifies a hex signature over `message` with a SEC1-encoded public key.
///
/// A malformed key, malformed signature, or mismatch all yield `false`;
/// verification never leaks an exception to the caller.
pub fn verify_detached(public_key_sec1: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(public_key) = P256PublicKey::from_bytes(public_key_sec1) else {
        return false;
    };
    let Ok(signature) = P256Signature::from_bytes(&sig_bytes) else {
        return false;
    };
    public_key.verify(message, &signature).is_ok()
}

/// Signs `message` and returns the signature hex-encoded.
pub fn sign_detached(pair: &P256KeyPair, message: &[u8]) -> Result<String, CryptoError> {
    Ok(hex::encode(pair.sign(message)?.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let pair = P256KeyPair::generate();
        let sig = pair.sign(b"capsule-hash").unwrap();
        pair.public_key().verify(b"capsule-hash", &sig).unwrap();
        assert!(pair.public_key().verify(b"other", &sig).is_err());
    }

    #[test]
    fn detached_helpers_roundtrip() {
        let pair = P256KeyPair::generate();
        let sig_hex = sign_detached(&pair, b"msg").unwrap();
        let pk = pair.public_key().to_bytes();
        assert!(verify_detached(&pk, b"msg", &sig_hex));
        assert!(!verify_detached(&pk, b"tampered", &sig_hex));
        assert!(!verify_detached(&pk, b"msg", "zz-not-hex"));
    }

    #[test]
    fn keys_roundtrip_through_bytes() {
        let pair = P256KeyPair::generate();
        let sk = pair.private_key();
        let restored = P256PrivateKey::from_bytes(&sk.to_bytes()).unwrap();
        let rebuilt = P256KeyPair::from_private_key(&restored);
        assert_eq!(
            pair.public_key().to_bytes(),
            rebuilt.public_key().to_bytes()
        );
    }
}
