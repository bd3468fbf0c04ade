// Path: crates/api/src/crypto/mod.rs
//! Defines unified traits for cryptographic primitives.

use veil_types::error::CryptoError;
use zeroize::Zeroizing;

/// A trait for any key or signature that can be serialized to and from bytes.
pub trait SerializableKey {
    /// Converts the value to a byte vector.
    fn to_bytes(&self) -> Vec<u8>;

    /// Creates the value from a byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>
    where
        Self: Sized;
}

/// A marker trait for a cryptographic signature.
pub trait Signature: SerializableKey {}

/// A trait for a public key used for signature verification.
pub trait VerifyingKey: SerializableKey {
    /// The signature type that this key can verify.
    type Signature: Signature;

    /// Verifies a signature against a message.
    ///
    /// A mismatch is an `Err`, never a panic; callers that want a boolean
    /// use `is_ok()`.
    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError>;
}

/// A trait for a private key used for signing operations.
pub trait SigningKey: SerializableKey {
    /// The signature type that this key produces.
    type Signature: Signature;

    /// Signs a message.
    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError>;
}

/// A trait for a key pair used in a signature algorithm.
pub trait SigningKeyPair {
    /// The public key type used for verification.
    type PublicKey: VerifyingKey<Signature = Self::Signature>;
    /// The private key type used for signing.
    type PrivateKey: SigningKey<Signature = Self::Signature>;
    /// The signature type produced.
    type Signature: Signature;

    /// Gets the public key.
    fn public_key(&self) -> Self::PublicKey;
    /// Gets the private key.
    fn private_key(&self) -> Self::PrivateKey;
    /// Signs a message with the private key.
    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError>;
}

/// A trait for deriving a shared session secret from a local private key and
/// a peer public key (elliptic-curve key agreement followed by a KDF).
pub trait SessionKeyDerivation {
    /// The local private key type.
    type PrivateKey;
    /// The peer public key type.
    type PublicKey;

    /// Derives a session key, binding it to `info` (the session identity).
    fn derive_session_key(
        &self,
        local: &Self::PrivateKey,
        peer: &Self::PublicKey,
        info: &[u8],
    ) -> Result<Zeroizing<[u8; 32]>, CryptoError>;
}
