// Path: crates/api/src/storage/mod.rs
//! Secure storage abstraction behind the root key.

use veil_types::error::CryptoError;
use zeroize::Zeroizing;

/// A store for sensitive key material.
///
/// Implementations declare whether they are hardware-backed; when the node
/// configuration requires hardware backing and the store cannot provide it,
/// startup fails with a fatal configuration error.
pub trait SecureStore: Send + Sync {
    /// True when keys never leave a hardware boundary in plaintext.
    fn hardware_backed(&self) -> bool;

    /// Persists secret bytes under a label, overwriting any previous value.
    fn put(&self, label: &str, secret: &[u8]) -> Result<(), CryptoError>;

    /// Loads secret bytes by label; `Ok(None)` when absent.
    fn get(&self, label: &str) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError>;

    /// Removes a secret. Removing an absent label is not an error.
    fn delete(&self, label: &str) -> Result<(), CryptoError>;
}
