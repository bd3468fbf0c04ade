// Path: crates/crypto/src/error.rs
//! Local error types for the `veil-crypto` crate.

// Re-export the canonical error type from the types crate.
pub use veil_types::error::CryptoError;
