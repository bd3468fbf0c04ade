// Path: crates/types/src/codec.rs

//! Defines the canonical, deterministic binary codec for all signed material.
//!
//! This module provides simple wrappers around `parity-scale-codec` (SCALE),
//! chosen for its compact and deterministic properties. By centralizing the
//! codec logic here in the base `types` crate, we ensure that contract
//! signing, contract hashing, plan signing, and capsule headers all use the
//! exact same serialization, so two equal values always produce byte-equal
//! output.
//!
//! Canonical structs must keep their collections in `BTreeSet`/`BTreeMap`
//! form (lexicographic iteration order) and their numerics as integers;
//! floating-point fields are never part of signed material.

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encodes a value into its canonical byte representation.
///
/// This function must be used for all data that is hashed for signing,
/// replay protection, or integrity checks.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical byte representation.
///
/// Fails fast on any decoding error, including trailing bytes, so malformed
/// or truncated input is never silently accepted.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode_all(&mut &*b).map_err(|e| format!("canonical decode failed: {}", e))
}
