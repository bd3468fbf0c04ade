// Path: crates/test_utils/src/randomness.rs
//! Seeded randomness for reproducible tests.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// A deterministic RNG seeded from a test name or fixed seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// `len` deterministic pseudo-random bytes (high entropy, reproducible).
pub fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = seeded_rng(seed);
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes
}
