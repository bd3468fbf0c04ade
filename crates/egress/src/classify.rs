// Path: crates/egress/src/classify.rs
//! Payload classification: metadata, ciphertext capsule, or raw payload.

use serde::{Deserialize, Serialize};

/// Entropy threshold (bits per byte) above which a payload is treated as
/// ciphertext.
pub const CIPHERTEXT_ENTROPY_THRESHOLD: f64 = 7.0;

/// Payloads shorter than this are metadata or raw, never ciphertext.
const SHORT_PAYLOAD_BYTES: usize = 28;

/// How a payload classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadClass {
    /// Control-plane metadata only.
    MetadataOnly,
    /// High-entropy encrypted capsule bytes.
    CiphertextCapsule,
    /// Anything else. Never admitted.
    RawPayload,
}

/// Shannon entropy of the payload in bits per byte.
pub fn shannon_entropy(payload: &[u8]) -> f64 {
    if payload.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for b in payload {
        counts[*b as usize] += 1;
    }
    let len = payload.len() as f64;
    counts
        .iter()
        .filter(|c| **c > 0)
        .map(|c| {
            let p = *c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn looks_like_metadata(payload: &[u8]) -> bool {
    let Some(first) = payload.first() else {
        return true;
    };
    if *first != b'{' && *first != b'[' {
        return false;
    }
    let text = String::from_utf8_lossy(payload);
    text.contains("\":") || text.contains('=')
}

/// Classifies a payload.
///
/// Empty payloads are metadata; short payloads are metadata when they look
/// like it and raw otherwise; longer payloads classify by entropy first,
/// then by the metadata heuristic.
pub fn classify_payload(payload: &[u8]) -> PayloadClass {
    if payload.is_empty() {
        return PayloadClass::MetadataOnly;
    }
    if payload.len() < SHORT_PAYLOAD_BYTES {
        return if looks_like_metadata(payload) {
            PayloadClass::MetadataOnly
        } else {
            PayloadClass::RawPayload
        };
    }
    if shannon_entropy(payload) > CIPHERTEXT_ENTROPY_THRESHOLD {
        return PayloadClass::CiphertextCapsule;
    }
    if looks_like_metadata(payload) {
        return PayloadClass::MetadataOnly;
    }
    PayloadClass::RawPayload
}
