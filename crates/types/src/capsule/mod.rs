// Path: crates/types/src/capsule/mod.rs

//! Authenticated encrypted capsule records and their wire form.
//!
//! A time capsule carries a plan's output to its requester: a signed header,
//! an AEAD-encrypted payload with the symmetric key wrapped under the session
//! key, and a proof block binding the capsule to its contract and plan.

use crate::codec;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// The current capsule schema version.
pub const CAPSULE_SCHEMA_VERSION: u16 = 1;

/// The signed capsule header.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct CapsuleHeader {
    /// Capsule identity.
    pub capsule_id: String,
    /// The plan that produced the payload.
    pub plan_id: String,
    /// The governing contract.
    pub contract_id: String,
    /// Payload time-to-live, UTC epoch milliseconds.
    pub ttl_ms: u64,
    /// Capsule schema version.
    pub schema_version: u16,
    /// Producing node identity (pairwise DID).
    pub node_id: String,
    /// Receiving requester identity.
    pub requester_id: String,
    /// Creation time, UTC epoch milliseconds.
    pub created_at_ms: u64,
}

impl CapsuleHeader {
    /// Canonical bytes of the header (hashed together with the ciphertext).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        codec::to_bytes_canonical(self)
    }
}

/// The encrypted payload block: IV ‖ ciphertext+tag, plus the wrapped key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// AEAD initialization vector.
    pub iv: Vec<u8>,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
    /// The symmetric key, encrypted under the session key.
    pub wrapped_key: Vec<u8>,
    /// Hex SHA-256 over canonical header ‖ ciphertext.
    pub capsule_hash: String,
}

/// The proof block: the node vouches for the capsule hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBlock {
    /// Hex SHA-256 capsule hash (same value as in the payload block).
    pub capsule_hash: String,
    /// Node signature over the capsule hash (hex).
    pub node_signature: String,
    /// The governing contract.
    pub contract_id: String,
    /// Hex SHA-256 over the plan's canonical bytes.
    pub plan_hash: String,
    /// Signing time, UTC epoch milliseconds.
    pub signed_at_ms: u64,
}

/// A complete time capsule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeCapsule {
    /// Signed header.
    pub header: CapsuleHeader,
    /// Encrypted payload.
    pub payload: EncryptedPayload,
    /// Proof block.
    pub proof: ProofBlock,
}

impl TimeCapsule {
    /// True once the capsule's TTL has passed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.header.ttl_ms
    }
}
