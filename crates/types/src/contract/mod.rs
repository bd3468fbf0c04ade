// Path: crates/types/src/contract/mod.rs

//! Consent contract drafts, signed contracts, and obligation terms.
//!
//! A contract governs what a requester may compute over the local index.
//! Drafts are owned by the contract engine until signed; a signed contract is
//! co-owned (by identity) with the requester.

use crate::codec;
use crate::request::OutputMode;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How long and under what policy the requester may retain results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationTerms {
    /// Maximum retention in days.
    pub retention_days: u32,
    /// Named retention policy the requester committed to.
    pub retention_policy: String,
    /// Usage restrictions (free-form policy identifiers).
    pub usage_restrictions: BTreeSet<String>,
    /// Whether the requester must prove deletion at TTL.
    pub deletion_required: bool,
}

impl Default for ObligationTerms {
    fn default() -> Self {
        Self {
            retention_days: 30,
            retention_policy: "aggregate-research".to_string(),
            usage_restrictions: BTreeSet::new(),
            deletion_required: true,
        }
    }
}

/// An unsigned consent contract draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDraft {
    /// Contract identity.
    pub contract_id: String,
    /// The originating request.
    pub request_id: String,
    /// Requester identity.
    pub requester_id: String,
    /// This node's identity (pairwise DID for the requester).
    pub node_id: String,
    /// Labels the user granted; a subset of required ∪ optional.
    pub selected_labels: BTreeSet<String>,
    /// Optional time window carried over from the request.
    pub time_window: Option<crate::request::TimeWindow>,
    /// Agreed output mode.
    pub output_mode: OutputMode,
    /// Whether the node's stable identity is revealed.
    pub identity_reveal: bool,
    /// Compensation in micro-units.
    pub compensation_micros: u64,
    /// Compensation currency.
    pub compensation_currency: String,
    /// Escrow reference at the settlement collaborator.
    pub escrow_ref: Option<String>,
    /// Contract time-to-live, UTC epoch milliseconds.
    pub ttl_ms: u64,
    /// Obligation terms.
    pub obligations: ObligationTerms,
    /// Globally unique nonce.
    pub nonce: String,
    /// Creation time, UTC epoch milliseconds.
    pub created_at_ms: u64,
    /// Free-form metadata (forced-protection markers and similar).
    pub metadata: BTreeMap<String, String>,
}

/// The canonical (signed) form of a draft. Fields are kept in lexicographic
/// order and collections are BTree-based, so serializing the same draft
/// twice yields byte-equal output.
#[derive(Encode, Decode)]
struct DraftCanonicalV1 {
    compensation_currency: String,
    compensation_micros: u64,
    contract_id: String,
    created_at_ms: u64,
    deletion_required: bool,
    escrow_ref: Option<String>,
    identity_reveal: bool,
    metadata: BTreeMap<String, String>,
    node_id: String,
    nonce: String,
    output_mode: u8,
    request_id: String,
    requester_id: String,
    retention_days: u32,
    retention_policy: String,
    selected_labels: BTreeSet<String>,
    time_window: Option<crate::request::TimeWindow>,
    ttl_ms: u64,
    usage_restrictions: BTreeSet<String>,
}

impl ContractDraft {
    /// The deterministic canonical bytes of this draft (UTF-8/SCALE).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        codec::to_bytes_canonical(&DraftCanonicalV1 {
            compensation_currency: self.compensation_currency.clone(),
            compensation_micros: self.compensation_micros,
            contract_id: self.contract_id.clone(),
            created_at_ms: self.created_at_ms,
            deletion_required: self.obligations.deletion_required,
            escrow_ref: self.escrow_ref.clone(),
            identity_reveal: self.identity_reveal,
            metadata: self.metadata.clone(),
            node_id: self.node_id.clone(),
            nonce: self.nonce.clone(),
            output_mode: self.output_mode as u8,
            request_id: self.request_id.clone(),
            requester_id: self.requester_id.clone(),
            retention_days: self.obligations.retention_days,
            retention_policy: self.obligations.retention_policy.clone(),
            selected_labels: self.selected_labels.clone(),
            time_window: self.time_window,
            ttl_ms: self.ttl_ms,
            usage_restrictions: self.obligations.usage_restrictions.clone(),
        })
    }

    /// True once the draft's TTL has passed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.ttl_ms
    }
}

/// Signature lifecycle of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureStatus {
    /// Built, not yet signed.
    Draft,
    /// Signed by the device (node).
    DsSigned,
    /// Countersigned by the requester.
    FullySigned,
    /// Rejected by either party.
    Rejected,
}

/// A draft wrapped with its signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedContract {
    /// The signed draft.
    pub draft: ContractDraft,
    /// Node signature over the draft's canonical bytes (hex).
    pub node_signature: String,
    /// Requester countersignature (hex), once present.
    pub requester_signature: Option<String>,
    /// When the node signed, UTC epoch milliseconds.
    pub node_signed_at_ms: u64,
    /// When the requester countersigned, UTC epoch milliseconds.
    pub requester_signed_at_ms: Option<u64>,
    /// Current signature status.
    pub status: SignatureStatus,
}

/// Outcome of verifying a signed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractVerification {
    /// True when every check passed.
    pub valid: bool,
    /// Human-readable failure descriptions, empty when valid.
    pub errors: Vec<String>,
}
