// Path: crates/consent/src/contract.rs
//! The contract engine: build, sign, countersign, and verify consent
//! contracts.
//!
//! Contracts are signed with the pairwise keypair held for the requester —
//! never the root key — so a requester cannot correlate this node across
//! its other relationships through the verification key.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use veil_audit::{AuditEventType, AuditLog};
use veil_identity::IdentityCore;
use veil_types::contract::{
    ContractDraft, ContractVerification, ObligationTerms, SignatureStatus, SignedContract,
};
use veil_types::error::{CoreError, ProtocolError};
use veil_types::request::{DataRequest, OutputMode};

/// The user's consent choices for one request.
#[derive(Debug, Clone)]
pub struct UserChoices {
    /// Labels the user granted.
    pub selected_labels: BTreeSet<String>,
    /// Agreed output mode.
    pub output_mode: OutputMode,
    /// Whether the stable node identity is revealed.
    pub identity_reveal: bool,
    /// Contract TTL, UTC epoch milliseconds.
    pub ttl_ms: u64,
    /// Obligation terms the requester committed to.
    pub obligations: ObligationTerms,
    /// Escrow reference, when compensation is escrowed.
    pub escrow_ref: Option<String>,
}

/// The contract engine.
pub struct ContractEngine {
    identity: Arc<IdentityCore>,
    audit: Arc<AuditLog>,
}

impl ContractEngine {
    /// An engine over the node's identity core and audit log.
    pub fn new(identity: Arc<IdentityCore>, audit: Arc<AuditLog>) -> Self {
        Self { identity, audit }
    }

    /// Builds a draft from a request and the user's choices.
    ///
    /// Invariants enforced here: required ⊆ selected ⊆ required ∪ optional,
    /// TTL strictly in the future, and a fresh cryptographically random
    /// nonce per build.
    pub fn build_draft(
        &self,
        request: &DataRequest,
        choices: &UserChoices,
        now_ms: u64,
    ) -> Result<ContractDraft, CoreError> {
        if !request.required_labels.is_subset(&choices.selected_labels) {
            let missing: Vec<&String> = request
                .required_labels
                .difference(&choices.selected_labels)
                .collect();
            return Err(CoreError::Validation(format!(
                "selection is missing required labels: {:?}",
                missing
            )));
        }
        let grantable = request.grantable_labels();
        if !choices.selected_labels.is_subset(&grantable) {
            let extra: Vec<&String> =
                choices.selected_labels.difference(&grantable).collect();
            return Err(CoreError::Validation(format!(
                "selection contains labels the request never asked for: {:?}",
                extra
            )));
        }
        if choices.ttl_ms <= now_ms {
            return Err(CoreError::Validation(
                "contract TTL must be strictly in the future".into(),
            ));
        }

        Ok(ContractDraft {
            contract_id: Uuid::new_v4().to_string(),
            request_id: request.request_id.clone(),
            requester_id: request.requester_id.clone(),
            node_id: self.identity.pairwise_did(&request.requester_id),
            selected_labels: choices.selected_labels.clone(),
            time_window: request.time_window,
            output_mode: choices.output_mode,
            identity_reveal: choices.identity_reveal,
            compensation_micros: request.compensation.amount_micros,
            compensation_currency: request.compensation.currency.clone(),
            escrow_ref: choices.escrow_ref.clone(),
            ttl_ms: choices.ttl_ms,
            obligations: choices.obligations.clone(),
            nonce: Uuid::new_v4().to_string(),
            created_at_ms: now_ms,
            metadata: Default::default(),
        })
    }

    /// Signs a draft with the pairwise key for its requester.
    pub fn sign(&self, draft: ContractDraft, now_ms: u64) -> Result<SignedContract, CoreError> {
        if draft.is_expired(now_ms) {
            return Err(ProtocolError::Expired(format!(
                "contract draft {} TTL has passed",
                draft.contract_id
            ))
            .into());
        }

        let pairwise = self.identity.pairwise_identity(&draft.requester_id);
        let signature =
            veil_crypto::sign::sign_detached(&pairwise.keypair, &draft.canonical_bytes())
                .map_err(CoreError::Crypto)?;

        self.audit
            .append(
                AuditEventType::ContractSigned,
                "consent contract signed",
                serde_json::json!({
                    "contract_id": draft.contract_id,
                    "request_id": draft.request_id,
                    "requester_id": draft.requester_id,
                    "contract_hash": self.contract_hash(&draft),
                }),
            )
            .map_err(CoreError::Integrity)?;

        info!(contract_id = %draft.contract_id, "contract signed");
        Ok(SignedContract {
            draft,
            node_signature: signature,
            requester_signature: None,
            node_signed_at_ms: now_ms,
            requester_signed_at_ms: None,
            status: SignatureStatus::DsSigned,
        })
    }

    /// Adds the requester's countersignature.
    pub fn add_countersignature(
        &self,
        mut signed: SignedContract,
        requester_signature_hex: String,
        now_ms: u64,
    ) -> Result<SignedContract, CoreError> {
        if signed.status != SignatureStatus::DsSigned {
            return Err(CoreError::Validation(format!(
                "countersignature requires a node-signed contract, found {:?}",
                signed.status
            )));
        }
        if signed.requester_signature.is_some() {
            return Err(CoreError::Validation(
                "contract is already countersigned".into(),
            ));
        }
        signed.requester_signature = Some(requester_signature_hex);
        signed.requester_signed_at_ms = Some(now_ms);
        signed.status = SignatureStatus::FullySigned;
        Ok(signed)
    }

    /// Verifies a signed contract: draft untampered under the node
    /// signature, requester signature (when present) valid, and TTL not
    /// passed. Returns a verification report rather than failing on the
    /// first problem.
    pub fn verify(
        &self,
        signed: &SignedContract,
        requester_public_key_sec1: Option<&[u8]>,
        now_ms: u64,
    ) -> ContractVerification {
        let mut errors = Vec::new();
        let canonical = signed.draft.canonical_bytes();

        let pairwise = self.identity.pairwise_identity(&signed.draft.requester_id);
        let node_pub = veil_api::crypto::SerializableKey::to_bytes(
            &veil_api::crypto::SigningKeyPair::public_key(&pairwise.keypair),
        );
        if !self
            .identity
            .verify(&node_pub, &canonical, &signed.node_signature)
        {
            errors.push(
                "node signature mismatch: draft tampered or signed by another key".to_string(),
            );
        }

        if let (Some(sig), Some(pk)) = (&signed.requester_signature, requester_public_key_sec1) {
            if !self.identity.verify(pk, &canonical, sig) {
                errors.push("requester countersignature is invalid".to_string());
            }
        }

        if signed.draft.is_expired(now_ms) {
            errors.push("contract TTL has passed".to_string());
        }

        ContractVerification {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Stable integrity hash of a draft (hex SHA-256 over canonical bytes).
    pub fn contract_hash(&self, draft: &ContractDraft) -> String {
        veil_crypto::hash::sha256_hex(&draft.canonical_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use veil_api::crypto::{SerializableKey, SigningKeyPair};
    use veil_crypto::key_store::FileKeyStore;
    use veil_crypto::sign::P256KeyPair;
    use veil_test_utils::fixtures;
    use veil_types::config::IdentityConfig;

    const NOW: u64 = 1_705_314_600_000;

    fn engine() -> (ContractEngine, Arc<AuditLog>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileKeyStore::open(dir.path(), "test").unwrap());
        let audit = Arc::new(AuditLog::new("did:veil:node:test"));
        let identity =
            Arc::new(IdentityCore::new(store, IdentityConfig::default(), audit.clone()).unwrap());
        (ContractEngine::new(identity, audit.clone()), audit, dir)
    }

    fn choices() -> UserChoices {
        UserChoices {
            selected_labels: fixtures::default_selection(),
            output_mode: OutputMode::AggregateOnly,
            identity_reveal: false,
            ttl_ms: NOW + 60_000,
            obligations: ObligationTerms::default(),
            escrow_ref: None,
        }
    }

    #[test]
    fn build_enforces_label_subsets() {
        let (engine, _audit, _dir) = engine();
        let request = fixtures::broadcast_request("req-1", NOW);

        let draft = engine.build_draft(&request, &choices(), NOW).unwrap();
        assert!(request.required_labels.is_subset(&draft.selected_labels));
        assert!(draft.selected_labels.is_subset(&request.grantable_labels()));

        // Missing a required label.
        let mut missing = choices();
        missing.selected_labels.remove("domain:activity");
        assert!(engine.build_draft(&request, &missing, NOW).is_err());

        // Selecting something never offered.
        let mut extra = choices();
        extra.selected_labels.insert("domain:health".into());
        assert!(engine.build_draft(&request, &extra, NOW).is_err());
    }

    #[test]
    fn nonces_are_unique_across_builds() {
        let (engine, _audit, _dir) = engine();
        let request = fixtures::broadcast_request("req-1", NOW);
        let mut nonces = HashSet::new();
        for _ in 0..50 {
            let draft = engine.build_draft(&request, &choices(), NOW).unwrap();
            assert!(nonces.insert(draft.nonce));
        }
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let (engine, audit, _dir) = engine();
        let request = fixtures::broadcast_request("req-1", NOW);
        let draft = engine.build_draft(&request, &choices(), NOW).unwrap();
        let signed = engine.sign(draft, NOW).unwrap();

        assert_eq!(signed.status, SignatureStatus::DsSigned);
        let report = engine.verify(&signed, None, NOW);
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(audit.query_by_type(AuditEventType::ContractSigned).len(), 1);
    }

    #[test]
    fn tampered_selection_fails_verification() {
        let (engine, _audit, _dir) = engine();
        let request = fixtures::broadcast_request("req-1", NOW);
        let draft = engine.build_draft(&request, &choices(), NOW).unwrap();
        let mut signed = engine.sign(draft, NOW).unwrap();

        signed.draft.selected_labels = ["domain:tampered".to_string()].into();
        let report = engine.verify(&signed, None, NOW);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("tampered")));
    }

    #[test]
    fn countersignature_state_machine() {
        let (engine, _audit, _dir) = engine();
        let request = fixtures::broadcast_request("req-1", NOW);
        let requester_pair = P256KeyPair::generate();

        let draft = engine.build_draft(&request, &choices(), NOW).unwrap();
        let canonical = draft.canonical_bytes();
        let signed = engine.sign(draft, NOW).unwrap();

        let requester_sig =
            veil_crypto::sign::sign_detached(&requester_pair, &canonical).unwrap();
        let full = engine
            .add_countersignature(signed, requester_sig, NOW + 1)
            .unwrap();
        assert_eq!(full.status, SignatureStatus::FullySigned);

        // A second countersign is rejected.
        assert!(engine
            .add_countersignature(full.clone(), "00".repeat(64), NOW + 2)
            .is_err());

        let report = engine.verify(
            &full,
            Some(&requester_pair.public_key().to_bytes()),
            NOW + 2,
        );
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn expired_draft_cannot_be_signed() {
        let (engine, _audit, _dir) = engine();
        let request = fixtures::broadcast_request("req-1", NOW);
        let mut c = choices();
        c.ttl_ms = NOW + 10;
        let draft = engine.build_draft(&request, &c, NOW).unwrap();
        assert!(engine.sign(draft, NOW + 11).is_err());
    }

    #[test]
    fn contract_hash_is_stable() {
        let (engine, _audit, _dir) = engine();
        let request = fixtures::broadcast_request("req-1", NOW);
        let draft = engine.build_draft(&request, &choices(), NOW).unwrap();
        assert_eq!(engine.contract_hash(&draft), engine.contract_hash(&draft));
    }
}
