// Path: crates/transport/src/capsule.rs
//! Capsule sealing, verification, and opening.
//!
//! Wire form: signed header | AEAD ciphertext (IV ‖ ct ‖ tag) | key-wrap
//! (session-key-encrypted symmetric key) | proof block. The capsule hash is
//! SHA-256 over (canonical header ‖ ciphertext).

use rand::RngCore;
use tracing::info;
use uuid::Uuid;
use veil_crypto::aead;
use veil_crypto::hash::{sha256_concat, sha256_hex};
use veil_crypto::sign::P256KeyPair;
use veil_types::capsule::{
    CapsuleHeader, EncryptedPayload, ProofBlock, TimeCapsule, CAPSULE_SCHEMA_VERSION,
};
use veil_types::error::{CoreError, IntegrityError, SafetyError};
use zeroize::Zeroizing;

/// Everything the sealer needs to bind a capsule to its plan and contract.
#[derive(Debug, Clone)]
pub struct SealRequest<'a> {
    /// The plan that produced the payload.
    pub plan_id: &'a str,
    /// Hex SHA-256 over the plan's canonical bytes.
    pub plan_hash: &'a str,
    /// The governing contract.
    pub contract_id: &'a str,
    /// Producing node identity (pairwise DID).
    pub node_id: &'a str,
    /// Receiving requester identity.
    pub requester_id: &'a str,
    /// Payload TTL, UTC epoch milliseconds.
    pub ttl_ms: u64,
    /// Sealing time, UTC epoch milliseconds.
    pub now_ms: u64,
}

/// Seals `payload` into a time capsule.
///
/// A fresh symmetric key encrypts the payload; the session key wraps the
/// symmetric key; the node keypair signs the capsule hash.
pub fn seal_capsule(
    request: &SealRequest<'_>,
    payload: &[u8],
    session_key: &[u8; 32],
    node_keypair: &P256KeyPair,
) -> Result<TimeCapsule, CoreError> {
    let header = CapsuleHeader {
        capsule_id: Uuid::new_v4().to_string(),
        plan_id: request.plan_id.to_string(),
        contract_id: request.contract_id.to_string(),
        ttl_ms: request.ttl_ms,
        schema_version: CAPSULE_SCHEMA_VERSION,
        node_id: request.node_id.to_string(),
        requester_id: request.requester_id.to_string(),
        created_at_ms: request.now_ms,
    };

    let mut symmetric = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(symmetric.as_mut());

    let sealed = aead::seal(&symmetric, payload).map_err(CoreError::Crypto)?;
    let wrapped = aead::seal(session_key, symmetric.as_ref()).map_err(CoreError::Crypto)?;
    let mut wrapped_key = wrapped.iv.clone();
    wrapped_key.extend_from_slice(&wrapped.ciphertext);

    let capsule_hash = hex::encode(sha256_concat([
        header.canonical_bytes().as_slice(),
        sealed.ciphertext.as_slice(),
    ]));
    let node_signature =
        veil_crypto::sign::sign_detached(node_keypair, capsule_hash.as_bytes())
            .map_err(CoreError::Crypto)?;

    info!(capsule_id = %header.capsule_id, bytes = sealed.ciphertext.len(), "capsule sealed");
    Ok(TimeCapsule {
        payload: EncryptedPayload {
            iv: sealed.iv,
            ciphertext: sealed.ciphertext,
            wrapped_key,
            capsule_hash: capsule_hash.clone(),
        },
        proof: ProofBlock {
            capsule_hash,
            node_signature,
            contract_id: request.contract_id.to_string(),
            plan_hash: request.plan_hash.to_string(),
            signed_at_ms: request.now_ms,
        },
        header,
    })
}

/// Verifies a capsule's hash binding and proof signature.
pub fn verify_capsule(
    capsule: &TimeCapsule,
    node_public_key_sec1: &[u8],
) -> Result<(), IntegrityError> {
    let recomputed = hex::encode(sha256_concat([
        capsule.header.canonical_bytes().as_slice(),
        capsule.payload.ciphertext.as_slice(),
    ]));
    if recomputed != capsule.payload.capsule_hash {
        return Err(IntegrityError::CapsuleTampered(
            "capsule hash does not match header and ciphertext".to_string(),
        ));
    }
    if capsule.proof.capsule_hash != capsule.payload.capsule_hash {
        return Err(IntegrityError::CapsuleTampered(
            "proof block hash disagrees with the payload".to_string(),
        ));
    }
    if !veil_crypto::sign::verify_detached(
        node_public_key_sec1,
        capsule.proof.capsule_hash.as_bytes(),
        &capsule.proof.node_signature,
    ) {
        return Err(IntegrityError::CapsuleTampered(
            "node signature over the capsule hash is invalid".to_string(),
        ));
    }
    Ok(())
}

/// Opens a verified capsule with the session key.
pub fn open_capsule(
    capsule: &TimeCapsule,
    session_key: &[u8; 32],
) -> Result<Vec<u8>, CoreError> {
    if capsule.payload.wrapped_key.len() <= aead::NONCE_LEN {
        return Err(CoreError::Integrity(IntegrityError::CapsuleTampered(
            "wrapped key is truncated".to_string(),
        )));
    }
    let (wrap_iv, wrap_ct) = capsule.payload.wrapped_key.split_at(aead::NONCE_LEN);
    let symmetric = aead::open(session_key, wrap_iv, wrap_ct).map_err(CoreError::Crypto)?;
    let symmetric: Zeroizing<[u8; 32]> = Zeroizing::new(
        symmetric
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::Crypto(veil_types::error::CryptoError::DecryptionFailed(
                "unwrapped key has the wrong length".to_string(),
            )))?,
    );
    aead::open(&symmetric, &capsule.payload.iv, &capsule.payload.ciphertext)
        .map_err(CoreError::Crypto)
}

/// Ciphertext verification before anything leaves the device: the bytes
/// must read as ciphertext (entropy ≥ 7.0 bits/byte).
pub fn verify_ciphertext(bytes: &[u8]) -> Result<(), SafetyError> {
    let entropy = veil_egress::shannon_entropy(bytes);
    if entropy < veil_egress::classify::CIPHERTEXT_ENTROPY_THRESHOLD {
        return Err(SafetyError::ForbiddenPattern(format!(
            "outbound capsule bytes have entropy {:.2}, below the ciphertext threshold",
            entropy
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_api::crypto::{SerializableKey, SigningKeyPair};

    const NOW: u64 = 1_705_314_600_000;

    fn seal_request() -> SealRequest<'static> {
        SealRequest {
            plan_id: "plan-1",
            plan_hash: "ab12",
            contract_id: "c-1",
            node_id: "did:veil:pairwise:00aa",
            requester_id: "acme",
            ttl_ms: NOW + 60_000,
            now_ms: NOW,
        }
    }

    #[test]
    fn seal_verify_open_roundtrip() {
        let pair = P256KeyPair::generate();
        let session_key = [9u8; 32];
        let payload = br#"{"_aggregate_type":"count","_aggregate_value":12}"#;

        let capsule = seal_capsule(&seal_request(), payload, &session_key, &pair).unwrap();
        verify_capsule(&capsule, &pair.public_key().to_bytes()).unwrap();
        let opened = open_capsule(&capsule, &session_key).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn flipped_ciphertext_is_detected() {
        let pair = P256KeyPair::generate();
        let mut capsule =
            seal_capsule(&seal_request(), b"payload-bytes-here", &[9u8; 32], &pair).unwrap();
        capsule.payload.ciphertext[0] ^= 0x01;
        assert!(verify_capsule(&capsule, &pair.public_key().to_bytes()).is_err());
    }

    #[test]
    fn foreign_key_cannot_open() {
        let pair = P256KeyPair::generate();
        let capsule =
            seal_capsule(&seal_request(), b"payload-bytes-here", &[9u8; 32], &pair).unwrap();
        assert!(open_capsule(&capsule, &[8u8; 32]).is_err());
    }

    #[test]
    fn tampered_header_breaks_the_hash() {
        let pair = P256KeyPair::generate();
        let mut capsule =
            seal_capsule(&seal_request(), b"payload-bytes-here", &[9u8; 32], &pair).unwrap();
        capsule.header.requester_id = "someone-else".to_string();
        assert!(verify_capsule(&capsule, &pair.public_key().to_bytes()).is_err());
    }

    #[test]
    fn ciphertext_check_rejects_plaintext() {
        assert!(verify_ciphertext(b"clearly not encrypted data, repeated words words").is_err());
        let pair = P256KeyPair::generate();
        let capsule =
            seal_capsule(&seal_request(), &[0u8; 4096], &[9u8; 32], &pair).unwrap();
        verify_ciphertext(&capsule.payload.ciphertext).unwrap();
    }
}
