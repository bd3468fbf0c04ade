// Path: crates/transport/src/transfer.rs
//! Resumable chunked capsule delivery.
//!
//! The control manifest (header, proof, key-wrap) is sealed under the
//! session key before it leaves, so relays and the wire only ever see
//! ciphertext. The AEAD ciphertext is cut into chunks; short fragments are
//! padded or merged up to a floor that keeps every wire image measurably
//! ciphertext (the entropy estimate needs enough bytes to clear the
//! classifier threshold). The manifest carries the true ciphertext length,
//! so the receiver strips any padding.

use bytes::Bytes;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use veil_audit::{AuditEventType, AuditLog};
use veil_crypto::aead;
use veil_egress::{EgressGate, EgressRequest, EgressRequestType};
use veil_types::capsule::TimeCapsule;
use veil_types::error::{CoreError, SafetyError, TransientError};

use crate::capsule::verify_ciphertext;

/// Floor on the wire size of a chunk.
const MIN_CHUNK_BYTES: usize = 512;

/// Status of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Chunks are moving.
    InProgress,
    /// Interrupted; resumable from the last acknowledged chunk.
    Interrupted,
    /// All chunks acknowledged and the completion audited.
    Completed,
    /// Terminally failed (safety rejection).
    Failed,
}

struct TransferState {
    capsule_id: String,
    session_id: String,
    destination: String,
    chunks: Vec<Bytes>,
    acked: usize,
    status: TransferStatus,
}

/// Drives capsule transfers through the egress gate.
pub struct TransferManager {
    gate: Arc<EgressGate>,
    audit: Arc<AuditLog>,
    chunk_bytes: usize,
    chunk_deadline_ms: u64,
    transfers: DashMap<String, TransferState>,
}

fn chunk_ciphertext(ciphertext: &[u8], chunk_bytes: usize) -> Vec<Bytes> {
    let chunk_bytes = chunk_bytes.max(MIN_CHUNK_BYTES);
    let mut chunks: Vec<Vec<u8>> = ciphertext
        .chunks(chunk_bytes)
        .map(<[u8]>::to_vec)
        .collect();

    match chunks.last() {
        Some(last) if last.len() < MIN_CHUNK_BYTES && chunks.len() >= 2 => {
            // Merge a short trailing fragment into its predecessor.
            let last = chunks.pop().unwrap_or_default();
            if let Some(prev) = chunks.last_mut() {
                prev.extend_from_slice(&last);
            }
        }
        Some(last) if last.len() < MIN_CHUNK_BYTES => {
            // A single short chunk is padded with random bytes; the
            // receiver truncates to the manifest's ciphertext length.
            let mut padding = vec![0u8; MIN_CHUNK_BYTES - last.len()];
            rand::rngs::OsRng.fill_bytes(&mut padding);
            if let Some(only) = chunks.last_mut() {
                only.extend_from_slice(&padding);
            }
        }
        _ => {}
    }

    chunks.into_iter().map(Bytes::from).collect()
}

impl TransferManager {
    /// A manager sending through `gate`.
    pub fn new(gate: Arc<EgressGate>, audit: Arc<AuditLog>, chunk_bytes: usize) -> Self {
        Self::with_deadline(gate, audit, chunk_bytes, 10_000)
    }

    /// A manager with an explicit per-chunk deadline.
    pub fn with_deadline(
        gate: Arc<EgressGate>,
        audit: Arc<AuditLog>,
        chunk_bytes: usize,
        chunk_deadline_ms: u64,
    ) -> Self {
        Self {
            gate,
            audit,
            chunk_bytes,
            chunk_deadline_ms,
            transfers: DashMap::new(),
        }
    }

    /// Prepares a transfer: verifies the ciphertext, seals the manifest
    /// under the session key, and sends it. Returns the transfer id.
    pub fn begin(
        &self,
        capsule: &TimeCapsule,
        session_id: &str,
        session_key: &[u8; 32],
        destination: &str,
    ) -> Result<String, CoreError> {
        verify_ciphertext(&capsule.payload.ciphertext).map_err(CoreError::Safety)?;

        let manifest = serde_json::json!({
            "header": capsule.header,
            "proof": capsule.proof,
            "wrapped_key": hex::encode(&capsule.payload.wrapped_key),
            "iv": hex::encode(&capsule.payload.iv),
            "ciphertext_len": capsule.payload.ciphertext.len(),
        });
        let manifest_bytes =
            serde_json::to_vec(&manifest).map_err(|e| CoreError::Validation(e.to_string()))?;
        let sealed_manifest =
            aead::seal(session_key, &manifest_bytes).map_err(CoreError::Crypto)?;
        let mut manifest_wire = sealed_manifest.iv;
        manifest_wire.extend_from_slice(&sealed_manifest.ciphertext);

        self.gate
            .send(&EgressRequest {
                destination: destination.to_string(),
                payload: manifest_wire,
                request_type: EgressRequestType::CapsuleTransfer,
                headers: Default::default(),
            })
            .map_err(CoreError::Safety)?;

        let transfer_id = Uuid::new_v4().to_string();
        let chunks = chunk_ciphertext(&capsule.payload.ciphertext, self.chunk_bytes);
        info!(
            transfer_id = %transfer_id,
            chunks = chunks.len(),
            capsule_id = %capsule.header.capsule_id,
            "transfer prepared"
        );
        self.transfers.insert(
            transfer_id.clone(),
            TransferState {
                capsule_id: capsule.header.capsule_id.clone(),
                session_id: session_id.to_string(),
                destination: destination.to_string(),
                chunks,
                acked: 0,
                status: TransferStatus::InProgress,
            },
        );
        Ok(transfer_id)
    }

    /// Sends the next unacknowledged chunk. Returns true when the transfer
    /// completed with this call.
    pub fn send_next_chunk(&self, transfer_id: &str) -> Result<bool, CoreError> {
        let mut entry = self
            .transfers
            .get_mut(transfer_id)
            .ok_or_else(|| CoreError::Validation(format!("unknown transfer {}", transfer_id)))?;
        let state = entry.value_mut();
        if state.status == TransferStatus::Completed {
            return Ok(true);
        }
        if state.status == TransferStatus::Failed {
            return Err(CoreError::Transient(TransientError::ConnectionError(
                "transfer already failed".to_string(),
            )));
        }
        state.status = TransferStatus::InProgress;

        let Some(chunk) = state.chunks.get(state.acked) else {
            state.status = TransferStatus::Completed;
            return Ok(true);
        };

        let chunk_started = std::time::Instant::now();
        match self.gate.send(&EgressRequest {
            destination: state.destination.clone(),
            payload: chunk.to_vec(),
            request_type: EgressRequestType::CapsuleTransfer,
            headers: Default::default(),
        }) {
            Ok(_) if chunk_started.elapsed().as_millis() as u64 > self.chunk_deadline_ms => {
                // Admitted, but the wire took longer than the deadline: the
                // chunk is not counted acknowledged and the transfer parks
                // resumable.
                warn!(transfer_id, "chunk deadline exceeded, transfer interrupted");
                state.status = TransferStatus::Interrupted;
                return Err(CoreError::Transient(TransientError::Timeout(format!(
                    "chunk exceeded the {} ms deadline",
                    self.chunk_deadline_ms
                ))));
            }
            Ok(_) => {
                state.acked += 1;
            }
            Err(e @ SafetyError::RawPayloadEgress(_))
            | Err(e @ SafetyError::ForbiddenPattern(_))
            | Err(e @ SafetyError::NetworkBlocked) => {
                state.status = TransferStatus::Failed;
                return Err(CoreError::Safety(e));
            }
            Err(e) => {
                // Unknown or deactivated destination mid-transfer: the
                // transfer survives and may resume once re-allowed.
                warn!(transfer_id, error = %e, "chunk send interrupted");
                state.status = TransferStatus::Interrupted;
                return Err(CoreError::Safety(e));
            }
        }

        if state.acked == state.chunks.len() {
            state.status = TransferStatus::Completed;
            let details = serde_json::json!({
                "transfer_id": transfer_id,
                "capsule_id": state.capsule_id,
                "session_id": state.session_id,
                "chunks": state.chunks.len(),
            });
            self.audit
                .append(
                    AuditEventType::TransferCompleted,
                    "capsule transfer completed",
                    details,
                )
                .map_err(CoreError::Integrity)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Drives the transfer to completion.
    pub fn transmit(&self, transfer_id: &str) -> Result<(), CoreError> {
        loop {
            if self.send_next_chunk(transfer_id)? {
                return Ok(());
            }
        }
    }

    /// Marks a transfer interrupted (deadline exceeded, connectivity
    /// loss); it stays resumable from the last acknowledged chunk.
    pub fn interrupt(&self, transfer_id: &str) {
        if let Some(mut entry) = self.transfers.get_mut(transfer_id) {
            if entry.status == TransferStatus::InProgress {
                entry.status = TransferStatus::Interrupted;
            }
        }
    }

    /// Resumes an interrupted transfer from the last acknowledged chunk.
    pub fn resume(&self, transfer_id: &str) -> Result<(), CoreError> {
        {
            let mut entry = self.transfers.get_mut(transfer_id).ok_or_else(|| {
                CoreError::Validation(format!("unknown transfer {}", transfer_id))
            })?;
            if entry.status != TransferStatus::Interrupted {
                return Err(CoreError::Validation(
                    "only interrupted transfers can resume".to_string(),
                ));
            }
            entry.status = TransferStatus::InProgress;
        }
        self.transmit(transfer_id)
    }

    /// Current status with acknowledged and total chunk counts.
    pub fn status(&self, transfer_id: &str) -> Option<(TransferStatus, usize, usize)> {
        self.transfers
            .get(transfer_id)
            .map(|s| (s.status, s.acked, s.chunks.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::{seal_capsule, SealRequest};
    use veil_crypto::sign::P256KeyPair;

    const NOW: u64 = 1_705_314_600_000;

    fn capsule(payload_len: usize) -> TimeCapsule {
        let pair = P256KeyPair::generate();
        seal_capsule(
            &SealRequest {
                plan_id: "plan-1",
                plan_hash: "ab",
                contract_id: "c-1",
                node_id: "did:veil:pairwise:00aa",
                requester_id: "acme",
                ttl_ms: NOW + 60_000,
                now_ms: NOW,
            },
            &vec![0u8; payload_len],
            &[9u8; 32],
            &pair,
        )
        .unwrap()
    }

    fn manager(chunk_bytes: usize) -> (TransferManager, Arc<EgressGate>, Arc<AuditLog>) {
        let gate = Arc::new(EgressGate::new());
        gate.allow("relay.example.net", "Capsule relay");
        let audit = Arc::new(AuditLog::new("did:veil:node:test"));
        (
            TransferManager::new(gate.clone(), audit.clone(), chunk_bytes),
            gate,
            audit,
        )
    }

    #[test]
    fn chunking_pads_and_merges_short_fragments() {
        let short = chunk_ciphertext(&[7u8; 100], 512);
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].len(), MIN_CHUNK_BYTES);

        let merged = chunk_ciphertext(&[7u8; 512 + 40], 512);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 552);

        let exact = chunk_ciphertext(&[7u8; 1024], 512);
        assert_eq!(exact.len(), 2);
    }

    #[test]
    fn transfer_completes_and_audits() {
        let (manager, _gate, audit) = manager(512);
        let capsule = capsule(2048);
        let id = manager
            .begin(&capsule, "s-1", &[9u8; 32], "relay.example.net")
            .unwrap();
        manager.transmit(&id).unwrap();

        let (status, acked, total) = manager.status(&id).unwrap();
        assert_eq!(status, TransferStatus::Completed);
        assert_eq!(acked, total);
        assert_eq!(
            audit.query_by_type(AuditEventType::TransferCompleted).len(),
            1
        );
    }

    #[test]
    fn interrupted_transfer_resumes_from_last_ack() {
        let (manager, _gate, _audit) = manager(512);
        let capsule = capsule(4096);
        let id = manager
            .begin(&capsule, "s-1", &[9u8; 32], "relay.example.net")
            .unwrap();

        assert!(!manager.send_next_chunk(&id).unwrap());
        assert!(!manager.send_next_chunk(&id).unwrap());
        manager.interrupt(&id);
        let (status, acked, total) = manager.status(&id).unwrap();
        assert_eq!(status, TransferStatus::Interrupted);
        assert_eq!(acked, 2);
        assert!(total > 2);

        manager.resume(&id).unwrap();
        let (status, acked, total) = manager.status(&id).unwrap();
        assert_eq!(status, TransferStatus::Completed);
        assert_eq!(acked, total);
    }

    #[test]
    fn low_entropy_payload_never_starts_a_transfer() {
        let (manager, _gate, _audit) = manager(512);
        let mut capsule = capsule(2048);
        capsule.payload.ciphertext = vec![b'A'; 2048];
        let err = manager
            .begin(&capsule, "s-1", &[9u8; 32], "relay.example.net")
            .unwrap_err();
        assert!(matches!(err, CoreError::Safety(_)));
    }

    #[test]
    fn deactivated_destination_interrupts_then_resumes() {
        let (manager, gate, _audit) = manager(512);
        let capsule = capsule(4096);
        let id = manager
            .begin(&capsule, "s-1", &[9u8; 32], "relay.example.net")
            .unwrap();
        assert!(!manager.send_next_chunk(&id).unwrap());

        gate.deactivate("relay.example.net");
        assert!(manager.send_next_chunk(&id).is_err());
        let (status, _, _) = manager.status(&id).unwrap();
        assert_eq!(status, TransferStatus::Interrupted);

        gate.allow("relay.example.net", "Capsule relay");
        manager.resume(&id).unwrap();
        let (status, acked, total) = manager.status(&id).unwrap();
        assert_eq!(status, TransferStatus::Completed);
        assert_eq!(acked, total);
    }
}
