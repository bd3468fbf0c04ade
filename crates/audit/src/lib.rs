// Path: crates/audit/src/lib.rs
#![forbid(unsafe_code)]

//! # Veil Audit Log
//!
//! A strictly appended, hash-chained event log. Each entry commits to its
//! predecessor's hash, so any modification of a recorded entry is detectable
//! by walking the chain. Appends are totally ordered and serialized by an
//! internal mutex; an append either fully lands (and the chain advances) or
//! nothing is written.

mod file;

pub use file::AuditFile;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Mutex;
use veil_types::error::IntegrityError;
use veil_types::time;

/// The exhaustive set of audited event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// A permission or policy decision (includes key rotation).
    Permission,
    /// A data request entered the inbox.
    RequestReceived,
    /// A consent contract was signed.
    ContractSigned,
    /// A query plan finished executing.
    PlanExecuted,
    /// A capsule was sealed.
    CapsuleCreated,
    /// A capsule transfer completed.
    TransferCompleted,
    /// A session key was destroyed.
    CryptoShred,
}

impl AuditEventType {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permission => "PERMISSION",
            Self::RequestReceived => "REQUEST_RECEIVED",
            Self::ContractSigned => "CONTRACT_SIGNED",
            Self::PlanExecuted => "PLAN_EXECUTED",
            Self::CapsuleCreated => "CAPSULE_CREATED",
            Self::TransferCompleted => "TRANSFER_COMPLETED",
            Self::CryptoShred => "CRYPTO_SHRED",
        }
    }
}

/// Genesis previous-hash: 64 zero hex chars.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One chained audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identity (`<node_id>-<seq>`).
    pub entry_id: String,
    /// Sequence number, starting at 0.
    pub seq: u64,
    /// Event type.
    pub event_type: AuditEventType,
    /// Human-readable description.
    pub description: String,
    /// Structured details, JSON-serialized deterministically for hashing.
    pub details: serde_json::Value,
    /// Append time, UTC epoch milliseconds.
    pub timestamp_ms: u64,
    /// Hex hash of the previous entry (genesis constant for seq 0).
    pub prev_hash: String,
    /// Hex hash of this entry.
    pub entry_hash: String,
    /// The appending node.
    pub node_id: String,
}

fn entry_hash(
    seq: u64,
    prev_hash: &str,
    event_type: AuditEventType,
    description: &str,
    details: &serde_json::Value,
    timestamp_ms: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seq.to_string().as_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(event_type.as_str().as_bytes());
    hasher.update(description.as_bytes());
    hasher.update(details.to_string().as_bytes());
    hasher.update(timestamp_ms.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// The hash-chained append-only audit log.
pub struct AuditLog {
    node_id: String,
    entries: Mutex<Vec<AuditEntry>>,
    file: Option<AuditFile>,
}

impl AuditLog {
    /// An in-memory log for `node_id`.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            entries: Mutex::new(Vec::new()),
            file: None,
        }
    }

    /// A log persisted to `file`, replaying and verifying any existing
    /// entries.
    pub fn with_file(node_id: impl Into<String>, file: AuditFile) -> Result<Self, IntegrityError> {
        let existing = file.replay()?;
        let log = Self {
            node_id: node_id.into(),
            entries: Mutex::new(existing),
            file: Some(file),
        };
        log.verify_integrity()?;
        Ok(log)
    }

    /// Appends an event, stamping the current time.
    pub fn append(
        &self,
        event_type: AuditEventType,
        description: impl Into<String>,
        details: serde_json::Value,
    ) -> Result<AuditEntry, IntegrityError> {
        self.append_at(event_type, description, details, time::now_ms())
    }

    /// Appends an event with an explicit timestamp.
    ///
    /// The entry is durably persisted (when a file backs the log) before it
    /// becomes visible in the chain, so cancellation never leaves partial
    /// state.
    pub fn append_at(
        &self,
        event_type: AuditEventType,
        description: impl Into<String>,
        details: serde_json::Value,
        timestamp_ms: u64,
    ) -> Result<AuditEntry, IntegrityError> {
        let description = description.into();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let seq = entries.len() as u64;
        let prev_hash = entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
        let hash = entry_hash(seq, &prev_hash, event_type, &description, &details, timestamp_ms);
        let entry = AuditEntry {
            entry_id: format!("{}-{}", self.node_id, seq),
            seq,
            event_type,
            description,
            details,
            timestamp_ms,
            prev_hash,
            entry_hash: hash,
            node_id: self.node_id.clone(),
        };

        if let Some(file) = &self.file {
            file.append(&entry)?;
        }
        entries.push(entry.clone());
        Ok(entry)
    }

    /// Walks the chain and reports the first sequence or hash mismatch.
    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut prev_hash = GENESIS_PREV_HASH.to_string();
        for (i, entry) in entries.iter().enumerate() {
            let index = i as u64;
            if entry.seq != index {
                return Err(IntegrityError::HashMismatch {
                    index,
                    detail: format!("sequence {} out of order", entry.seq),
                });
            }
            if entry.prev_hash != prev_hash {
                return Err(IntegrityError::HashMismatch {
                    index,
                    detail: "previous-hash link broken".to_string(),
                });
            }
            let expected = entry_hash(
                entry.seq,
                &entry.prev_hash,
                entry.event_type,
                &entry.description,
                &entry.details,
                entry.timestamp_ms,
            );
            if expected != entry.entry_hash {
                return Err(IntegrityError::HashMismatch {
                    index,
                    detail: "entry hash does not match contents".to_string(),
                });
            }
            prev_hash = entry.entry_hash.clone();
        }
        Ok(())
    }

    /// All entries of one event type.
    pub fn query_by_type(&self, event_type: AuditEventType) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// All entries with `start_ms <= timestamp < end_ms`.
    pub fn query_by_time(&self, start_ms: u64, end_ms: u64) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| e.timestamp_ms >= start_ms && e.timestamp_ms < end_ms)
            .cloned()
            .collect()
    }

    /// Number of chained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deterministic textual export suitable for user inspection.
    pub fn export(&self, exported_at_ms: u64) -> String {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();
        let _ = writeln!(out, "node: {}", self.node_id);
        let _ = writeln!(out, "exported_at_ms: {}", exported_at_ms);
        let _ = writeln!(out, "entries: {}", entries.len());
        for e in entries.iter() {
            let _ = writeln!(
                out,
                "{} seq={} type={} desc={:?} details={} ts={} prev={} hash={}",
                e.entry_id,
                e.seq,
                e.event_type.as_str(),
                e.description,
                e.details,
                e.timestamp_ms,
                &e.prev_hash[..8],
                &e.entry_hash[..8],
            );
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn tamper_description(&self, seq: usize, new_description: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries[seq].description = new_description.to_string();
    }
}
