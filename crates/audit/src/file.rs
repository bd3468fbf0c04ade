// Path: crates/audit/src/file.rs
//! File persistence for the audit log.
//!
//! Entries are appended as JSON lines; each append is flushed and synced to
//! disk before the entry becomes visible in the in-memory chain. Replay on
//! startup reconstructs the chain in append order.

use crate::AuditEntry;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use veil_types::error::IntegrityError;

/// Append-only JSON-lines storage for audit entries.
pub struct AuditFile {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
}

impl AuditFile {
    /// Opens (creating if needed) the audit file at `path`.
    pub fn open(path: &Path) -> Result<Self, IntegrityError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| IntegrityError::HashMismatch {
                index: 0,
                detail: format!("audit file open failed: {}", e),
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Appends one entry, flushing and syncing before returning.
    pub fn append(&self, entry: &AuditEntry) -> Result<(), IntegrityError> {
        let line = serde_json::to_string(entry).map_err(|e| IntegrityError::HashMismatch {
            index: entry.seq,
            detail: format!("audit entry serialization failed: {}", e),
        })?;
        let mut writer = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let io_err = |e: std::io::Error| IntegrityError::HashMismatch {
            index: entry.seq,
            detail: format!("audit file write failed: {}", e),
        };
        writer.write_all(line.as_bytes()).map_err(io_err)?;
        writer.write_all(b"\n").map_err(io_err)?;
        // Critical: flush and sync to disk before the chain advances.
        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_data().map_err(io_err)?;
        Ok(())
    }

    /// Reads back all persisted entries in append order.
    pub fn replay(&self) -> Result<Vec<AuditEntry>, IntegrityError> {
        let file = File::open(&self.path).map_err(|e| IntegrityError::HashMismatch {
            index: 0,
            detail: format!("audit file open failed: {}", e),
        })?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| IntegrityError::HashMismatch {
                index: i as u64,
                detail: format!("audit file read failed: {}", e),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry =
                serde_json::from_str(&line).map_err(|e| IntegrityError::HashMismatch {
                    index: i as u64,
                    detail: format!("audit entry decode failed: {}", e),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::{AuditEventType, AuditFile, AuditLog};
    use serde_json::json;

    #[test]
    fn persisted_log_replays_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        {
            let file = AuditFile::open(&path).unwrap();
            let log = AuditLog::with_file("did:veil:node:test", file).unwrap();
            log.append_at(
                AuditEventType::RequestReceived,
                "request accepted",
                json!({ "request": "req-1" }),
                1_000,
            )
            .unwrap();
            log.append_at(
                AuditEventType::ContractSigned,
                "contract signed",
                json!({ "contract": "c-1" }),
                2_000,
            )
            .unwrap();
        }

        let file = AuditFile::open(&path).unwrap();
        let reopened = AuditLog::with_file("did:veil:node:test", file).unwrap();
        assert_eq!(reopened.len(), 2);
        reopened.verify_integrity().unwrap();
        assert_eq!(
            reopened.query_by_type(AuditEventType::ContractSigned).len(),
            1
        );
    }
}
