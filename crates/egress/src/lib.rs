// Path: crates/egress/src/lib.rs
#![forbid(unsafe_code)]

//! # Veil Egress Gate
//!
//! Every outbound byte traverses [`EgressGate::send`]. The gate normalizes
//! the destination, checks the allowlist, classifies the payload (metadata,
//! ciphertext capsule, or raw payload), scans non-ciphertext for PII, and
//! fails closed on anything else. Every rejection lands in an in-process
//! attempt log. No configuration value can re-open a closed path: a
//! disabled gate rejects everything.

pub mod classify;

pub use classify::{classify_payload, shannon_entropy, PayloadClass};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use veil_types::error::SafetyError;
use veil_types::privacy;
use veil_types::time;

/// What an outbound request claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EgressRequestType {
    /// Control-plane metadata.
    Metadata,
    /// Encrypted capsule chunks.
    CapsuleTransfer,
    /// Session signaling.
    Signaling,
    /// Transfer acknowledgments.
    Acknowledgment,
}

/// An interlock consulted before anything leaves the device.
///
/// The plan VM installs one of these while a plan executes, blocking every
/// non-metadata egress attempt from inside execution.
pub trait EgressInterlock: Send + Sync {
    /// True when the interlock currently blocks this request type.
    fn blocks(&self, request_type: EgressRequestType) -> bool;
}

/// One allowlisted destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedDestination {
    /// Normalized destination (lowercase host, no scheme or path).
    pub destination: String,
    /// Declared purpose, echoed in gate results.
    pub purpose: String,
    /// Inactive entries reject like unknown ones.
    pub active: bool,
}

/// An outbound request presented to the gate.
#[derive(Debug, Clone)]
pub struct EgressRequest {
    /// Destination in any reasonable form; normalized by the gate.
    pub destination: String,
    /// The bytes to send.
    pub payload: Vec<u8>,
    /// Claimed request type.
    pub request_type: EgressRequestType,
    /// Header map (scanned together with the payload).
    pub headers: HashMap<String, String>,
}

/// A successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResult {
    /// How the payload classified.
    pub classification: PayloadClass,
    /// The allowlist purpose that matched.
    pub purpose: String,
    /// Admission time, UTC epoch milliseconds.
    pub admitted_at_ms: u64,
}

/// One logged rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedAttempt {
    /// Attempt identity.
    pub attempt_id: String,
    /// Normalized destination.
    pub destination: String,
    /// Stable rejection reason code.
    pub reason: String,
    /// Payload size in bytes.
    pub payload_bytes: usize,
    /// Classification at rejection time, when one was computed.
    pub classification: Option<PayloadClass>,
    /// Rejection time, UTC epoch milliseconds.
    pub timestamp_ms: u64,
}

/// Gate statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateStats {
    /// Total send attempts.
    pub total: u64,
    /// Rejected attempts.
    pub blocked: u64,
    /// Current allowlist size.
    pub allowlist_size: usize,
    /// Rejection log length.
    pub blocked_logged: usize,
}

struct GateState {
    enabled: bool,
    allowlist: HashMap<String, AllowedDestination>,
    attempts: Vec<BlockedAttempt>,
    total: u64,
    blocked: u64,
}

/// The fail-closed egress gate.
pub struct EgressGate {
    state: RwLock<GateState>,
    interlocks: RwLock<Vec<Arc<dyn EgressInterlock>>>,
}

/// Normalizes a destination: lowercase, scheme and path stripped.
pub fn normalize_destination(destination: &str) -> String {
    let lowered = destination.trim().to_ascii_lowercase();
    let without_scheme = lowered
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&lowered);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

impl Default for EgressGate {
    fn default() -> Self {
        Self::new()
    }
}

impl EgressGate {
    /// An enabled gate with an empty allowlist.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GateState {
                enabled: true,
                allowlist: HashMap::new(),
                attempts: Vec::new(),
                total: 0,
                blocked: 0,
            }),
            interlocks: RwLock::new(Vec::new()),
        }
    }

    /// Adds (or replaces) an allowlisted destination.
    pub fn allow(&self, destination: &str, purpose: &str) {
        let normalized = normalize_destination(destination);
        let mut state = self.state.write();
        state.allowlist.insert(
            normalized.clone(),
            AllowedDestination {
                destination: normalized,
                purpose: purpose.to_string(),
                active: true,
            },
        );
    }

    /// Deactivates a destination; subsequent sends reject.
    pub fn deactivate(&self, destination: &str) {
        let normalized = normalize_destination(destination);
        let mut state = self.state.write();
        if let Some(entry) = state.allowlist.get_mut(&normalized) {
            entry.active = false;
        }
    }

    /// Disables the whole gate; every send rejects.
    pub fn disable(&self) {
        self.state.write().enabled = false;
    }

    /// Installs an interlock.
    pub fn add_interlock(&self, interlock: Arc<dyn EgressInterlock>) {
        self.interlocks.write().push(interlock);
    }

    fn reject(
        &self,
        destination: &str,
        payload_bytes: usize,
        classification: Option<PayloadClass>,
        reason: &str,
        error: SafetyError,
    ) -> SafetyError {
        let mut state = self.state.write();
        state.blocked += 1;
        let attempt = BlockedAttempt {
            attempt_id: Uuid::new_v4().to_string(),
            destination: destination.to_string(),
            reason: reason.to_string(),
            payload_bytes,
            classification,
            timestamp_ms: time::now_ms(),
        };
        warn!(
            destination = %attempt.destination,
            reason = %attempt.reason,
            bytes = payload_bytes,
            "egress attempt blocked"
        );
        state.attempts.push(attempt);
        error
    }

    /// Sends one outbound request through the gate.
    ///
    /// The returned [`GateResult`] is the only path by which bytes may
    /// proceed to the wire; every failure is logged and fail-closed.
    pub fn send(&self, request: &EgressRequest) -> Result<GateResult, SafetyError> {
        let destination = normalize_destination(&request.destination);
        {
            let mut state = self.state.write();
            state.total += 1;
        }

        let enabled = self.state.read().enabled;
        if !enabled {
            return Err(self.reject(
                &destination,
                request.payload.len(),
                None,
                "GATE_DISABLED",
                SafetyError::UnknownDestination(destination.clone()),
            ));
        }

        {
            let interlocks = self.interlocks.read();
            if interlocks.iter().any(|i| i.blocks(request.request_type)) {
                return Err(self.reject(
                    &destination,
                    request.payload.len(),
                    None,
                    "NETWORK_BLOCKED",
                    SafetyError::NetworkBlocked,
                ));
            }
        }

        let purpose = {
            let state = self.state.read();
            state
                .allowlist
                .get(&destination)
                .filter(|entry| entry.active)
                .map(|entry| entry.purpose.clone())
        };
        let Some(purpose) = purpose else {
            return Err(self.reject(
                &destination,
                request.payload.len(),
                None,
                "UNKNOWN_DESTINATION",
                SafetyError::UnknownDestination(destination.clone()),
            ));
        };

        let classification = classify_payload(&request.payload);
        if classification == PayloadClass::RawPayload {
            return Err(self.reject(
                &destination,
                request.payload.len(),
                Some(classification),
                "RAW_PAYLOAD_EGRESS",
                SafetyError::RawPayloadEgress(destination.clone()),
            ));
        }

        if classification != PayloadClass::CiphertextCapsule {
            let payload_text = String::from_utf8_lossy(&request.payload);
            let header_hit = request
                .headers
                .iter()
                .any(|(k, v)| privacy::matches_egress_pii(k) || privacy::matches_egress_pii(v));
            if header_hit || privacy::matches_egress_pii(&payload_text) {
                return Err(self.reject(
                    &destination,
                    request.payload.len(),
                    Some(classification),
                    "FORBIDDEN_PATTERN",
                    SafetyError::ForbiddenPattern(destination.clone()),
                ));
            }
        }

        info!(
            destination = %destination,
            class = ?classification,
            bytes = request.payload.len(),
            "egress admitted"
        );
        Ok(GateResult {
            classification,
            purpose,
            admitted_at_ms: time::now_ms(),
        })
    }

    /// Recent rejections, newest last.
    pub fn blocked_attempts(&self) -> Vec<BlockedAttempt> {
        self.state.read().attempts.clone()
    }

    /// Current statistics.
    pub fn stats(&self) -> GateStats {
        let state = self.state.read();
        GateStats {
            total: state.total,
            blocked: state.blocked,
            allowlist_size: state.allowlist.len(),
            blocked_logged: state.attempts.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_test_utils::randomness;

    fn request(dest: &str, payload: Vec<u8>) -> EgressRequest {
        EgressRequest {
            destination: dest.into(),
            payload,
            request_type: EgressRequestType::CapsuleTransfer,
            headers: HashMap::new(),
        }
    }

    fn gate() -> EgressGate {
        let gate = EgressGate::new();
        gate.allow("api.example.io", "Platform API");
        gate
    }

    #[test]
    fn destination_normalization() {
        assert_eq!(
            normalize_destination("https://API.Example.io/v1/upload?x=1"),
            "api.example.io"
        );
        assert_eq!(normalize_destination("api.example.io"), "api.example.io");
    }

    #[test]
    fn unknown_destination_rejected() {
        let gate = gate();
        let err = gate.send(&request("evil.example.com", vec![])).unwrap_err();
        assert!(matches!(err, SafetyError::UnknownDestination(_)));
        assert_eq!(gate.blocked_attempts().len(), 1);
    }

    #[test]
    fn deactivated_destination_rejected() {
        let gate = gate();
        gate.deactivate("api.example.io");
        let err = gate.send(&request("api.example.io", vec![])).unwrap_err();
        assert!(matches!(err, SafetyError::UnknownDestination(_)));
    }

    #[test]
    fn disabled_gate_rejects_everything() {
        let gate = gate();
        gate.disable();
        assert!(gate.send(&request("api.example.io", vec![])).is_err());
    }

    #[test]
    fn raw_payload_rejected_and_logged() {
        let gate = gate();
        // 32 low-entropy bytes that do not look like metadata.
        let payload = b"AAAABBBBCCCCDDDDAAAABBBBCCCCDDDD".to_vec();
        let err = gate.send(&request("api.example.io", payload)).unwrap_err();
        assert!(matches!(err, SafetyError::RawPayloadEgress(_)));

        let attempts = gate.blocked_attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].reason, "RAW_PAYLOAD_EGRESS");
        assert_eq!(attempts[0].classification, Some(PayloadClass::RawPayload));
    }

    #[test]
    fn ciphertext_admitted() {
        let gate = gate();
        let payload = randomness::random_bytes(1, 1024);
        let result = gate.send(&request("api.example.io", payload)).unwrap();
        assert_eq!(result.classification, PayloadClass::CiphertextCapsule);
        assert_eq!(result.purpose, "Platform API");
    }

    #[test]
    fn metadata_admitted_but_pii_rejected() {
        let gate = gate();
        let ok = gate
            .send(&request(
                "api.example.io",
                br#"{"chunk": 3, "total": 9}"#.to_vec(),
            ))
            .unwrap();
        assert_eq!(ok.classification, PayloadClass::MetadataOnly);

        let err = gate
            .send(&request(
                "api.example.io",
                br#"{"contact": "jane@example.com"}"#.to_vec(),
            ))
            .unwrap_err();
        assert!(matches!(err, SafetyError::ForbiddenPattern(_)));
    }

    #[test]
    fn stats_track_totals() {
        let gate = gate();
        let _ = gate.send(&request("api.example.io", vec![]));
        let _ = gate.send(&request("nowhere.example.com", vec![]));
        let stats = gate.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.allowlist_size, 1);
    }
}
