// Path: crates/consent/src/inbox.rs
//! The bounded, replay-protected request inbox.
//!
//! Accept/evict decisions are serialized per inbox by an internal mutex.
//! Every accepted request's identity enters the seen-nonce set; a repeated
//! identity is rejected even after the original request expired and was
//! pruned from the pending set.

use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info};
use veil_types::config::InboxConfig;
use veil_types::request::{DataRequest, RequestType};
use veil_types::time::HOUR_MS;

/// Outcome of receiving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Accepted into the pending set.
    Accepted,
    /// Past its expiry.
    Expired,
    /// The identity was seen before.
    ReplayDetected,
    /// The signature failed verification.
    InvalidSignature,
    /// The policy stamp is absent.
    MissingPolicyStamp,
    /// The policy stamp failed validation.
    InvalidPolicyStamp,
    /// The inbox is at capacity with nothing evictable.
    InboxFull,
}

/// Pluggable request verification.
pub trait RequestVerifier: Send + Sync {
    /// Verifies the requester signature over the request's canonical bytes.
    fn verify_signature(&self, request: &DataRequest) -> bool;

    /// Validates a non-empty policy stamp.
    fn verify_policy_stamp(&self, stamp: &str) -> bool;
}

/// The default verifier: a signature must be at least 64 characters, and
/// any non-empty policy stamp is accepted. Deployments with a registered
/// requester directory or coordinator policy key install a stricter
/// verifier.
pub struct DefaultVerifier;

impl RequestVerifier for DefaultVerifier {
    fn verify_signature(&self, request: &DataRequest) -> bool {
        request.signature.len() >= 64
    }

    fn verify_policy_stamp(&self, stamp: &str) -> bool {
        !stamp.is_empty()
    }
}

struct InboxInner {
    pending: BTreeMap<String, DataRequest>,
    // request id -> retain-until (expiry + horizon)
    seen: BTreeMap<String, u64>,
}

/// The request inbox.
pub struct RequestInbox {
    config: InboxConfig,
    verifier: Box<dyn RequestVerifier>,
    inner: Mutex<InboxInner>,
}

impl RequestInbox {
    /// An inbox with the default verifier.
    pub fn new(config: InboxConfig) -> Self {
        Self::with_verifier(config, Box::new(DefaultVerifier))
    }

    /// An inbox with a custom verifier.
    pub fn with_verifier(config: InboxConfig, verifier: Box<dyn RequestVerifier>) -> Self {
        Self {
            config,
            verifier,
            inner: Mutex::new(InboxInner {
                pending: BTreeMap::new(),
                seen: BTreeMap::new(),
            }),
        }
    }

    /// Receives a request. A request is actionable iff signed,
    /// policy-stamped, not expired, and its identity has not been seen.
    pub fn receive(&self, request: DataRequest, now_ms: u64) -> ReceiveOutcome {
        if request.validate().is_err() {
            return ReceiveOutcome::InvalidSignature;
        }
        if request.is_expired(now_ms) {
            return ReceiveOutcome::Expired;
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.seen.contains_key(&request.request_id) {
            debug!(request_id = %request.request_id, "replayed request rejected");
            return ReceiveOutcome::ReplayDetected;
        }
        if !self.verifier.verify_signature(&request) {
            return ReceiveOutcome::InvalidSignature;
        }
        if request.policy_stamp.is_empty() {
            return ReceiveOutcome::MissingPolicyStamp;
        }
        if !self.verifier.verify_policy_stamp(&request.policy_stamp) {
            return ReceiveOutcome::InvalidPolicyStamp;
        }

        // Capacity: evict expired pending requests first.
        if inner.pending.len() >= self.config.capacity {
            inner.pending.retain(|_, r| !r.is_expired(now_ms));
        }
        if inner.pending.len() >= self.config.capacity {
            return ReceiveOutcome::InboxFull;
        }

        let horizon_ms = u64::from(self.config.nonce_horizon_hours) * HOUR_MS;
        let retain_until = request.expires_at_ms.saturating_add(horizon_ms);
        inner.seen.insert(request.request_id.clone(), retain_until);
        Self::prune_seen(&mut inner, now_ms, self.config.seen_nonce_cap);

        info!(request_id = %request.request_id, requester = %request.requester_id, "request accepted");
        inner.pending.insert(request.request_id.clone(), request);
        ReceiveOutcome::Accepted
    }

    fn prune_seen(inner: &mut InboxInner, now_ms: u64, cap: usize) {
        inner.seen.retain(|_, retain_until| *retain_until > now_ms);
        while inner.seen.len() > cap {
            // Evict the entry closest to its retention horizon.
            let oldest = inner
                .seen
                .iter()
                .min_by_key(|(_, retain_until)| **retain_until)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    inner.seen.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Pending requests of a type; expired entries are pruned first.
    pub fn pending_by_type(&self, request_type: RequestType, now_ms: u64) -> Vec<DataRequest> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pending.retain(|_, r| !r.is_expired(now_ms));
        inner
            .pending
            .values()
            .filter(|r| r.request_type == request_type)
            .cloned()
            .collect()
    }

    /// A pending request by identity; expired entries are pruned first.
    pub fn get(&self, request_id: &str, now_ms: u64) -> Option<DataRequest> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pending.retain(|_, r| !r.is_expired(now_ms));
        inner.pending.get(request_id).cloned()
    }

    /// Removes a pending request for processing.
    pub fn take(&self, request_id: &str) -> Option<DataRequest> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pending.remove(request_id)
    }

    /// Number of pending requests.
    pub fn pending_len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_test_utils::fixtures;

    const NOW: u64 = 1_705_314_600_000;

    fn inbox(capacity: usize) -> RequestInbox {
        RequestInbox::new(InboxConfig {
            capacity,
            ..Default::default()
        })
    }

    #[test]
    fn valid_request_accepted_once() {
        let inbox = inbox(4);
        let request = fixtures::broadcast_request("req-1", NOW);
        assert_eq!(inbox.receive(request.clone(), NOW), ReceiveOutcome::Accepted);
        assert_eq!(inbox.receive(request, NOW), ReceiveOutcome::ReplayDetected);
        assert_eq!(inbox.pending_len(), 1);
    }

    #[test]
    fn expired_request_rejected() {
        let inbox = inbox(4);
        let request = fixtures::broadcast_request("req-1", NOW);
        let later = request.expires_at_ms + 1;
        assert_eq!(inbox.receive(request, later), ReceiveOutcome::Expired);
    }

    #[test]
    fn short_signature_rejected() {
        let inbox = inbox(4);
        let mut request = fixtures::broadcast_request("req-1", NOW);
        request.signature = "short".into();
        assert_eq!(inbox.receive(request, NOW), ReceiveOutcome::InvalidSignature);
    }

    #[test]
    fn missing_policy_stamp_rejected() {
        let inbox = inbox(4);
        let mut request = fixtures::broadcast_request("req-1", NOW);
        request.policy_stamp = String::new();
        assert_eq!(
            inbox.receive(request, NOW),
            ReceiveOutcome::MissingPolicyStamp
        );
    }

    #[test]
    fn full_inbox_evicts_expired_then_rejects() {
        let inbox = inbox(2);
        // Two live requests fill the inbox.
        assert_eq!(
            inbox.receive(fixtures::broadcast_request("req-1", NOW), NOW),
            ReceiveOutcome::Accepted
        );
        assert_eq!(
            inbox.receive(fixtures::broadcast_request("req-2", NOW), NOW),
            ReceiveOutcome::Accepted
        );
        assert_eq!(
            inbox.receive(fixtures::broadcast_request("req-3", NOW), NOW),
            ReceiveOutcome::InboxFull
        );

        // Once the first two expire, a new request evicts them and lands.
        let later = NOW + 2 * 60 * 60 * 1000;
        assert_eq!(
            inbox.receive(fixtures::broadcast_request("req-4", later), later),
            ReceiveOutcome::Accepted
        );
        assert_eq!(inbox.pending_len(), 1);
    }

    #[test]
    fn replay_survives_pending_expiry() {
        let inbox = inbox(4);
        let request = fixtures::broadcast_request("req-1", NOW);
        assert_eq!(inbox.receive(request.clone(), NOW), ReceiveOutcome::Accepted);

        // The pending entry expires and is pruned, but the nonce is still
        // within its retention horizon.
        let later = request.expires_at_ms + 1;
        assert!(inbox.pending_by_type(request.request_type, later).is_empty());
        let mut replay = fixtures::broadcast_request("req-1", later);
        replay.expires_at_ms = later + 1_000;
        assert_eq!(inbox.receive(replay, later), ReceiveOutcome::ReplayDetected);
    }

    #[test]
    fn queries_filter_and_prune() {
        let inbox = inbox(4);
        inbox.receive(fixtures::broadcast_request("req-1", NOW), NOW);
        assert!(inbox.get("req-1", NOW).is_some());
        assert!(inbox.get("req-2", NOW).is_none());
        assert_eq!(
            inbox
                .pending_by_type(veil_types::request::RequestType::Broadcast, NOW)
                .len(),
            1
        );
        assert!(inbox
            .pending_by_type(veil_types::request::RequestType::Targeted, NOW)
            .is_empty());
    }
}
