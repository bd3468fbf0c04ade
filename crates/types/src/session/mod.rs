// Path: crates/types/src/session/mod.rs

//! Peer session records and lifecycle states.

use serde::{Deserialize, Serialize};

/// The session lifecycle.
///
/// Forward transitions only; `Failed` is terminal from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Session record created.
    Initiating,
    /// Verifying the peer's identity.
    Authenticating,
    /// Deriving the session key.
    KeyExchange,
    /// Ready to transfer.
    Connected,
    /// A transfer is in flight.
    Transferring,
    /// Winding down.
    Closing,
    /// Closed cleanly.
    Closed,
    /// Terminal failure.
    Failed,
}

impl SessionState {
    /// True when `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        if matches!(next, Failed) {
            return !matches!(self, Closed | Failed);
        }
        matches!(
            (self, next),
            (Initiating, Authenticating)
                | (Authenticating, KeyExchange)
                | (KeyExchange, Connected)
                | (Connected, Transferring)
                | (Transferring, Connected)
                | (Transferring, Closing)
                | (Connected, Closing)
                | (Closing, Closed)
        )
    }
}

/// How capsule bytes reach the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Direct peer-to-peer path.
    Direct,
    /// A relay that only ever sees ciphertext.
    CiphertextRelay {
        /// Relay destination (normalized host form).
        relay: String,
    },
}

/// Rendezvous hints for re-establishing an interrupted transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendezvousInfo {
    /// Rendezvous point identifier.
    pub point: String,
    /// Opaque ticket presented on resume.
    pub ticket: String,
}

/// One peer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identity.
    pub session_id: String,
    /// Local node identity (pairwise DID).
    pub local_node_id: String,
    /// Remote node identity.
    pub remote_node_id: String,
    /// Remote public key (SEC1 bytes).
    pub remote_public_key: Vec<u8>,
    /// Lifecycle state.
    pub state: SessionState,
    /// Creation time, UTC epoch milliseconds.
    pub created_at_ms: u64,
    /// Expiry time, UTC epoch milliseconds.
    pub expires_at_ms: u64,
    /// Transport path.
    pub transport: TransportKind,
    /// Optional rendezvous hints.
    pub rendezvous: Option<RendezvousInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use SessionState::*;
        assert!(Initiating.can_transition_to(Authenticating));
        assert!(Authenticating.can_transition_to(KeyExchange));
        assert!(KeyExchange.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Transferring));
        assert!(Transferring.can_transition_to(Connected));
        assert!(Closing.can_transition_to(Closed));
        assert!(Transferring.can_transition_to(Failed));
        assert!(!Closed.can_transition_to(Failed));
        assert!(!Initiating.can_transition_to(Connected));
    }
}
