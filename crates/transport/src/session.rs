// Path: crates/transport/src/session.rs
//! Peer session lifecycle and session-key custody.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use veil_audit::{AuditEventType, AuditLog};
use veil_identity::IdentityCore;
use veil_types::config::TransportConfig;
use veil_types::error::{CoreError, CryptoError};
use veil_types::session::{Session, SessionState, TransportKind};
use veil_types::time::HOUR_MS;
use zeroize::Zeroizing;

/// Creates, advances, and tears down peer sessions.
pub struct SessionManager {
    identity: Arc<IdentityCore>,
    audit: Arc<AuditLog>,
    config: TransportConfig,
    sessions: DashMap<String, Session>,
}

impl SessionManager {
    /// A manager over the identity core and audit log.
    pub fn new(
        identity: Arc<IdentityCore>,
        audit: Arc<AuditLog>,
        config: TransportConfig,
    ) -> Self {
        Self {
            identity,
            audit,
            config,
            sessions: DashMap::new(),
        }
    }

    fn transition(session: &mut Session, next: SessionState) -> Result<(), CoreError> {
        if !session.state.can_transition_to(next) {
            return Err(CoreError::Validation(format!(
                "illegal session transition {:?} -> {:?}",
                session.state, next
            )));
        }
        session.state = next;
        Ok(())
    }

    /// Establishes a session with a requester's peer node: initiate,
    /// authenticate, key exchange, connected.
    ///
    /// Returns the session and the derived session key.
    pub fn establish(
        &self,
        requester_id: &str,
        remote_node_id: &str,
        remote_public_key_sec1: &[u8],
        transport: TransportKind,
        now_ms: u64,
    ) -> Result<(Session, Zeroizing<[u8; 32]>), CoreError> {
        let session_id = Uuid::new_v4().to_string();
        // Relayed sessions carry a rendezvous ticket for resuming an
        // interrupted transfer at the same relay.
        let rendezvous = match &transport {
            veil_types::session::TransportKind::CiphertextRelay { relay } => {
                Some(veil_types::session::RendezvousInfo {
                    point: relay.clone(),
                    ticket: Uuid::new_v4().to_string(),
                })
            }
            veil_types::session::TransportKind::Direct => None,
        };
        let mut session = Session {
            session_id: session_id.clone(),
            local_node_id: self.identity.pairwise_did(requester_id),
            remote_node_id: remote_node_id.to_string(),
            remote_public_key: remote_public_key_sec1.to_vec(),
            state: SessionState::Initiating,
            created_at_ms: now_ms,
            expires_at_ms: now_ms + u64::from(self.config.session_hours) * HOUR_MS,
            transport,
            rendezvous,
        };

        // Authenticate: the peer key must parse before any secret is derived.
        Self::transition(&mut session, SessionState::Authenticating)?;
        if p256::ecdsa::VerifyingKey::from_sec1_bytes(remote_public_key_sec1).is_err() {
            session.state = SessionState::Failed;
            self.sessions.insert(session_id, session);
            return Err(CoreError::Crypto(CryptoError::InvalidKey(
                "peer public key is not a valid SEC1 point".to_string(),
            )));
        }

        Self::transition(&mut session, SessionState::KeyExchange)?;
        let key = self
            .identity
            .session_key(&session_id, requester_id, remote_public_key_sec1)
            .map_err(CoreError::Crypto)?;

        Self::transition(&mut session, SessionState::Connected)?;
        info!(session_id = %session.session_id, remote = %session.remote_node_id, "session connected");
        self.sessions.insert(session_id, session.clone());
        Ok((session, key))
    }

    /// Moves a session into (or out of) the transferring state.
    pub fn set_transferring(&self, session_id: &str, transferring: bool) -> Result<(), CoreError> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::Validation(format!("unknown session {}", session_id)))?;
        let next = if transferring {
            SessionState::Transferring
        } else {
            SessionState::Connected
        };
        Self::transition(entry.value_mut(), next)
    }

    /// Closes a session cleanly.
    pub fn close(&self, session_id: &str) -> Result<(), CoreError> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::Validation(format!("unknown session {}", session_id)))?;
        Self::transition(entry.value_mut(), SessionState::Closing)?;
        Self::transition(entry.value_mut(), SessionState::Closed)?;
        self.identity.destroy_session_key(session_id);
        Ok(())
    }

    /// Marks a session failed.
    pub fn fail(&self, session_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            if entry.state.can_transition_to(SessionState::Failed) {
                entry.state = SessionState::Failed;
            }
        }
        self.identity.destroy_session_key(session_id);
    }

    /// Crypto-shreds the session key for an expired capsule and writes the
    /// CRYPTO_SHRED audit event.
    pub fn crypto_shred(&self, session_id: &str, capsule_id: &str) -> Result<(), CoreError> {
        let destroyed = self.identity.destroy_session_key(session_id);
        if !destroyed {
            warn!(session_id, "crypto-shred requested for an absent session key");
        }
        self.audit
            .append(
                AuditEventType::CryptoShred,
                "session key destroyed on capsule TTL expiry",
                serde_json::json!({
                    "session_id": session_id,
                    "capsule_id": capsule_id,
                    "key_destroyed": destroyed,
                }),
            )
            .map_err(CoreError::Integrity)?;
        Ok(())
    }

    /// A session snapshot by id.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }
}
