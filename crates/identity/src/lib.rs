// Path: crates/identity/src/lib.rs
#![forbid(unsafe_code)]

//! # Veil Identity Core
//!
//! Owns the root keypair, the node DID, per-requester pairwise identities,
//! and derived session keys. Pairwise identities are backed by distinct
//! ephemeral keypairs so that two requesters can never correlate the same
//! node; rotation archives the old identity and installs a fresh one.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::info;
use veil_api::crypto::{SerializableKey, SessionKeyDerivation, SigningKeyPair};
use veil_api::storage::SecureStore;
use veil_audit::{AuditEventType, AuditLog};
use veil_crypto::kdf::P256SessionKdf;
use veil_crypto::sign::{P256KeyPair, P256PrivateKey};
use veil_types::config::IdentityConfig;
use veil_types::error::{ConfigError, CryptoError};
use veil_types::time::{self, DAY_MS, HOUR_MS};
use zeroize::{Zeroize, Zeroizing};

const ROOT_KEY_LABEL: &str = "root";
const DID_METHOD: &str = "veil";

/// A pairwise identity held for one requester.
#[derive(Clone)]
pub struct PairwiseIdentity {
    /// The pairwise DID.
    pub did: String,
    /// The backing keypair.
    pub keypair: P256KeyPair,
    /// When the identity was installed, UTC epoch milliseconds.
    pub created_at_ms: u64,
}

/// An archived pairwise identity after rotation.
#[derive(Clone)]
pub struct ArchivedIdentity {
    /// The retired DID.
    pub did: String,
    /// When it was retired, UTC epoch milliseconds.
    pub retired_at_ms: u64,
}

struct SessionKeyEntry {
    key: Zeroizing<[u8; 32]>,
    expires_at_ms: u64,
}

/// Derives a DID of the given kind from a public key.
fn did_from_public_key(kind: &str, public_key_sec1: &[u8]) -> String {
    let digest = veil_crypto::hash::sha256_hex(public_key_sec1);
    format!("did:{}:{}:{}", DID_METHOD, kind, &digest[..16])
}

/// The key & identity core.
///
/// All maps are concurrent; the root key has a single owner and is mutated
/// only by rotation.
pub struct IdentityCore {
    store: Arc<dyn SecureStore>,
    config: IdentityConfig,
    audit: Arc<AuditLog>,
    root: Mutex<Option<P256KeyPair>>,
    network_id: Mutex<Option<(String, u64)>>,
    pairwise: DashMap<String, PairwiseIdentity>,
    archived: DashMap<String, Vec<ArchivedIdentity>>,
    session_keys: DashMap<String, SessionKeyEntry>,
    kdf: P256SessionKdf,
}

impl IdentityCore {
    /// Builds the core over a secure store.
    ///
    /// Fails fast when the configuration requires hardware backing the
    /// store cannot provide.
    pub fn new(
        store: Arc<dyn SecureStore>,
        config: IdentityConfig,
        audit: Arc<AuditLog>,
    ) -> Result<Self, ConfigError> {
        if config.require_hardware_backing && !store.hardware_backed() {
            return Err(ConfigError::SecureStorageUnavailable(
                "hardware backing required but the store is software-only".to_string(),
            ));
        }
        Ok(Self {
            store,
            config,
            audit,
            root: Mutex::new(None),
            network_id: Mutex::new(None),
            pairwise: DashMap::new(),
            archived: DashMap::new(),
            session_keys: DashMap::new(),
            kdf: P256SessionKdf,
        })
    }

    /// Gets or lazily creates the persistent root keypair.
    pub fn root_keypair(&self) -> Result<P256KeyPair, CryptoError> {
        let mut guard = self.root.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pair) = guard.as_ref() {
            return Ok(pair.clone());
        }
        let pair = match self.store.get(ROOT_KEY_LABEL)? {
            Some(bytes) => {
                let private = P256PrivateKey::from_bytes(&bytes)?;
                P256KeyPair::from_private_key(&private)
            }
            None => {
                let pair = P256KeyPair::generate();
                let secret = Zeroizing::new(pair.private_key().to_bytes());
                self.store.put(ROOT_KEY_LABEL, &secret)?;
                info!(hardware_backed = self.store.hardware_backed(), "root keypair created");
                pair
            }
        };
        *guard = Some(pair.clone());
        Ok(pair)
    }

    /// Gets or lazily creates the node DID.
    pub fn node_did(&self) -> Result<String, CryptoError> {
        let pair = self.root_keypair()?;
        Ok(did_from_public_key("node", &pair.public_key().to_bytes()))
    }

    /// Gets or creates the pairwise identity for `requester_id`.
    ///
    /// The identity is backed by a fresh ephemeral keypair and is never
    /// derivable from the node DID.
    pub fn pairwise_identity(&self, requester_id: &str) -> PairwiseIdentity {
        self.pairwise
            .entry(requester_id.to_string())
            .or_insert_with(|| {
                let keypair = P256KeyPair::generate();
                let did = did_from_public_key("pairwise", &keypair.public_key().to_bytes());
                PairwiseIdentity {
                    did,
                    keypair,
                    created_at_ms: time::now_ms(),
                }
            })
            .value()
            .clone()
    }

    /// The pairwise DID for `requester_id`.
    pub fn pairwise_did(&self, requester_id: &str) -> String {
        self.pairwise_identity(requester_id).did
    }

    /// Rotates the pairwise identity for `requester_id`: the old identity is
    /// archived, a fresh keypair installed, and a PERMISSION audit event
    /// written.
    pub fn rotate_pairwise(&self, requester_id: &str) -> PairwiseIdentity {
        let now = time::now_ms();
        let fresh_pair = P256KeyPair::generate();
        let fresh = PairwiseIdentity {
            did: did_from_public_key("pairwise", &fresh_pair.public_key().to_bytes()),
            keypair: fresh_pair,
            created_at_ms: now,
        };

        let old = self
            .pairwise
            .insert(requester_id.to_string(), fresh.clone());
        if let Some(old) = old {
            self.archived
                .entry(requester_id.to_string())
                .or_default()
                .push(ArchivedIdentity {
                    did: old.did.clone(),
                    retired_at_ms: now,
                });
            let _ = self.audit.append(
                AuditEventType::Permission,
                "pairwise identity rotated",
                serde_json::json!({
                    "requester_id": requester_id,
                    "retired_did": old.did,
                    "new_did": fresh.did,
                }),
            );
        }
        fresh
    }

    /// The short-lived network identifier presented to transports.
    ///
    /// Rotated on the policy interval (default one day); unrelated to the
    /// node DID and to every pairwise DID.
    pub fn network_identifier(&self, now_ms: u64) -> String {
        let max_age_ms = u64::from(self.config.rotation.network_id_days) * DAY_MS;
        let mut guard = self.network_id.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some((id, created)) if now_ms.saturating_sub(*created) < max_age_ms => id.clone(),
            _ => {
                let mut bytes = [0u8; 16];
                rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
                let id = format!("net-{}", hex::encode(bytes));
                *guard = Some((id.clone(), now_ms));
                id
            }
        }
    }

    /// Rotates every pairwise identity older than the policy interval.
    /// Returns the requester ids that were rotated.
    pub fn rotate_due(&self, now_ms: u64) -> Vec<String> {
        let max_age_ms = u64::from(self.config.rotation.pairwise_days) * DAY_MS;
        let due: Vec<String> = self
            .pairwise
            .iter()
            .filter(|e| now_ms.saturating_sub(e.value().created_at_ms) >= max_age_ms)
            .map(|e| e.key().clone())
            .collect();
        for requester in &due {
            self.rotate_pairwise(requester);
        }
        due
    }

    /// Archived DIDs for a requester, oldest first.
    pub fn archived_dids(&self, requester_id: &str) -> Vec<String> {
        self.archived
            .get(requester_id)
            .map(|v| v.iter().map(|a| a.did.clone()).collect())
            .unwrap_or_default()
    }

    /// Derives (or returns the memoized) session key for `session_id`
    /// against `peer_public_key_sec1`, using the requester's pairwise key.
    pub fn session_key(
        &self,
        session_id: &str,
        requester_id: &str,
        peer_public_key_sec1: &[u8],
    ) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        if let Some(entry) = self.session_keys.get(session_id) {
            return Ok(entry.key.clone());
        }
        let peer = p256::ecdsa::VerifyingKey::from_sec1_bytes(peer_public_key_sec1)
            .map_err(|e| CryptoError::InvalidKey(format!("peer public key: {}", e)))?;
        let local = self.pairwise_identity(requester_id);
        let key = self.kdf.derive_session_key(
            local.keypair.ecdsa_signing_key(),
            &peer,
            session_id.as_bytes(),
        )?;
        let lifetime_ms = u64::from(self.config.rotation.session_key_hours) * HOUR_MS;
        self.session_keys.insert(
            session_id.to_string(),
            SessionKeyEntry {
                key: key.clone(),
                expires_at_ms: time::now_ms() + lifetime_ms,
            },
        );
        Ok(key)
    }

    /// Destroys the session key for `session_id` (crypto-shred).
    ///
    /// Returns true when a key was present and destroyed. The caller is
    /// responsible for writing the CRYPTO_SHRED audit event, which carries
    /// the capsule context this core does not know.
    pub fn destroy_session_key(&self, session_id: &str) -> bool {
        match self.session_keys.remove(session_id) {
            Some((_, mut entry)) => {
                entry.key.zeroize();
                true
            }
            None => false,
        }
    }

    /// Destroys all session keys past their expiry. Returns the shredded
    /// session ids.
    pub fn expire_session_keys(&self, now_ms: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .session_keys
            .iter()
            .filter(|e| now_ms >= e.value().expires_at_ms)
            .map(|e| e.key().clone())
            .collect();
        for session_id in &expired {
            self.destroy_session_key(session_id);
        }
        expired
    }

    /// Signs `message` with the root key, returning a hex signature.
    pub fn sign(&self, message: &[u8]) -> Result<String, CryptoError> {
        veil_crypto::sign::sign_detached(&self.root_keypair()?, message)
    }

    /// Verifies `signature_hex` over `message` against an arbitrary
    /// SEC1-encoded public key. Never panics; a mismatch is `false`.
    pub fn verify(&self, public_key_sec1: &[u8], message: &[u8], signature_hex: &str) -> bool {
        veil_crypto::sign::verify_detached(public_key_sec1, message, signature_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_crypto::key_store::FileKeyStore;

    fn core() -> (IdentityCore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileKeyStore::open(dir.path(), "test-pass").unwrap());
        let audit = Arc::new(AuditLog::new("did:veil:node:test"));
        let core = IdentityCore::new(store, IdentityConfig::default(), audit).unwrap();
        (core, dir)
    }

    #[test]
    fn root_keypair_is_stable_across_calls() {
        let (core, _dir) = core();
        let a = core.root_keypair().unwrap();
        let b = core.root_keypair().unwrap();
        assert_eq!(a.public_key().to_bytes(), b.public_key().to_bytes());
    }

    #[test]
    fn node_did_shape() {
        let (core, _dir) = core();
        let did = core.node_did().unwrap();
        assert!(did.starts_with("did:veil:node:"));
        assert_eq!(did.len(), "did:veil:node:".len() + 16);
    }

    #[test]
    fn pairwise_dids_do_not_correlate() {
        let (core, _dir) = core();
        let node = core.node_did().unwrap();
        let a = core.pairwise_did("requester-a");
        let b = core.pairwise_did("requester-b");
        assert_ne!(a, b);
        assert_ne!(a, node);
        assert_ne!(b, node);
        // Memoized per requester.
        assert_eq!(a, core.pairwise_did("requester-a"));
    }

    #[test]
    fn rotation_archives_and_audits() {
        let (core, _dir) = core();
        let d1 = core.pairwise_did("requester-a");
        let rotated = core.rotate_pairwise("requester-a");
        let d2 = rotated.did;
        assert_ne!(d1, d2);
        assert_ne!(d2, core.node_did().unwrap());
        assert_eq!(core.archived_dids("requester-a"), vec![d1]);
    }

    #[test]
    fn session_keys_memoized_and_shreddable() {
        let (core, _dir) = core();
        let peer = P256KeyPair::generate();
        let peer_pub = peer.public_key().to_bytes();
        let k1 = core.session_key("s-1", "requester-a", &peer_pub).unwrap();
        let k2 = core.session_key("s-1", "requester-a", &peer_pub).unwrap();
        assert_eq!(*k1, *k2);

        assert!(core.destroy_session_key("s-1"));
        assert!(!core.destroy_session_key("s-1"));
    }

    #[test]
    fn network_identifier_rotates_daily() {
        let (core, _dir) = core();
        let now = 1_705_314_600_000;
        let first = core.network_identifier(now);
        assert_eq!(first, core.network_identifier(now + 1_000));
        let next_day = core.network_identifier(now + DAY_MS + 1);
        assert_ne!(first, next_day);
        assert!(first.starts_with("net-"));
    }

    #[test]
    fn hardware_requirement_fails_on_software_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileKeyStore::open(dir.path(), "p").unwrap());
        let audit = Arc::new(AuditLog::new("n"));
        let cfg = IdentityConfig {
            require_hardware_backing: true,
            ..Default::default()
        };
        assert!(IdentityCore::new(store, cfg, audit).is_err());
    }
}
