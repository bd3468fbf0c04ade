// Path: crates/types/src/config/mod.rs

//! Shared configuration structures for runtime components.
//!
//! Everything here deserializes from the node's TOML configuration with
//! serde defaults, so a minimal file (or none at all) yields a working,
//! safe-by-default runtime. No configuration value can alter the egress
//! gate's fail-closed posture.

use serde::{Deserialize, Serialize};

/// Key rotation policy, in line with the identity core defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Pairwise DID rotation interval in days.
    #[serde(default = "default_pairwise_days")]
    pub pairwise_days: u32,
    /// Network identifier rotation interval in days.
    #[serde(default = "default_network_id_days")]
    pub network_id_days: u32,
    /// Session key lifetime in hours.
    #[serde(default = "default_session_key_hours")]
    pub session_key_hours: u32,
}

fn default_pairwise_days() -> u32 {
    30
}
fn default_network_id_days() -> u32 {
    1
}
fn default_session_key_hours() -> u32 {
    24
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            pairwise_days: default_pairwise_days(),
            network_id_days: default_network_id_days(),
            session_key_hours: default_session_key_hours(),
        }
    }
}

/// Identity core configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Rotation policy.
    #[serde(default)]
    pub rotation: RotationPolicy,
    /// Whether hardware backing is required for the root key.
    #[serde(default)]
    pub require_hardware_backing: bool,
}

/// Indexing pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Global minimum k-anonymity floor. Per-entry floors may raise but
    /// never lower the effective floor below this value.
    #[serde(default = "default_min_privacy_floor")]
    pub min_privacy_floor: u32,
    /// Fixed timezone offset applied during time bucketization, in minutes
    /// east of UTC.
    #[serde(default)]
    pub timezone_offset_minutes: i32,
}

fn default_min_privacy_floor() -> u32 {
    5
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_privacy_floor: default_min_privacy_floor(),
            timezone_offset_minutes: 0,
        }
    }
}

/// Request inbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxConfig {
    /// Maximum pending requests.
    #[serde(default = "default_inbox_capacity")]
    pub capacity: usize,
    /// Maximum retained seen-nonce entries.
    #[serde(default = "default_nonce_cap")]
    pub seen_nonce_cap: usize,
    /// Extra retention past request expiry for seen nonces, in hours.
    #[serde(default = "default_nonce_horizon_hours")]
    pub nonce_horizon_hours: u32,
}

fn default_inbox_capacity() -> usize {
    256
}
fn default_nonce_cap() -> usize {
    100_000
}
fn default_nonce_horizon_hours() -> u32 {
    24
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            capacity: default_inbox_capacity(),
            seen_nonce_cap: default_nonce_cap(),
            nonce_horizon_hours: default_nonce_horizon_hours(),
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transfer chunk size in bytes.
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
    /// Per-chunk deadline in milliseconds.
    #[serde(default = "default_chunk_deadline_ms")]
    pub chunk_deadline_ms: u64,
    /// Session lifetime in hours.
    #[serde(default = "default_session_hours")]
    pub session_hours: u32,
}

fn default_chunk_bytes() -> usize {
    64 * 1024
}
fn default_chunk_deadline_ms() -> u64 {
    10_000
}
fn default_session_hours() -> u32 {
    24
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: default_chunk_bytes(),
            chunk_deadline_ms: default_chunk_deadline_ms(),
            session_hours: default_session_hours(),
        }
    }
}

/// Transient-failure retry configuration (exponential backoff with jitter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts before surfacing the failure.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Backoff cap in milliseconds (five minutes).
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_backoff_cap_ms() -> u64 {
    5 * 60 * 1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

/// Connector sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Bounded parallelism of the background sync pool.
    #[serde(default = "default_sync_parallelism")]
    pub parallelism: usize,
    /// Retry policy for transient connector failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_sync_parallelism() -> usize {
    2
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            parallelism: default_sync_parallelism(),
            retry: RetryConfig::default(),
        }
    }
}

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identity core settings.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Indexing pipeline settings.
    #[serde(default)]
    pub index: IndexConfig,
    /// Inbox settings.
    #[serde(default)]
    pub inbox: InboxConfig,
    /// Transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Connector sync settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Audit log file path; in-memory only when absent.
    #[serde(default)]
    pub audit_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_yields_defaults() {
        let cfg: NodeConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.index.min_privacy_floor, 5);
        assert_eq!(cfg.inbox.capacity, 256);
        assert_eq!(cfg.sync.retry.max_attempts, 5);
        assert_eq!(cfg.sync.retry.backoff_cap_ms, 300_000);
        assert!(cfg.audit_path.is_none());
    }

    #[test]
    fn partial_toml_overrides() {
        let cfg: NodeConfig = toml::from_str(
            r#"
            [index]
            min_privacy_floor = 10

            [inbox]
            capacity = 8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.index.min_privacy_floor, 10);
        assert_eq!(cfg.inbox.capacity, 8);
        assert_eq!(cfg.inbox.seen_nonce_cap, 100_000);
    }
}
