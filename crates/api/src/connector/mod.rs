// Path: crates/api/src/connector/mod.rs
//! Connector capability seam.
//!
//! Connectors are external collaborators (health frameworks, fitness APIs,
//! file importers). The core depends on them only through this minimal
//! capability set; dispatch over concrete connectors is an explicit variant
//! match at the registry boundary, not a virtual-method chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use veil_types::error::TransientError;
use veil_types::event::CanonicalEvent;

/// The kind of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// An OS health framework.
    HealthFramework,
    /// A remote fitness API.
    FitnessApi,
    /// A user-initiated file import.
    FileImport,
}

/// What a connector can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectorCapabilities {
    /// Supports OAuth-style authorization.
    pub authorize: bool,
    /// Supports incremental sync.
    pub incremental_sync: bool,
    /// Supports credential revocation.
    pub revoke: bool,
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Canonical events produced by this pass.
    pub events: Vec<CanonicalEvent>,
    /// Opaque cursor to resume the next pass from.
    pub next_cursor: Option<String>,
}

/// Health of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorHealth {
    /// Authorized and reachable.
    Healthy,
    /// Reachable but the authorization needs renewal.
    NeedsAuthorization,
    /// Unreachable.
    Unreachable,
}

/// The connector capability set: {id, kind, capabilities, authorize, sync,
/// healthcheck, revoke}.
///
/// Sync failures surface as [`TransientError`] and are retried with backoff
/// by the sync pool; a connector never performs its own retries.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable connector identifier.
    fn id(&self) -> &str;

    /// Connector kind.
    fn kind(&self) -> ConnectorKind;

    /// Declared capabilities.
    fn capabilities(&self) -> ConnectorCapabilities;

    /// Completes authorization with the external source.
    async fn authorize(&self) -> Result<(), TransientError>;

    /// Pulls new records since `cursor` and normalizes them.
    async fn sync(&self, cursor: Option<&str>) -> Result<SyncOutcome, TransientError>;

    /// Probes connectivity and authorization state.
    async fn healthcheck(&self) -> Result<ConnectorHealth, TransientError>;

    /// Revokes stored credentials with the external source.
    async fn revoke(&self) -> Result<(), TransientError>;
}
