// Path: crates/node/src/connectors/mod.rs
//! The connector registry: tagged variants with explicit match dispatch.
//!
//! Concrete connector wire formats are external collaborators; the core
//! sees them as queues of already-normalized canonical events that the
//! platform adapter fills. Credentials come from environment variables
//! (`VEIL_<ID>_CLIENT_ID` / `_CLIENT_SECRET` / `_REDIRECT_URI`); none of
//! them influence the egress gate.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;
use veil_api::connector::{
    Connector, ConnectorCapabilities, ConnectorHealth, ConnectorKind, SyncOutcome,
};
use veil_types::error::TransientError;
use veil_types::event::CanonicalEvent;

/// Environment-sourced connector credentials.
#[derive(Debug, Clone, Default)]
pub struct ConnectorEnv {
    /// OAuth client id.
    pub client_id: Option<String>,
    /// OAuth client secret.
    pub client_secret: Option<String>,
    /// OAuth redirect URI.
    pub redirect_uri: Option<String>,
}

impl ConnectorEnv {
    /// Reads `VEIL_<ID>_*` variables for a connector id.
    pub fn from_env(connector_id: &str) -> Self {
        let prefix = format!("VEIL_{}", connector_id.to_ascii_uppercase().replace('-', "_"));
        let get = |suffix: &str| std::env::var(format!("{}_{}", prefix, suffix)).ok();
        Self {
            client_id: get("CLIENT_ID"),
            client_secret: get("CLIENT_SECRET"),
            redirect_uri: get("REDIRECT_URI"),
        }
    }

    fn authorized(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Shared adapter state: a spool of normalized events the platform side
/// fills and sync drains.
struct Spool {
    events: Mutex<Vec<CanonicalEvent>>,
}

impl Spool {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, events: Vec<CanonicalEvent>) {
        self.events.lock().extend(events);
    }

    fn drain(&self) -> Vec<CanonicalEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

macro_rules! spool_connector {
    ($name:ident, $kind:expr, $caps:expr) => {
        /// A spool-backed connector adapter.
        pub struct $name {
            id: String,
            env: ConnectorEnv,
            spool: Spool,
        }

        impl $name {
            /// An adapter with credentials read from the environment.
            pub fn new(id: impl Into<String>) -> Self {
                let id = id.into();
                let env = ConnectorEnv::from_env(&id);
                Self {
                    id,
                    env,
                    spool: Spool::new(),
                }
            }

            /// Queues normalized events for the next sync pass.
            pub fn enqueue(&self, events: Vec<CanonicalEvent>) {
                self.spool.push(events);
            }
        }

        #[async_trait]
        impl Connector for $name {
            fn id(&self) -> &str {
                &self.id
            }

            fn kind(&self) -> ConnectorKind {
                $kind
            }

            fn capabilities(&self) -> ConnectorCapabilities {
                $caps
            }

            async fn authorize(&self) -> Result<(), TransientError> {
                if self.env.authorized() || !self.capabilities().authorize {
                    Ok(())
                } else {
                    Err(TransientError::ServiceUnavailable(format!(
                        "connector {} has no credentials configured",
                        self.id
                    )))
                }
            }

            async fn sync(&self, _cursor: Option<&str>) -> Result<SyncOutcome, TransientError> {
                let events = self.spool.drain();
                info!(connector = %self.id, events = events.len(), "sync pass drained spool");
                Ok(SyncOutcome {
                    events,
                    next_cursor: None,
                })
            }

            async fn healthcheck(&self) -> Result<ConnectorHealth, TransientError> {
                if self.env.authorized() || !self.capabilities().authorize {
                    Ok(ConnectorHealth::Healthy)
                } else {
                    Ok(ConnectorHealth::NeedsAuthorization)
                }
            }

            async fn revoke(&self) -> Result<(), TransientError> {
                self.spool.drain();
                Ok(())
            }
        }
    };
}

spool_connector!(
    HealthFrameworkConnector,
    ConnectorKind::HealthFramework,
    ConnectorCapabilities {
        authorize: false,
        incremental_sync: true,
        revoke: true,
    }
);

spool_connector!(
    FitnessApiConnector,
    ConnectorKind::FitnessApi,
    ConnectorCapabilities {
        authorize: true,
        incremental_sync: true,
        revoke: true,
    }
);

spool_connector!(
    FileImportConnector,
    ConnectorKind::FileImport,
    ConnectorCapabilities {
        authorize: false,
        incremental_sync: false,
        revoke: false,
    }
);

/// The tagged connector variants. Dispatch is an explicit match at this
/// boundary; no trait-object chains escape the registry.
pub enum RegisteredConnector {
    /// OS health framework adapter.
    Health(HealthFrameworkConnector),
    /// Remote fitness API adapter.
    Fitness(FitnessApiConnector),
    /// File import adapter.
    Import(FileImportConnector),
}

impl RegisteredConnector {
    /// The capability view of this variant.
    pub fn as_connector(&self) -> &dyn Connector {
        match self {
            Self::Health(c) => c,
            Self::Fitness(c) => c,
            Self::Import(c) => c,
        }
    }

    /// Stable id of the underlying adapter.
    pub fn id(&self) -> &str {
        self.as_connector().id()
    }
}

/// Registered connectors, shared with the sync pool.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: Vec<Arc<RegisteredConnector>>,
}

impl ConnectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connector variant.
    pub fn register(&mut self, connector: RegisteredConnector) {
        self.connectors.push(Arc::new(connector));
    }

    /// All registered connectors.
    pub fn connectors(&self) -> &[Arc<RegisteredConnector>] {
        &self.connectors
    }
}
