// Path: crates/node/src/sync.rs
//! The background sync pool: bounded parallelism, cooperative cancellation,
//! transient retries.

use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use veil_types::config::SyncConfig;
use veil_types::event::CanonicalEvent;

use crate::connectors::ConnectorRegistry;
use crate::retry::retry_transient;

/// Runs sync passes over the registry.
pub struct SyncPool {
    config: SyncConfig,
    cancel_tx: watch::Sender<bool>,
}

impl SyncPool {
    /// A pool with the given parallelism and retry policy.
    pub fn new(config: SyncConfig) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self { config, cancel_tx }
    }

    /// Requests cancellation of in-flight passes.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// One sync pass over every registered connector. Transient failures
    /// retry with backoff; a connector that stays down is skipped and the
    /// pass continues.
    pub async fn run_pass(&self, registry: &ConnectorRegistry) -> Vec<CanonicalEvent> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut tasks: JoinSet<Vec<CanonicalEvent>> = JoinSet::new();

        for connector in registry.connectors() {
            if *self.cancel_tx.borrow() {
                break;
            }
            let connector = Arc::clone(connector);
            let semaphore = Arc::clone(&semaphore);
            let retry = self.config.retry.clone();
            let mut cancel_rx = self.cancel_tx.subscribe();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return Vec::new();
                };
                if *cancel_rx.borrow_and_update() {
                    return Vec::new();
                }
                let id = connector.id().to_string();
                let outcome = retry_transient(&retry, &id, || {
                    let connector = Arc::clone(&connector);
                    async move { connector.as_connector().sync(None).await }
                })
                .await;
                match outcome {
                    Ok(outcome) => {
                        info!(connector = %id, events = outcome.events.len(), "sync pass complete");
                        outcome.events
                    }
                    Err(e) => {
                        warn!(connector = %id, error = %e, "connector skipped this pass");
                        Vec::new()
                    }
                }
            });
        }

        let mut events = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(mut batch) = joined {
                events.append(&mut batch);
            }
        }
        events
    }
}
