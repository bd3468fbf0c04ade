// Path: crates/node/src/pipeline.rs
//! The indexing pipeline: canonical event → features → labels → ODX.

use std::sync::Arc;
use tracing::debug;
use veil_index::features;
use veil_index::labeler::Labeler;
use veil_index::odx::OdxStore;
use veil_types::error::{CoreError, SafetyError};
use veil_types::event::CanonicalEvent;

/// Feeds canonical events into the index.
pub struct IndexPipeline {
    labeler: Labeler,
    odx: Arc<OdxStore>,
    offset_minutes: i32,
}

impl IndexPipeline {
    /// A pipeline over the labeler and store.
    pub fn new(labeler: Labeler, odx: Arc<OdxStore>, offset_minutes: i32) -> Self {
        Self {
            labeler,
            odx,
            offset_minutes,
        }
    }

    /// Ingests one event. Features failing the leakage validator never
    /// reach the labeler or the index.
    pub fn ingest(&self, event: &CanonicalEvent) -> Result<(), CoreError> {
        let extracted = features::extract(event, self.offset_minutes);
        if !features::validate_no_leakage(&extracted) {
            return Err(SafetyError::ForbiddenPattern(format!(
                "extracted features for event {} failed the leakage validator",
                event.event_id
            ))
            .into());
        }
        let labels = self.labeler.label(event, &extracted);
        let updated = self
            .odx
            .ingest(event, &labels, &extracted)
            .map_err(CoreError::Safety)?;
        debug!(event_id = %event.event_id, facets = updated, "event indexed");
        Ok(())
    }

    /// Ingests a batch, stopping at the first safety violation.
    pub fn ingest_batch(&self, events: &[CanonicalEvent]) -> Result<usize, CoreError> {
        for event in events {
            self.ingest(event)?;
        }
        Ok(events.len())
    }

    /// The store this pipeline feeds.
    pub fn odx(&self) -> &Arc<OdxStore> {
        &self.odx
    }
}
