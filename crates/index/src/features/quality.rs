// Path: crates/index/src/features/quality.rs
//! Quality flags derived from source metadata.

use veil_types::event::{CanonicalEvent, SourceType, EVENT_SCHEMA_VERSION};
use veil_types::feature::{QualityFlags, VerificationLevel};

/// Verification level per source: connectors vouch for their records; user
/// imports are partially verified when the source supplied a content hash.
pub fn verification_level(event: &CanonicalEvent) -> VerificationLevel {
    match event.source_type {
        SourceType::Connector => VerificationLevel::Verified,
        SourceType::Import if event.provenance.content_hash.is_some() => {
            VerificationLevel::PartiallyVerified
        }
        _ => VerificationLevel::Unverified,
    }
}

/// Fraction of expected optional fields that are present.
pub fn completeness(event: &CanonicalEvent) -> f64 {
    let present = [
        event.duration_secs.is_some(),
        event.geo.is_some(),
        !event.attributes.is_empty(),
        !event.event_type.is_empty(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    present as f64 / 4.0
}

/// Derives the quality flags of an event.
///
/// Confidence sums discrete bonuses and is clamped to 1: source provenance,
/// completeness, timestamp present, content hash present, schema-current.
pub fn quality_flags(event: &CanonicalEvent) -> QualityFlags {
    let completeness = completeness(event);
    let source_bonus = match event.source_type {
        SourceType::Connector => 0.35,
        SourceType::Import => 0.25,
        SourceType::Manual => 0.15,
    };
    let mut confidence = source_bonus + completeness * 0.25;
    if event.timestamp_ms > 0 {
        confidence += 0.10;
    }
    if event.provenance.content_hash.is_some() {
        confidence += 0.15;
    }
    if event.schema_version == EVENT_SCHEMA_VERSION {
        confidence += 0.15;
    }

    QualityFlags {
        data_source: event.provenance.connector_id.clone(),
        verification: verification_level(event),
        completeness,
        confidence: confidence.clamp(0.0, 1.0),
    }
}
