// Path: crates/index/src/features/mod.rs
//! Feature extraction: maps canonical events into bucketized, PII-free
//! feature records.

pub mod cluster;
pub mod numeric;
pub mod quality;
pub mod time;

use veil_types::event::CanonicalEvent;
use veil_types::feature::ExtractedFeatures;
use veil_types::privacy;

/// Extracts the full feature set of one event.
///
/// Deterministic and total: the same event and zone offset always yield the
/// same features.
pub fn extract(event: &CanonicalEvent, offset_minutes: i32) -> ExtractedFeatures {
    ExtractedFeatures {
        event_id: event.event_id.clone(),
        time: time::time_bucket(event.timestamp_ms, offset_minutes),
        numeric: numeric::numeric_buckets(event),
        clusters: cluster::cluster_features(event),
        quality: quality::quality_flags(event),
    }
}

/// Leakage validator: true iff no string in the feature set contains a
/// forbidden word or matches a PII pattern.
pub fn validate_no_leakage(features: &ExtractedFeatures) -> bool {
    let mut strings: Vec<&str> = vec![&features.event_id, &features.quality.data_source];
    for opt in [
        &features.clusters.topic,
        &features.clusters.mood,
        &features.clusters.scene,
        &features.clusters.activity,
    ] {
        if let Some(s) = opt {
            strings.push(s);
        }
    }
    strings.extend(features.clusters.safe_tags.iter().map(String::as_str));

    strings
        .iter()
        .all(|s| !privacy::contains_forbidden_word(s) && !privacy::matches_index_pii(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_test_utils::fixtures;

    #[test]
    fn extraction_is_deterministic() {
        let event = fixtures::activity_event("run-1");
        assert_eq!(extract(&event, 0), extract(&event, 0));
    }

    #[test]
    fn clean_features_pass_the_leakage_validator() {
        let event = fixtures::activity_event("run-1");
        let features = extract(&event, 0);
        assert!(validate_no_leakage(&features));
    }

    #[test]
    fn leaky_tag_fails_the_validator() {
        let event = fixtures::activity_event("run-1");
        let mut features = extract(&event, 0);
        features
            .clusters
            .safe_tags
            .insert("call 5551234567890".to_string());
        assert!(!validate_no_leakage(&features));
    }

    #[test]
    fn forbidden_source_name_fails_the_validator() {
        let event = fixtures::activity_event("run-1");
        let mut features = extract(&event, 0);
        features.quality.data_source = "raw-export".to_string();
        assert!(!validate_no_leakage(&features));
    }
}
