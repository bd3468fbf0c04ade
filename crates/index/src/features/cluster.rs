// Path: crates/index/src/features/cluster.rs
//! Cluster references derived from category and safe attributes only.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use veil_types::event::{AttributeValue, CanonicalEvent};
use veil_types::feature::ClusterFeatures;
use veil_types::privacy;

static TAG_DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4,}").expect("static regex"));

/// A stable opaque cluster reference: `cl-` plus eight hex chars of a
/// SHA-256 over the cluster kind and seed.
fn cluster_ref(kind: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b":");
    hasher.update(seed.as_bytes());
    let digest = hasher.finalize();
    format!("cl-{}", &hex::encode(digest)[..8])
}

fn safe_attr_text<'a>(event: &'a CanonicalEvent, key: &str) -> Option<&'a str> {
    match event.attributes.get(key) {
        Some(AttributeValue::Text(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// True when a user tag may be carried as a safe tag.
pub fn tag_is_safe(tag: &str) -> bool {
    !tag.is_empty()
        && !tag.contains('@')
        && !TAG_DIGIT_RUN.is_match(tag)
        && !privacy::contains_forbidden_word(tag)
}

/// Derives the cluster feature record of an event.
///
/// Seeds come from the category and from semantic attributes; raw content
/// never participates.
pub fn cluster_features(event: &CanonicalEvent) -> ClusterFeatures {
    let topic = Some(cluster_ref(
        "topic",
        &format!("{}:{}", event.category.as_str(), event.event_type),
    ));
    let mood = safe_attr_text(event, "mood").map(|m| cluster_ref("mood", m));
    let scene = safe_attr_text(event, "scene").map(|s| cluster_ref("scene", s));
    let activity = safe_attr_text(event, "activity").map(|a| cluster_ref("activity", a));

    let safe_tags: BTreeSet<String> = safe_attr_text(event, "tags")
        .map(|tags| {
            tags.split(',')
                .map(str::trim)
                .filter(|t| tag_is_safe(t))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    ClusterFeatures {
        topic,
        mood,
        scene,
        activity,
        safe_tags,
    }
}
