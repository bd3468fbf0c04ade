// Path: crates/types/src/label/mod.rs

//! Rule-produced labels and label sets.
//!
//! Labels are the explainable output of the rule-based labeler: each one
//! carries the identifier of the rule that produced it, and is keyed as
//! `namespace:category:value`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The closed set of label namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelNamespace {
    /// What the event is about.
    Domain,
    /// When it happened.
    Time,
    /// Where it happened (coarse).
    Geo,
    /// How trustworthy the record is.
    Quality,
    /// Privacy sensitivity markers.
    Privacy,
    /// Where the record came from.
    Source,
    /// Derived behavioral patterns.
    Behavior,
}

impl LabelNamespace {
    /// The stable lowercase form used in label keys and facet keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Time => "time",
            Self::Geo => "geo",
            Self::Quality => "quality",
            Self::Privacy => "privacy",
            Self::Source => "source",
            Self::Behavior => "behavior",
        }
    }
}

impl fmt::Display for LabelNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single explainable label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Namespace the label lives in.
    pub namespace: LabelNamespace,
    /// Category within the namespace.
    pub category: String,
    /// Value within the category.
    pub value: String,
    /// Confidence in [0,1].
    pub confidence: f64,
    /// Identifier of the rule that produced the label.
    pub rule_id: Option<String>,
}

impl Label {
    /// Builds a label with clamped confidence.
    pub fn new(
        namespace: LabelNamespace,
        category: impl Into<String>,
        value: impl Into<String>,
        confidence: f64,
        rule_id: Option<String>,
    ) -> Self {
        Self {
            namespace,
            category: category.into(),
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            rule_id,
        }
    }

    /// The label key, `namespace:category:value`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.namespace, self.category, self.value)
    }

    /// The facet key of the label, `namespace:category`.
    pub fn facet_key(&self) -> String {
        format!("{}:{}", self.namespace, self.category)
    }
}

/// All labels produced for one event under one ontology version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSet {
    /// The labeled event.
    pub event_id: String,
    /// The labels.
    pub labels: Vec<Label>,
    /// The ontology version the labels were produced under.
    pub ontology_version: u32,
}

impl LabelSet {
    /// The distinct label keys in this set, in lexicographic order.
    pub fn keys(&self) -> BTreeSet<String> {
        self.labels.iter().map(Label::key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_key_form() {
        let l = Label::new(LabelNamespace::Domain, "activity", "running", 0.9, None);
        assert_eq!(l.key(), "domain:activity:running");
        assert_eq!(l.facet_key(), "domain:activity");
    }

    #[test]
    fn confidence_is_clamped() {
        let l = Label::new(LabelNamespace::Quality, "source", "connector", 1.8, None);
        assert_eq!(l.confidence, 1.0);
    }
}
