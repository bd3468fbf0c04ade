// Path: crates/index/src/labeler/mod.rs
//! Rule-based, explainable labeling.
//!
//! Every label carries the identifier of the rule that produced it. The core
//! rule families always execute; behavior rules are registered on top. Only
//! labels valid in the current ontology version — and free of forbidden
//! words and PII — are retained.

pub mod ontology;

use crate::labeler::ontology::Ontology;
use std::sync::Arc;
use tracing::debug;
use veil_types::event::{AttributeValue, CanonicalEvent, EventCategory, GeoResolution};
use veil_types::feature::{DurationBucket, ExtractedFeatures, TimeOfDay, VerificationLevel};
use veil_types::label::{Label, LabelNamespace, LabelSet};
use veil_types::privacy;

/// A registered behavior rule.
pub struct BehaviorRule {
    /// Rule identifier, carried on produced labels.
    pub id: String,
    /// The rule body.
    pub apply: Box<dyn Fn(&CanonicalEvent, &ExtractedFeatures) -> Option<Label> + Send + Sync>,
}

/// The rule-based labeler.
pub struct Labeler {
    ontology: Arc<Ontology>,
    behavior_rules: Vec<BehaviorRule>,
}

fn label(
    namespace: LabelNamespace,
    category: &str,
    value: impl Into<String>,
    confidence: f64,
    rule_id: &str,
) -> Label {
    Label::new(namespace, category, value, confidence, Some(rule_id.to_string()))
}

impl Labeler {
    /// A labeler over an ontology snapshot, with the standard behavior
    /// rules (high-intensity, long-duration, night-activity) registered.
    pub fn new(ontology: Arc<Ontology>) -> Self {
        let mut labeler = Self {
            ontology,
            behavior_rules: Vec::new(),
        };
        labeler.register_behavior_rule(BehaviorRule {
            id: "behavior-high-intensity".to_string(),
            apply: Box::new(|event, _features| {
                let intensity = event.attributes.get("intensity").and_then(AttributeValue::as_f64)?;
                (intensity >= 0.8).then(|| {
                    label(
                        LabelNamespace::Behavior,
                        "pattern",
                        "high_intensity",
                        0.8,
                        "behavior-high-intensity",
                    )
                })
            }),
        });
        labeler.register_behavior_rule(BehaviorRule {
            id: "behavior-long-duration".to_string(),
            apply: Box::new(|_event, features| {
                matches!(
                    features.numeric.duration,
                    DurationBucket::VeryLong | DurationBucket::Extended
                )
                .then(|| {
                    label(
                        LabelNamespace::Behavior,
                        "pattern",
                        "long_duration",
                        0.8,
                        "behavior-long-duration",
                    )
                })
            }),
        });
        labeler.register_behavior_rule(BehaviorRule {
            id: "behavior-night-activity".to_string(),
            apply: Box::new(|event, features| {
                (features.time.time_of_day == TimeOfDay::Night
                    && event.category == EventCategory::Activity)
                    .then(|| {
                        label(
                            LabelNamespace::Behavior,
                            "pattern",
                            "night_activity",
                            0.8,
                            "behavior-night-activity",
                        )
                    })
            }),
        });
        labeler
    }

    /// Registers an additional behavior rule.
    pub fn register_behavior_rule(&mut self, rule: BehaviorRule) {
        self.behavior_rules.push(rule);
    }

    /// The ontology snapshot this labeler labels under.
    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    /// Produces the label set of one event.
    pub fn label(&self, event: &CanonicalEvent, features: &ExtractedFeatures) -> LabelSet {
        let mut labels = Vec::new();
        labels.extend(self.domain_rule(event));
        labels.extend(self.time_rules(features));
        labels.extend(self.geo_rules(event));
        labels.extend(self.quality_rules(event, features));
        labels.extend(self.privacy_rules(event));
        labels.extend(self.source_rule(event));
        for rule in &self.behavior_rules {
            labels.extend((rule.apply)(event, features));
        }

        let before = labels.len();
        labels.retain(|l| self.ontology.allows(l) && Self::value_is_safe(&l.value));
        if labels.len() < before {
            debug!(
                event_id = %event.event_id,
                dropped = before - labels.len(),
                "dropped labels outside the ontology or unsafe"
            );
        }

        LabelSet {
            event_id: event.event_id.clone(),
            labels,
            ontology_version: self.ontology.version(),
        }
    }

    fn value_is_safe(value: &str) -> bool {
        !privacy::contains_forbidden_word(value) && !privacy::matches_index_pii(value)
    }

    fn domain_rule(&self, event: &CanonicalEvent) -> Option<Label> {
        Some(label(
            LabelNamespace::Domain,
            event.category.as_str(),
            event.event_type.clone(),
            0.95,
            "domain-from-category",
        ))
    }

    fn time_rules(&self, features: &ExtractedFeatures) -> Vec<Label> {
        let period = match features.time.time_of_day {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        };
        let day_type = match features.time.day_type {
            veil_types::feature::DayType::Weekday => "weekday",
            veil_types::feature::DayType::Weekend => "weekend",
        };
        let season = match features.time.month {
            12 | 1 | 2 => "winter",
            3..=5 => "spring",
            6..=8 => "summer",
            _ => "autumn",
        };
        vec![
            label(LabelNamespace::Time, "period", period, 1.0, "time-period"),
            label(LabelNamespace::Time, "day_type", day_type, 1.0, "time-day-type"),
            label(LabelNamespace::Time, "season", season, 1.0, "time-season"),
        ]
    }

    fn geo_rules(&self, event: &CanonicalEvent) -> Vec<Label> {
        let mut labels = Vec::new();
        if let Some(geo) = &event.geo {
            let resolution = match geo.resolution {
                GeoResolution::City => Some("city"),
                GeoResolution::Region => Some("region"),
                GeoResolution::Country => Some("country"),
                GeoResolution::Exact | GeoResolution::None => None,
            };
            if let Some(r) = resolution {
                labels.push(label(
                    LabelNamespace::Geo,
                    "resolution",
                    r,
                    0.9,
                    "geo-resolution",
                ));
            }
        }
        if let Some(AttributeValue::Text(place)) = event.attributes.get("place_type") {
            labels.push(label(
                LabelNamespace::Geo,
                "type",
                place.clone(),
                0.9,
                "geo-type-from-attributes",
            ));
        }
        labels
    }

    fn quality_rules(&self, event: &CanonicalEvent, features: &ExtractedFeatures) -> Vec<Label> {
        let source = match event.source_type {
            veil_types::event::SourceType::Connector => "connector",
            veil_types::event::SourceType::Import => "import",
            veil_types::event::SourceType::Manual => "manual",
        };
        let verification = match features.quality.verification {
            VerificationLevel::Verified => "verified",
            VerificationLevel::PartiallyVerified => "partially_verified",
            VerificationLevel::Unverified => "unverified",
        };
        let completeness = if features.quality.completeness >= 0.75 {
            "high"
        } else if features.quality.completeness >= 0.5 {
            "medium"
        } else {
            "low"
        };
        vec![
            label(LabelNamespace::Quality, "source", source, 1.0, "quality-source"),
            label(
                LabelNamespace::Quality,
                "verification",
                verification,
                1.0,
                "quality-verification",
            ),
            label(
                LabelNamespace::Quality,
                "completeness",
                completeness,
                0.9,
                "quality-completeness",
            ),
        ]
    }

    fn privacy_rules(&self, event: &CanonicalEvent) -> Vec<Label> {
        let sensitive = matches!(
            event.category,
            EventCategory::Health | EventCategory::Location
        );
        let floor = if sensitive { "k10" } else { "k5" };
        let pii_in_attributes = event.attributes.values().any(|v| match v {
            AttributeValue::Text(s) => privacy::matches_index_pii(s),
            _ => false,
        });
        vec![
            label(
                LabelNamespace::Privacy,
                "sensitivity",
                if sensitive { "high" } else { "normal" },
                1.0,
                "privacy-sensitivity",
            ),
            label(LabelNamespace::Privacy, "floor", floor, 1.0, "privacy-floor"),
            label(
                LabelNamespace::Privacy,
                "pii",
                if pii_in_attributes { "flagged" } else { "clear" },
                1.0,
                "privacy-pii-flag",
            ),
        ]
    }

    fn source_rule(&self, event: &CanonicalEvent) -> Option<Label> {
        let channel = match event.source_type {
            veil_types::event::SourceType::Connector => "connector",
            veil_types::event::SourceType::Import => "import",
            veil_types::event::SourceType::Manual => "manual",
        };
        Some(label(
            LabelNamespace::Source,
            "channel",
            channel,
            1.0,
            "source-channel",
        ))
    }
}
