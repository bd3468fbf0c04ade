// Path: crates/consent/src/sensitivity.rs
//! The sensitivity gate: risk assessment over requested label combinations
//! and forced safe defaults on high-risk contracts.

use std::collections::BTreeSet;
use tracing::warn;
use veil_types::contract::ContractDraft;
use veil_types::request::OutputMode;

/// Risk level of a request's label combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    /// Nothing sensitive.
    None,
    /// Mildly sensitive.
    Low,
    /// A sensitive category is present.
    Medium,
    /// A dangerous combination is present.
    High,
    /// The most dangerous combinations.
    Critical,
}

impl RiskLevel {
    /// Stable display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Protections the gate may force onto a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Protection {
    /// Output mode may not exceed clean-room.
    CleanRoomOnly,
    /// Export is forbidden regardless of mode.
    NoExport,
    /// Precise geo labels are stripped.
    CoarseGeo,
    /// The consent UI must run an additional explicit prompt.
    AdditionalConsent,
}

impl Protection {
    /// Stable display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CleanRoomOnly => "CLEAN_ROOM_ONLY",
            Self::NoExport => "NO_EXPORT",
            Self::CoarseGeo => "COARSE_GEO",
            Self::AdditionalConsent => "ADDITIONAL_CONSENT",
        }
    }
}

/// The gate's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitivityAssessment {
    /// Assessed risk.
    pub risk: RiskLevel,
    /// Protections that must be applied.
    pub protections: BTreeSet<Protection>,
}

fn has_category(labels: &BTreeSet<String>, category: &str) -> bool {
    labels.iter().any(|l| {
        l.split(':')
            .any(|segment| segment == category)
    })
}

/// Assesses the combination of requested labels and output mode.
pub fn assess(labels: &BTreeSet<String>, output_mode: OutputMode) -> SensitivityAssessment {
    let health = has_category(labels, "health");
    let biometric = has_category(labels, "biometric");
    let minor = has_category(labels, "minor");
    let precise_geo = labels.iter().any(|l| l == "geo:precise" || l.starts_with("geo:precise:"));
    let location = has_category(labels, "location");

    let mut risk = RiskLevel::None;
    let mut protections = BTreeSet::new();

    if output_mode == OutputMode::RawExport {
        risk = risk.max(RiskLevel::Low);
    }
    if health || biometric || minor || precise_geo {
        risk = risk.max(RiskLevel::Medium);
    }
    if precise_geo {
        protections.insert(Protection::CoarseGeo);
    }
    if health && minor {
        risk = risk.max(RiskLevel::High);
        protections.insert(Protection::CleanRoomOnly);
    }
    if biometric && minor {
        risk = risk.max(RiskLevel::Critical);
        protections.insert(Protection::CleanRoomOnly);
        protections.insert(Protection::NoExport);
    }
    if health && minor && (precise_geo || location) {
        risk = RiskLevel::Critical;
        protections.insert(Protection::CleanRoomOnly);
        protections.insert(Protection::NoExport);
        protections.insert(Protection::CoarseGeo);
        protections.insert(Protection::AdditionalConsent);
    }

    SensitivityAssessment { risk, protections }
}

/// Applies forced defaults to a draft: the output mode is lowered to
/// clean-room where required, precise-geo labels are stripped, and metadata
/// markers record what was forced and at which risk level.
pub fn apply_forced_defaults(
    mut draft: ContractDraft,
    assessment: &SensitivityAssessment,
) -> ContractDraft {
    if assessment.protections.is_empty() {
        return draft;
    }

    let must_contain = assessment.protections.contains(&Protection::CleanRoomOnly)
        || assessment.protections.contains(&Protection::NoExport);
    if must_contain && draft.output_mode > OutputMode::CleanRoom {
        warn!(
            contract_id = %draft.contract_id,
            from = ?draft.output_mode,
            risk = assessment.risk.as_str(),
            "forcing output mode down to clean-room"
        );
        draft.output_mode = OutputMode::CleanRoom;
        draft
            .metadata
            .insert("forced.output_mode".to_string(), "clean_room".to_string());
    }

    if assessment.protections.contains(&Protection::CoarseGeo) {
        let before = draft.selected_labels.len();
        draft
            .selected_labels
            .retain(|l| l != "geo:precise" && !l.starts_with("geo:precise:"));
        if draft.selected_labels.len() < before {
            draft
                .metadata
                .insert("forced.coarse_geo".to_string(), "stripped".to_string());
        }
    }

    if assessment.protections.contains(&Protection::AdditionalConsent) {
        draft.metadata.insert(
            "forced.additional_consent".to_string(),
            "required".to_string(),
        );
    }

    draft
        .metadata
        .insert("forced.risk".to_string(), assessment.risk.as_str().to_string());
    let forced: Vec<&str> = assessment.protections.iter().map(Protection::as_str).collect();
    draft
        .metadata
        .insert("forced.protections".to_string(), forced.join(","));
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use veil_types::contract::ObligationTerms;

    fn labels(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn draft_with(selected: &[&str], mode: OutputMode) -> ContractDraft {
        ContractDraft {
            contract_id: "c-1".into(),
            request_id: "req-1".into(),
            requester_id: "acme".into(),
            node_id: "did:veil:pairwise:00aa".into(),
            selected_labels: labels(selected),
            time_window: None,
            output_mode: mode,
            identity_reveal: false,
            compensation_micros: 0,
            compensation_currency: "USD".into(),
            escrow_ref: None,
            ttl_ms: 10_000,
            obligations: ObligationTerms::default(),
            nonce: "n-1".into(),
            created_at_ms: 1_000,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn benign_labels_are_unprotected() {
        let a = assess(&labels(&["domain:activity", "time:period"]), OutputMode::AggregateOnly);
        assert_eq!(a.risk, RiskLevel::None);
        assert!(a.protections.is_empty());
    }

    #[test]
    fn single_sensitive_category_is_medium() {
        let a = assess(&labels(&["domain:health"]), OutputMode::AggregateOnly);
        assert_eq!(a.risk, RiskLevel::Medium);
    }

    #[test]
    fn health_and_minor_forces_clean_room() {
        let a = assess(
            &labels(&["domain:health", "demographic:minor"]),
            OutputMode::ExportAllowed,
        );
        assert_eq!(a.risk, RiskLevel::High);
        assert!(a.protections.contains(&Protection::CleanRoomOnly));
    }

    #[test]
    fn biometric_and_minor_is_critical() {
        let a = assess(
            &labels(&["sensor:biometric", "demographic:minor"]),
            OutputMode::AggregateOnly,
        );
        assert_eq!(a.risk, RiskLevel::Critical);
        assert!(a.protections.contains(&Protection::NoExport));
    }

    #[test]
    fn worst_combination_forces_everything() {
        let a = assess(
            &labels(&["domain:health", "demographic:minor", "geo:precise"]),
            OutputMode::RawExport,
        );
        assert_eq!(a.risk, RiskLevel::Critical);
        assert_eq!(
            a.protections,
            [
                Protection::CleanRoomOnly,
                Protection::NoExport,
                Protection::CoarseGeo,
                Protection::AdditionalConsent,
            ]
            .into()
        );

        let draft = draft_with(
            &["domain:health", "demographic:minor", "geo:precise"],
            OutputMode::RawExport,
        );
        let forced = apply_forced_defaults(draft, &a);
        assert_eq!(forced.output_mode, OutputMode::CleanRoom);
        assert!(!forced.selected_labels.contains("geo:precise"));
        assert_eq!(forced.metadata.get("forced.risk").unwrap(), "CRITICAL");
        assert_eq!(
            forced.metadata.get("forced.additional_consent").unwrap(),
            "required"
        );
    }

    #[test]
    fn no_protections_leaves_draft_untouched() {
        let a = assess(&labels(&["domain:activity"]), OutputMode::AggregateOnly);
        let draft = draft_with(&["domain:activity"], OutputMode::AggregateOnly);
        let out = apply_forced_defaults(draft.clone(), &a);
        assert_eq!(out, draft);
    }
}
