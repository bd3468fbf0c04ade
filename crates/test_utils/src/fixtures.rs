// Path: crates/test_utils/src/fixtures.rs
//! Canonical fixtures: events, requests, and destinations used across the
//! workspace tests.

use std::collections::{BTreeMap, BTreeSet};
use veil_types::event::{
    AttributeValue, CanonicalEvent, CanonicalEventBuilder, EventCategory, GeoResolution,
    Provenance, SourceType,
};
use veil_types::plan::{OutputConfig, PlanStep, QueryPlan, ResourceLimits};
use veil_types::request::{
    CompensationOffer, DataRequest, OutputMode, RequestType, TimeWindow,
};

/// 2024-01-15T10:30:00Z, a Monday morning.
pub const FIXED_TS_MS: u64 = 1_705_314_600_000;

/// A connector-sourced activity event with coarse city geo.
pub fn activity_event(id: &str) -> CanonicalEvent {
    CanonicalEventBuilder::new()
        .event_id(id)
        .source_type(SourceType::Connector)
        .source_id("wearable-1")
        .category(EventCategory::Activity)
        .event_type("workout.run")
        .timestamp_ms(FIXED_TS_MS)
        .duration_secs(1_800)
        .geo(40.712_8, -74.006_0, GeoResolution::City)
        .attribute("region_code", AttributeValue::Text("US-NY".into()))
        .attribute("count", AttributeValue::Integer(1))
        .attribute("distance_m", AttributeValue::Float(5_200.0))
        .provenance(Provenance {
            connector_id: "fitkit".into(),
            imported_at_ms: FIXED_TS_MS + 60_000,
            content_hash: Some("a".repeat(64)),
        })
        .content_hash("b".repeat(64))
        .build()
        .expect("fixture event is complete")
}

/// A health-category event (sensitive domain).
pub fn health_event(id: &str) -> CanonicalEvent {
    CanonicalEventBuilder::new()
        .event_id(id)
        .source_type(SourceType::Connector)
        .source_id("health-framework")
        .category(EventCategory::Health)
        .event_type("measurement.heart_rate")
        .timestamp_ms(FIXED_TS_MS)
        .attribute("count", AttributeValue::Integer(1))
        .provenance(Provenance {
            connector_id: "oskit".into(),
            imported_at_ms: FIXED_TS_MS,
            content_hash: None,
        })
        .content_hash("c".repeat(64))
        .build()
        .expect("fixture event is complete")
}

/// A structurally valid signed broadcast request.
///
/// The signature is a 64-char placeholder accepted by the default length
/// verifier; tests exercising real signatures overwrite it.
pub fn broadcast_request(id: &str, now_ms: u64) -> DataRequest {
    DataRequest {
        request_id: id.into(),
        requester_id: "acme-research".into(),
        requester_display_name: "Acme Research".into(),
        request_type: RequestType::Broadcast,
        required_labels: ["domain:activity".to_string()].into(),
        optional_labels: ["time:period".to_string(), "quality:verification".to_string()].into(),
        time_window: Some(TimeWindow {
            start_ms: now_ms.saturating_sub(30 * 24 * 60 * 60 * 1000),
            end_ms: now_ms,
        }),
        geo_constraint: None,
        output_mode: OutputMode::AggregateOnly,
        compensation: CompensationOffer {
            amount_micros: 500_000,
            currency: "USD".into(),
        },
        policy_stamp: "coordinator-policy-v3".into(),
        signature: "f".repeat(64),
        created_at_ms: now_ms,
        expires_at_ms: now_ms + 60 * 60 * 1000,
    }
}

/// The label selection a consenting user would make for
/// [`broadcast_request`]: everything required plus one optional label.
pub fn default_selection() -> BTreeSet<String> {
    ["domain:activity".to_string(), "time:period".to_string()].into()
}

/// A signed plan whose steps carry the given operator wire names, with
/// workable default parameters for each operator.
pub fn plan_fixture(operators: &[&str], now_ms: u64) -> QueryPlan {
    let allowed: BTreeSet<String> = [
        "domain:activity|2024-01-15".to_string(),
        "count".to_string(),
        "count_bucket".to_string(),
        "_aggregate_type".to_string(),
        "_aggregate_value".to_string(),
        "_export_requested".to_string(),
    ]
    .into();

    let steps = operators
        .iter()
        .enumerate()
        .map(|(i, op)| {
            let mut parameters = BTreeMap::new();
            match *op {
                "SELECT" => {
                    parameters.insert("pattern".to_string(), "*".to_string());
                }
                "AGGREGATE" => {
                    parameters.insert("op".to_string(), "count".to_string());
                }
                "BUCKETIZE" => {
                    parameters.insert("field".to_string(), "count".to_string());
                    parameters.insert("bucket_size".to_string(), "10".to_string());
                }
                "SAMPLE" => {
                    parameters.insert("rate".to_string(), "1.0".to_string());
                    parameters.insert("seed".to_string(), "42".to_string());
                }
                "EXPORT" => {
                    parameters.insert("format".to_string(), "json".to_string());
                }
                "PACK_CAPSULE" => {
                    parameters.insert("ttl_secs".to_string(), "3600".to_string());
                }
                _ => {}
            }
            PlanStep {
                index: i as u32,
                operator: op.to_string(),
                parameters,
                input_fields: BTreeSet::new(),
                output_fields: BTreeSet::new(),
            }
        })
        .collect();

    QueryPlan {
        plan_id: "plan-1".into(),
        contract_id: "c-1".into(),
        steps,
        allowed_fields: allowed,
        limits: ResourceLimits::DEFAULT,
        output: OutputConfig {
            mode: OutputMode::AggregateOnly as u8,
            max_items: 1_000,
            max_bytes: 1024 * 1024,
            export_allowed: false,
        },
        signature: "e".repeat(64),
        created_at_ms: now_ms,
        expires_at_ms: now_ms + 60 * 60 * 1000,
    }
}
