// Path: crates/types/src/request/mod.rs

//! Incoming data requests and their constraints.

use crate::codec;
use crate::error::CoreError;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a request was addressed to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// Sent to every node.
    Broadcast,
    /// Sent to nodes in a coarse geo/topic cohort.
    GeoTopic,
    /// Sent to this node specifically.
    Targeted,
}

/// What the requester may receive.
///
/// Ordered from safest to most permissive; the sensitivity gate may only
/// move a contract toward the safe end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputMode {
    /// Aggregates only; no row-level data.
    AggregateOnly,
    /// Row-level data visible inside a clean room, never exported.
    CleanRoom,
    /// Aggregates may be exported.
    ExportAllowed,
    /// Raw rows may be exported.
    RawExport,
}

/// An inclusive time window constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window start, UTC epoch milliseconds.
    pub start_ms: u64,
    /// Window end, UTC epoch milliseconds.
    pub end_ms: u64,
}

/// Resolution of a coarse geo constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintResolution {
    /// Country-level cohort.
    Country,
    /// Region-level cohort.
    Region,
    /// City-level cohort.
    City,
}

/// A coarse geographic constraint on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoConstraint {
    /// Region code (e.g. `US-NY`).
    pub region_code: String,
    /// Constraint resolution.
    pub resolution: ConstraintResolution,
}

/// Offered compensation for fulfilling a request.
///
/// Amounts are integer micro-units of the named currency so that signed
/// material never carries floating point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationOffer {
    /// Amount in micro-units.
    pub amount_micros: u64,
    /// ISO currency code.
    pub currency: String,
}

/// A third-party data request as accepted by the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    /// Globally unique request identity.
    pub request_id: String,
    /// Stable requester identity.
    pub requester_id: String,
    /// Requester display name (for consent UI).
    pub requester_display_name: String,
    /// Addressing type.
    pub request_type: RequestType,
    /// Labels the requester must receive for the computation to be useful.
    pub required_labels: BTreeSet<String>,
    /// Labels the user may additionally grant.
    pub optional_labels: BTreeSet<String>,
    /// Optional time window constraint.
    pub time_window: Option<TimeWindow>,
    /// Optional coarse geo constraint.
    pub geo_constraint: Option<GeoConstraint>,
    /// Requested output mode.
    pub output_mode: OutputMode,
    /// Offered compensation.
    pub compensation: CompensationOffer,
    /// Coordinator policy stamp; must be non-empty.
    pub policy_stamp: String,
    /// Requester signature over the canonical bytes.
    pub signature: String,
    /// Creation time, UTC epoch milliseconds.
    pub created_at_ms: u64,
    /// Expiry time, UTC epoch milliseconds; must be after creation.
    pub expires_at_ms: u64,
}

/// The canonical (signed) form of a request. Field order is fixed;
/// collections iterate lexicographically.
#[derive(Encode, Decode)]
struct RequestCanonicalV1 {
    compensation_amount_micros: u64,
    compensation_currency: String,
    created_at_ms: u64,
    expires_at_ms: u64,
    geo_region_code: Option<String>,
    geo_resolution: Option<u8>,
    optional_labels: BTreeSet<String>,
    output_mode: u8,
    policy_stamp: String,
    request_id: String,
    request_type: u8,
    requester_id: String,
    required_labels: BTreeSet<String>,
    time_window: Option<TimeWindow>,
}

impl DataRequest {
    /// The canonical bytes the requester signature covers.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        codec::to_bytes_canonical(&RequestCanonicalV1 {
            compensation_amount_micros: self.compensation.amount_micros,
            compensation_currency: self.compensation.currency.clone(),
            created_at_ms: self.created_at_ms,
            expires_at_ms: self.expires_at_ms,
            geo_region_code: self.geo_constraint.as_ref().map(|g| g.region_code.clone()),
            geo_resolution: self.geo_constraint.as_ref().map(|g| g.resolution as u8),
            optional_labels: self.optional_labels.clone(),
            output_mode: self.output_mode as u8,
            policy_stamp: self.policy_stamp.clone(),
            request_id: self.request_id.clone(),
            request_type: self.request_type as u8,
            requester_id: self.requester_id.clone(),
            required_labels: self.required_labels.clone(),
            time_window: self.time_window,
        })
    }

    /// The union of required and optional labels.
    pub fn grantable_labels(&self) -> BTreeSet<String> {
        self.required_labels
            .union(&self.optional_labels)
            .cloned()
            .collect()
    }

    /// True once the request's expiry has passed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Structural validation of the record itself (§6 request format).
    ///
    /// Signature, policy stamp, replay, and expiry gating against the clock
    /// are the inbox's responsibility.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.request_id.is_empty() {
            return Err(CoreError::Validation("request_id is empty".into()));
        }
        if self.requester_id.is_empty() {
            return Err(CoreError::Validation("requester_id is empty".into()));
        }
        if self.expires_at_ms <= self.created_at_ms {
            return Err(CoreError::Validation(
                "expires_at must be after created_at".into(),
            ));
        }
        if let Some(w) = &self.time_window {
            if w.start_ms > w.end_ms {
                return Err(CoreError::Validation(
                    "time window start is after its end".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DataRequest {
        DataRequest {
            request_id: "req-1".into(),
            requester_id: "acme".into(),
            requester_display_name: "Acme Research".into(),
            request_type: RequestType::Broadcast,
            required_labels: ["domain:activity".to_string()].into(),
            optional_labels: ["time:period".to_string()].into(),
            time_window: Some(TimeWindow {
                start_ms: 0,
                end_ms: 1,
            }),
            geo_constraint: None,
            output_mode: OutputMode::AggregateOnly,
            compensation: CompensationOffer {
                amount_micros: 250_000,
                currency: "USD".into(),
            },
            policy_stamp: "stamp".into(),
            signature: "s".repeat(64),
            created_at_ms: 100,
            expires_at_ms: 200,
        }
    }

    #[test]
    fn canonical_bytes_are_stable() {
        let r = request();
        assert_eq!(r.canonical_bytes(), r.canonical_bytes());
    }

    #[test]
    fn canonical_bytes_cover_labels() {
        let a = request();
        let mut b = request();
        b.required_labels.insert("domain:health".into());
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn inverted_window_rejected() {
        let mut r = request();
        r.time_window = Some(TimeWindow {
            start_ms: 10,
            end_ms: 5,
        });
        assert!(r.validate().is_err());
    }
}
