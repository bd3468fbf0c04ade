// Path: crates/types/src/plan/mod.rs

//! Signed declarative query plans and their operators.
//!
//! A plan exists only for the lifetime of a contract and is never persisted
//! beyond its expiry. Its signature covers every other field of the wire
//! form.

use crate::codec;
use crate::request::OutputMode;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// The closed operator allowlist. Anything else fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Retain keys matching a pattern.
    Select,
    /// Retain entries by field and/or value.
    Filter,
    /// Retain only allowed output fields.
    Project,
    /// Add a bucketized companion field.
    Bucketize,
    /// Aggregate numeric values.
    Aggregate,
    /// Replace values with stable cluster references.
    ClusterRef,
    /// Replace listed fields with a redaction marker.
    Redact,
    /// Bernoulli sampling of entries.
    Sample,
    /// Tag output for export (contract permitting).
    Export,
    /// Wrap the result into a capsule. Must be the final step.
    PackCapsule,
}

impl Operator {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Filter => "FILTER",
            Self::Project => "PROJECT",
            Self::Bucketize => "BUCKETIZE",
            Self::Aggregate => "AGGREGATE",
            Self::ClusterRef => "CLUSTER_REF",
            Self::Redact => "REDACT",
            Self::Sample => "SAMPLE",
            Self::Export => "EXPORT",
            Self::PackCapsule => "PACK_CAPSULE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SELECT" => Ok(Self::Select),
            "FILTER" => Ok(Self::Filter),
            "PROJECT" => Ok(Self::Project),
            "BUCKETIZE" => Ok(Self::Bucketize),
            "AGGREGATE" => Ok(Self::Aggregate),
            "CLUSTER_REF" => Ok(Self::ClusterRef),
            "REDACT" => Ok(Self::Redact),
            "SAMPLE" => Ok(Self::Sample),
            "EXPORT" => Ok(Self::Export),
            "PACK_CAPSULE" => Ok(Self::PackCapsule),
            other => Err(other.to_string()),
        }
    }
}

/// One ordered plan step.
///
/// The operator is carried as its wire string so that plans naming operators
/// outside the allowlist survive decoding and are rejected by validation
/// with the offending name intact.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step index, 0-based, strictly increasing.
    pub index: u32,
    /// Operator wire name.
    pub operator: String,
    /// Operator parameters (stringly typed; parsed at validation).
    pub parameters: BTreeMap<String, String>,
    /// Fields the step reads.
    pub input_fields: BTreeSet<String>,
    /// Fields the step writes.
    pub output_fields: BTreeSet<String>,
}

impl PlanStep {
    /// The parsed operator, if the wire name is in the allowlist.
    pub fn parsed_operator(&self) -> Result<Operator, String> {
        Operator::from_str(&self.operator)
    }
}

/// Declared resource limits of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU budget in milliseconds.
    pub cpu_millis: u64,
    /// Memory budget in bytes.
    pub memory_bytes: u64,
    /// Wall-clock budget in milliseconds.
    pub wall_millis: u64,
    /// Battery budget in percent.
    pub battery_percent: u8,
}

impl ResourceLimits {
    /// Hard default limits.
    pub const DEFAULT: Self = Self {
        cpu_millis: 10_000,
        memory_bytes: 50 * 1024 * 1024,
        wall_millis: 30_000,
        battery_percent: 5,
    };

    /// Absolute maxima; a plan declaring more is rejected.
    pub const MAX: Self = Self {
        cpu_millis: 60_000,
        memory_bytes: 100 * 1024 * 1024,
        wall_millis: 120_000,
        battery_percent: 10,
    };

    /// True when every limit is within the absolute maxima.
    pub fn within_maxima(&self) -> bool {
        self.cpu_millis <= Self::MAX.cpu_millis
            && self.memory_bytes <= Self::MAX.memory_bytes
            && self.wall_millis <= Self::MAX.wall_millis
            && self.battery_percent <= Self::MAX.battery_percent
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Output configuration of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output mode the plan was authored against.
    pub mode: u8,
    /// Maximum number of output items.
    pub max_items: u32,
    /// Maximum output size in bytes.
    pub max_bytes: u64,
    /// Whether the plan intends to export.
    pub export_allowed: bool,
}

impl OutputConfig {
    /// Builds an output config for the given mode.
    pub fn for_mode(mode: OutputMode, max_items: u32, max_bytes: u64) -> Self {
        Self {
            mode: mode as u8,
            max_items,
            max_bytes,
            export_allowed: matches!(mode, OutputMode::ExportAllowed | OutputMode::RawExport),
        }
    }
}

/// A signed declarative query plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Plan identity.
    pub plan_id: String,
    /// The governing contract.
    pub contract_id: String,
    /// Ordered steps.
    pub steps: Vec<PlanStep>,
    /// Fields any step may read or write.
    pub allowed_fields: BTreeSet<String>,
    /// Declared resource limits.
    pub limits: ResourceLimits,
    /// Output configuration.
    pub output: OutputConfig,
    /// Signature over the canonical bytes (hex).
    pub signature: String,
    /// Creation time, UTC epoch milliseconds.
    pub created_at_ms: u64,
    /// Expiry time, UTC epoch milliseconds.
    pub expires_at_ms: u64,
}

/// The canonical (signed) form of a plan: every field except the signature.
#[derive(Encode, Decode)]
struct PlanCanonicalV1 {
    allowed_fields: BTreeSet<String>,
    contract_id: String,
    created_at_ms: u64,
    expires_at_ms: u64,
    limits: ResourceLimits,
    output: OutputConfig,
    plan_id: String,
    steps: Vec<PlanStep>,
}

impl QueryPlan {
    /// The canonical bytes the plan signature covers.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        codec::to_bytes_canonical(&PlanCanonicalV1 {
            allowed_fields: self.allowed_fields.clone(),
            contract_id: self.contract_id.clone(),
            created_at_ms: self.created_at_ms,
            expires_at_ms: self.expires_at_ms,
            limits: self.limits,
            output: self.output.clone(),
            plan_id: self.plan_id.clone(),
            steps: self.steps.clone(),
        })
    }

    /// True once the plan's expiry has passed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_roundtrip() {
        for op in [
            Operator::Select,
            Operator::Filter,
            Operator::Project,
            Operator::Bucketize,
            Operator::Aggregate,
            Operator::ClusterRef,
            Operator::Redact,
            Operator::Sample,
            Operator::Export,
            Operator::PackCapsule,
        ] {
            assert_eq!(Operator::from_str(op.as_str()).unwrap(), op);
        }
        assert!(Operator::from_str("EXEC").is_err());
    }

    #[test]
    fn limits_maxima() {
        assert!(ResourceLimits::DEFAULT.within_maxima());
        let over = ResourceLimits {
            cpu_millis: 60_001,
            ..ResourceLimits::DEFAULT
        };
        assert!(!over.within_maxima());
    }
}
