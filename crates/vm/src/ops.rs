// Path: crates/vm/src/ops.rs
//! Operator implementations. Each operator transforms the keyed data map
//! and returns a fresh map; parameter problems surface as step errors, never
//! panics.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use veil_types::plan::{Operator, PlanStep};

use crate::value::{DataMap, PlanValue};

/// A failed operator application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError(pub String);

fn param<'a>(step: &'a PlanStep, key: &str) -> Option<&'a str> {
    step.parameters.get(key).map(String::as_str)
}

fn key_matches(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(suffix), _) => key.ends_with(suffix),
        (_, Some(prefix)) => key.starts_with(prefix),
        _ => pattern == key,
    }
}

fn select(step: &PlanStep, data: DataMap) -> DataMap {
    let pattern = param(step, "pattern").unwrap_or("*");
    data.into_iter()
        .filter(|(k, _)| key_matches(pattern, k))
        .collect()
}

fn filter(step: &PlanStep, data: DataMap) -> DataMap {
    let field = param(step, "field");
    let value = param(step, "value");
    data.into_iter()
        .filter(|(k, v)| {
            field.map_or(true, |f| k == f) && value.map_or(true, |want| v.to_string() == want)
        })
        .collect()
}

fn project(step: &PlanStep, data: DataMap, allowed: &BTreeSet<String>) -> DataMap {
    data.into_iter()
        .filter(|(k, _)| step.output_fields.contains(k) && allowed.contains(k))
        .collect()
}

fn bucketize(step: &PlanStep, mut data: DataMap) -> Result<DataMap, StepError> {
    let field = param(step, "field")
        .ok_or_else(|| StepError("BUCKETIZE requires a 'field' parameter".into()))?
        .to_string();
    let size: i64 = param(step, "bucket_size")
        .ok_or_else(|| StepError("BUCKETIZE requires a 'bucket_size' parameter".into()))?
        .parse()
        .map_err(|_| StepError("BUCKETIZE bucket_size must be an integer".into()))?;
    if size < 1 {
        return Err(StepError("BUCKETIZE bucket_size must be >= 1".into()));
    }

    if let Some(v) = data.get(&field).and_then(PlanValue::as_f64) {
        let lo = (v / size as f64).floor() as i64 * size;
        data.insert(
            format!("{}_bucket", field),
            PlanValue::Text(format!("{}-{}", lo, lo + size)),
        );
    }
    Ok(data)
}

fn aggregate(step: &PlanStep, data: DataMap) -> Result<DataMap, StepError> {
    let op = param(step, "op").unwrap_or("count");
    let numeric: Vec<f64> = data.values().filter_map(PlanValue::as_f64).collect();

    let value = match op {
        "count" => PlanValue::Integer(data.len() as i64),
        "sum" => PlanValue::Float(numeric.iter().sum()),
        "avg" => {
            if numeric.is_empty() {
                PlanValue::Float(0.0)
            } else {
                PlanValue::Float(numeric.iter().sum::<f64>() / numeric.len() as f64)
            }
        }
        "min" => PlanValue::Float(numeric.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => PlanValue::Float(numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        other => return Err(StepError(format!("unknown aggregate op '{}'", other))),
    };

    let mut out = DataMap::new();
    out.insert("_aggregate_type".to_string(), PlanValue::Text(op.to_string()));
    out.insert("_aggregate_value".to_string(), value);
    Ok(out)
}

fn cluster_hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("cluster:{}", &hex::encode(hasher.finalize())[..12])
}

fn cluster_ref(step: &PlanStep, data: DataMap) -> DataMap {
    let field = param(step, "field");
    data.into_iter()
        .map(|(k, v)| {
            if field.map_or(true, |f| k == f) {
                let hashed = cluster_hash(&v.to_string());
                (k, PlanValue::Text(hashed))
            } else {
                (k, v)
            }
        })
        .collect()
}

fn redact(step: &PlanStep, mut data: DataMap) -> DataMap {
    for field in &step.input_fields {
        if data.contains_key(field) {
            data.insert(field.clone(), PlanValue::Text("[REDACTED]".to_string()));
        }
    }
    data
}

fn sample(step: &PlanStep, data: DataMap) -> Result<DataMap, StepError> {
    let rate: f64 = param(step, "rate")
        .ok_or_else(|| StepError("SAMPLE requires a 'rate' parameter".into()))?
        .parse()
        .map_err(|_| StepError("SAMPLE rate must be a number".into()))?;
    if !(rate > 0.0 && rate <= 1.0) {
        return Err(StepError("SAMPLE rate must be in (0, 1]".into()));
    }

    let mut rng = match param(step, "seed").and_then(|s| s.parse::<u64>().ok()) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Ok(data
        .into_iter()
        .filter(|_| rng.gen::<f64>() < rate)
        .collect())
}

fn export(step: &PlanStep, mut data: DataMap) -> DataMap {
    let format = param(step, "format").unwrap_or("json");
    data.insert(
        "_export_requested".to_string(),
        PlanValue::Text(format.to_string()),
    );
    data
}

/// Applies one operator to the data map.
///
/// `PACK_CAPSULE` is handled by the executor, which wraps the final result;
/// reaching it here is a sequencing bug surfaced as a step error.
pub fn apply(
    op: Operator,
    step: &PlanStep,
    data: DataMap,
    allowed_fields: &BTreeSet<String>,
) -> Result<DataMap, StepError> {
    match op {
        Operator::Select => Ok(select(step, data)),
        Operator::Filter => Ok(filter(step, data)),
        Operator::Project => Ok(project(step, data, allowed_fields)),
        Operator::Bucketize => bucketize(step, data),
        Operator::Aggregate => aggregate(step, data),
        Operator::ClusterRef => Ok(cluster_ref(step, data)),
        Operator::Redact => Ok(redact(step, data)),
        Operator::Sample => sample(step, data),
        Operator::Export => Ok(export(step, data)),
        Operator::PackCapsule => Err(StepError(
            "PACK_CAPSULE cannot be applied as a data operator".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn step(op: &str, params: &[(&str, &str)]) -> PlanStep {
        PlanStep {
            index: 0,
            operator: op.to_string(),
            parameters: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            input_fields: BTreeSet::new(),
            output_fields: BTreeSet::new(),
        }
    }

    fn data() -> DataMap {
        let mut d = BTreeMap::new();
        d.insert("count".to_string(), PlanValue::Integer(42));
        d.insert("city".to_string(), PlanValue::Text("US-NY".to_string()));
        d.insert("rate".to_string(), PlanValue::Float(0.5));
        d
    }

    #[test]
    fn select_wildcard_and_prefix() {
        let all = apply(Operator::Select, &step("SELECT", &[("pattern", "*")]), data(), &BTreeSet::new()).unwrap();
        assert_eq!(all.len(), 3);
        let c = apply(Operator::Select, &step("SELECT", &[("pattern", "c*")]), data(), &BTreeSet::new()).unwrap();
        assert_eq!(c.len(), 2);
        assert!(c.contains_key("count") && c.contains_key("city"));
    }

    #[test]
    fn filter_by_field_and_value() {
        let by_field =
            apply(Operator::Filter, &step("FILTER", &[("field", "city")]), data(), &BTreeSet::new()).unwrap();
        assert_eq!(by_field.len(), 1);
        let by_value =
            apply(Operator::Filter, &step("FILTER", &[("value", "42")]), data(), &BTreeSet::new()).unwrap();
        assert_eq!(by_value.len(), 1);
        assert!(by_value.contains_key("count"));
    }

    #[test]
    fn project_intersects_outputs_and_allowed() {
        let mut s = step("PROJECT", &[]);
        s.output_fields = ["count".to_string(), "city".to_string()].into();
        let allowed: BTreeSet<String> = ["count".to_string()].into();
        let out = apply(Operator::Project, &s, data(), &allowed).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("count"));
    }

    #[test]
    fn bucketize_adds_companion_field() {
        let out = apply(
            Operator::Bucketize,
            &step("BUCKETIZE", &[("field", "count"), ("bucket_size", "10")]),
            data(),
            &BTreeSet::new(),
        )
        .unwrap();
        assert_eq!(
            out.get("count_bucket"),
            Some(&PlanValue::Text("40-50".to_string()))
        );

        let err = apply(
            Operator::Bucketize,
            &step("BUCKETIZE", &[("field", "count"), ("bucket_size", "0")]),
            data(),
            &BTreeSet::new(),
        )
        .unwrap_err();
        assert!(err.0.contains(">= 1"));
    }

    #[test]
    fn aggregate_count_and_avg() {
        let count = apply(
            Operator::Aggregate,
            &step("AGGREGATE", &[("op", "count")]),
            data(),
            &BTreeSet::new(),
        )
        .unwrap();
        assert_eq!(count.get("_aggregate_value"), Some(&PlanValue::Integer(3)));
        assert_eq!(
            count.get("_aggregate_type"),
            Some(&PlanValue::Text("count".to_string()))
        );

        let avg = apply(
            Operator::Aggregate,
            &step("AGGREGATE", &[("op", "avg")]),
            data(),
            &BTreeSet::new(),
        )
        .unwrap();
        // Numeric values are 42 and 0.5; strings are ignored.
        assert_eq!(avg.get("_aggregate_value"), Some(&PlanValue::Float(21.25)));
    }

    #[test]
    fn cluster_ref_hides_raw_values() {
        let out = apply(
            Operator::ClusterRef,
            &step("CLUSTER_REF", &[("field", "city")]),
            data(),
            &BTreeSet::new(),
        )
        .unwrap();
        let v = out.get("city").unwrap().to_string();
        assert!(v.starts_with("cluster:"));
        assert!(!v.contains("US-NY"));
        // Stable across applications.
        let again = apply(
            Operator::ClusterRef,
            &step("CLUSTER_REF", &[("field", "city")]),
            data(),
            &BTreeSet::new(),
        )
        .unwrap();
        assert_eq!(out.get("city"), again.get("city"));
    }

    #[test]
    fn redact_replaces_listed_fields() {
        let mut s = step("REDACT", &[]);
        s.input_fields = ["city".to_string()].into();
        let out = apply(Operator::Redact, &s, data(), &BTreeSet::new()).unwrap();
        assert_eq!(
            out.get("city"),
            Some(&PlanValue::Text("[REDACTED]".to_string()))
        );
        assert_eq!(out.get("count"), Some(&PlanValue::Integer(42)));
    }

    #[test]
    fn seeded_sample_is_deterministic() {
        let s = step("SAMPLE", &[("rate", "0.5"), ("seed", "7")]);
        let a = apply(Operator::Sample, &s, data(), &BTreeSet::new()).unwrap();
        let b = apply(Operator::Sample, &s, data(), &BTreeSet::new()).unwrap();
        assert_eq!(a, b);

        let full = step("SAMPLE", &[("rate", "1.0"), ("seed", "7")]);
        assert_eq!(apply(Operator::Sample, &full, data(), &BTreeSet::new()).unwrap().len(), 3);

        let bad = step("SAMPLE", &[("rate", "1.5")]);
        assert!(apply(Operator::Sample, &bad, data(), &BTreeSet::new()).is_err());
    }

    #[test]
    fn export_tags_output() {
        let out = apply(
            Operator::Export,
            &step("EXPORT", &[("format", "csv")]),
            data(),
            &BTreeSet::new(),
        )
        .unwrap();
        assert_eq!(
            out.get("_export_requested"),
            Some(&PlanValue::Text("csv".to_string()))
        );
    }
}
