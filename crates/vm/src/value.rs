// Path: crates/vm/src/value.rs
//! The VM's data model: a keyed map of primitive values passed step to
//! step.

use std::collections::BTreeMap;
use std::fmt;

/// A primitive value inside the VM.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanValue {
    /// A string value.
    Text(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean flag.
    Flag(bool),
}

impl PlanValue {
    /// Numeric view, when the value has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Approximate in-memory size, used by the resource monitor.
    pub fn approx_bytes(&self) -> usize {
        match self {
            Self::Text(s) => s.len() + 8,
            _ => 8,
        }
    }
}

impl fmt::Display for PlanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Flag(v) => write!(f, "{}", v),
        }
    }
}

/// The keyed data map a plan transforms.
pub type DataMap = BTreeMap<String, PlanValue>;

/// Approximate size of a data map in bytes.
pub fn approx_map_bytes(data: &DataMap) -> usize {
    data.iter()
        .map(|(k, v)| k.len() + v.approx_bytes())
        .sum()
}
