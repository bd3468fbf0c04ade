// Path: crates/vm/src/lib.rs
#![forbid(unsafe_code)]

//! # Veil Plan VM
//!
//! Validates signed query plans against the closed operator allowlist and
//! executes them over locally indexed data under hard resource limits and an
//! in-process network block. Nothing a plan does can reach the network: the
//! VM installs an interlock that the egress gate consults, and any operator
//! failure is converted to a structured step failure at the step boundary.

pub mod exec;
pub mod netguard;
pub mod ops;
pub mod validate;
pub mod value;

pub use exec::{ExecutionFailure, ExecutionOutput, PlanExecutor};
pub use netguard::NetworkGuard;
pub use validate::{validate_plan, PlanValidationError};
pub use value::{DataMap, PlanValue};
