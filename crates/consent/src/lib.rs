// Path: crates/consent/src/lib.rs
#![forbid(unsafe_code)]

//! # Veil Consent
//!
//! The consent path: requests arrive in a bounded, replay-protected inbox,
//! the sensitivity gate assesses what they touch, and the contract engine
//! turns the user's choices into a signed, verifiable consent contract.

pub mod contract;
pub mod inbox;
pub mod sensitivity;

pub use contract::ContractEngine;
pub use inbox::{ReceiveOutcome, RequestInbox};
pub use sensitivity::{assess, apply_forced_defaults, Protection, RiskLevel, SensitivityAssessment};
