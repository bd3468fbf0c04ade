// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Veil Types
//!
//! This crate is the foundational library for the Veil runtime, containing all
//! core data structures, error types, and configuration objects.
//!
//! ## Architectural Role
//!
//! As the base crate, `veil-types` has minimal dependencies and is itself a
//! dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared records like `CanonicalEvent`, `DataRequest`, `ContractDraft`,
//! `QueryPlan`, and the various error enums.

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::CoreError> = std::result::Result<T, E>;

/// Authenticated encrypted capsule records and their wire form.
pub mod capsule;
/// The canonical, deterministic binary codec for signed material.
pub mod codec;
/// Shared configuration structures for runtime components.
pub mod config;
/// Consent contract drafts, signed contracts, and obligation terms.
pub mod contract;
/// A unified set of all error types used across the workspace.
pub mod error;
/// The source-agnostic canonical event model.
pub mod event;
/// Privacy-safe extracted feature records and bucket enumerations.
pub mod feature;
/// Rule-produced labels and label sets.
pub mod label;
/// Privacy-safe facet index (ODX) entries.
pub mod odx;
/// Signed declarative query plans and their operators.
pub mod plan;
/// Normative privacy constants: forbidden words and PII patterns.
pub mod privacy;
/// Incoming data requests and their constraints.
pub mod request;
/// Peer session records and lifecycle states.
pub mod session;
/// Epoch-millisecond clock helpers.
pub mod time;
