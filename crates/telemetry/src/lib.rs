// Path: crates/telemetry/src/lib.rs
#![forbid(unsafe_code)]

//! # Veil Telemetry
//!
//! One-shot initialization of the global `tracing` subscriber.

mod init;

pub use init::init_tracing;
