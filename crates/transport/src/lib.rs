// Path: crates/transport/src/lib.rs
#![forbid(unsafe_code)]

//! # Veil Transport
//!
//! Seals plan output into time capsules, manages peer sessions, and drives
//! resumable chunked delivery. Every byte this crate emits goes through the
//! egress gate — the gate's send function *is* the transport's send
//! function, so no code path can bypass classification.

pub mod capsule;
pub mod session;
pub mod transfer;

pub use capsule::{open_capsule, seal_capsule, verify_capsule, verify_ciphertext};
pub use session::SessionManager;
pub use transfer::{TransferManager, TransferStatus};
