// Path: crates/types/src/error/mod.rs
//! Core error types for the Veil runtime.
//!
//! Failures are reported with a stable machine-readable code (via
//! [`ErrorCode`]) and a human-readable sentence. Safety and integrity kinds
//! are never recovered locally; protocol kinds are surfaced but not fatal;
//! transient kinds are retried at the boundary.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Protocol-level rejections of inbound material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The signature over the record did not verify.
    #[error("Invalid signature")]
    InvalidSignature,
    /// The record carried no policy stamp.
    #[error("Missing policy stamp")]
    MissingPolicyStamp,
    /// The record carried a policy stamp that failed validation.
    #[error("Invalid policy stamp")]
    InvalidPolicyStamp,
    /// The record's identity has been seen before.
    #[error("Replay detected for identity {0}")]
    ReplayDetected(String),
    /// The record has expired.
    #[error("Expired: {0}")]
    Expired(String),
    /// The inbox is at capacity and nothing could be evicted.
    #[error("Inbox is full")]
    InboxFull,
    /// A presented token has expired.
    #[error("Token expired")]
    TokenExpired,
    /// The caller is not authorized for the operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::MissingPolicyStamp => "MISSING_POLICY_STAMP",
            Self::InvalidPolicyStamp => "INVALID_POLICY_STAMP",
            Self::ReplayDetected(_) => "REPLAY_DETECTED",
            Self::Expired(_) => "EXPIRED",
            Self::InboxFull => "INBOX_FULL",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
        }
    }
}

/// Safety violations. These are surfaced to the caller and written to the
/// audit log; they are never recovered locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyError {
    /// An ODX entry failed a construction-time safety check.
    #[error("ODX safety violation: {0}")]
    OdxSafety(String),
    /// Outbound material matched a forbidden pattern.
    #[error("Forbidden pattern in outbound data: {0}")]
    ForbiddenPattern(String),
    /// An unencrypted payload attempted to leave the device.
    #[error("Raw payload egress blocked for destination {0}")]
    RawPayloadEgress(String),
    /// The destination is not on the egress allowlist.
    #[error("Unknown egress destination: {0}")]
    UnknownDestination(String),
    /// A plan step used an operator outside the allowlist.
    #[error("Disallowed operator: {0}")]
    DisallowedOperator(String),
    /// Plan execution exceeded a declared resource limit.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
    /// Code inside the plan VM attempted a network operation.
    #[error("Network access blocked inside plan execution")]
    NetworkBlocked,
}

impl ErrorCode for SafetyError {
    fn code(&self) -> &'static str {
        match self {
            Self::OdxSafety(_) => "ODX_SAFETY",
            Self::ForbiddenPattern(_) => "FORBIDDEN_PATTERN",
            Self::RawPayloadEgress(_) => "RAW_PAYLOAD_EGRESS",
            Self::UnknownDestination(_) => "UNKNOWN_DESTINATION",
            Self::DisallowedOperator(_) => "DISALLOWED_OPERATOR",
            Self::ResourceLimitExceeded(_) => "RESOURCE_LIMIT_EXCEEDED",
            Self::NetworkBlocked => "NETWORK_BLOCKED",
        }
    }
}

/// Integrity failures detected on stored or signed material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// The audit hash chain broke at the given sequence index.
    #[error("Audit hash chain mismatch at index {index}: {detail}")]
    HashMismatch {
        /// First affected sequence index.
        index: u64,
        /// What failed to match.
        detail: String,
    },
    /// A capsule's hash or authentication tag did not verify.
    #[error("Capsule tampered: {0}")]
    CapsuleTampered(String),
    /// A signed contract's canonical bytes no longer match its signature.
    #[error("Contract tampered: {0}")]
    ContractTampered(String),
}

impl ErrorCode for IntegrityError {
    fn code(&self) -> &'static str {
        match self {
            Self::HashMismatch { .. } => "HASH_MISMATCH",
            Self::CapsuleTampered(_) => "CAPSULE_TAMPERED",
            Self::ContractTampered(_) => "CONTRACT_TAMPERED",
        }
    }
}

/// Transient failures, retried with backoff at the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransientError {
    /// The operation exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),
    /// The connection to the peer failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
    /// The remote service is unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// The remote service applied rate limiting.
    #[error("Rate limited: {0}")]
    RateLimited(String),
}

impl ErrorCode for TransientError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TIMEOUT",
            Self::ConnectionError(_) => "CONNECTION_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::RateLimited(_) => "RATE_LIMITED",
        }
    }
}

/// Cryptographic operation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The key material could not be parsed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// A signature could not be produced.
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    /// Authenticated decryption failed.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    /// A key derivation step failed.
    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),
    /// A general cryptographic operation failed.
    #[error("Crypto operation failed: {0}")]
    OperationFailed(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::SigningFailed(_) => "CRYPTO_SIGNING_FAILED",
            Self::DecryptionFailed(_) => "CRYPTO_DECRYPTION_FAILED",
            Self::DerivationFailed(_) => "CRYPTO_DERIVATION_FAILED",
            Self::OperationFailed(_) => "CRYPTO_OPERATION_FAILED",
        }
    }
}

/// Fatal configuration errors, discovered at startup.
///
/// These are the only failures that may abort the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required cryptographic algorithm is unavailable.
    #[error("Missing cryptographic algorithm: {0}")]
    MissingAlgorithm(String),
    /// Secure storage is unavailable but hardware backing is required.
    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),
    /// The configuration file could not be parsed.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingAlgorithm(_) => "CONFIG_MISSING_ALGORITHM",
            Self::SecureStorageUnavailable(_) => "CONFIG_SECURE_STORAGE_UNAVAILABLE",
            Self::Invalid(_) => "CONFIG_INVALID",
        }
    }
}

/// The umbrella error for cross-crate call paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A protocol-level rejection.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A safety violation.
    #[error(transparent)]
    Safety(#[from] SafetyError),
    /// An integrity failure.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// A transient failure.
    #[error(transparent)]
    Transient(#[from] TransientError),
    /// A cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// A fatal configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A record failed structural validation.
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Protocol(e) => e.code(),
            Self::Safety(e) => e.code(),
            Self::Integrity(e) => e.code(),
            Self::Transient(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Validation(_) => "VALIDATION_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ProtocolError::InvalidSignature.code(), "INVALID_SIGNATURE");
        assert_eq!(
            SafetyError::RawPayloadEgress("x".into()).code(),
            "RAW_PAYLOAD_EGRESS"
        );
        assert_eq!(
            IntegrityError::HashMismatch {
                index: 3,
                detail: "entry hash".into()
            }
            .code(),
            "HASH_MISMATCH"
        );
        assert_eq!(TransientError::Timeout("t".into()).code(), "TIMEOUT");
    }

    #[test]
    fn umbrella_preserves_inner_code() {
        let e: CoreError = SafetyError::NetworkBlocked.into();
        assert_eq!(e.code(), "NETWORK_BLOCKED");
    }
}
