// Path: crates/types/src/privacy.rs

//! Normative privacy constants shared by the indexing pipeline and the
//! egress gate.
//!
//! The forbidden-word set and the PII patterns below are part of the security
//! contract of the runtime: no label value, ODX facet, extracted feature
//! string, or outbound field name may match any of them.

use once_cell::sync::Lazy;
use regex::Regex;

/// The normative forbidden-word set, matched case-insensitively as
/// substrings.
pub const FORBIDDEN_WORDS: [&str; 16] = [
    "raw",
    "payload",
    "content",
    "text",
    "email",
    "phone",
    "address",
    "name",
    "ssn",
    "password",
    "secret",
    "token",
    "body",
    "message",
    "creditcard",
    "bankaccount",
];

/// Email addresses.
pub static PII_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex"));

/// Runs of ten or more digits (phone numbers, account numbers).
pub static PII_LONG_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{10,}").expect("static regex"));

/// SSN-like triples (NNN-NN-NNNN).
pub static PII_SSN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("static regex"));

/// Credit-card-like groups (NNNN-NNNN-NNNN-NNNN, spaces or dashes).
pub static PII_CREDIT_CARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{4}\b").expect("static regex"));

/// Phone-like sequences with separators, seven or more digits total.
pub static PII_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d ().-]{6,}\d").expect("static regex"));

/// IPv4 addresses.
pub static PII_IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("static regex"));

/// Decimal coordinates with three or more fractional digits.
///
/// A geo bucket containing such a value is precise enough to identify a
/// building and must never appear in the ODX.
pub static PRECISE_COORDINATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\d{3,}").expect("static regex"));

/// Coarse time-bucket pattern: `YYYY`, `YYYY-WNN`, `YYYY-MM`, `YYYY-MM-DD`.
pub static COARSE_TIME_BUCKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}(-W\d{2}|-\d{2}(-\d{2})?)?$").expect("static regex"));

/// Returns true if `s` contains any forbidden word as a case-insensitive
/// substring.
pub fn contains_forbidden_word(s: &str) -> bool {
    let lowered = s.to_ascii_lowercase();
    FORBIDDEN_WORDS.iter().any(|w| lowered.contains(w))
}

/// Returns true if `s` matches any of the indexing-side PII patterns
/// (email, long digit runs, SSN-like, credit-card-like).
pub fn matches_index_pii(s: &str) -> bool {
    PII_EMAIL.is_match(s)
        || PII_LONG_DIGITS.is_match(s)
        || PII_SSN.is_match(s)
        || PII_CREDIT_CARD.is_match(s)
}

/// Returns true if `s` matches any of the egress-side PII patterns
/// (email, phone-like, IP, SSN-like).
pub fn matches_egress_pii(s: &str) -> bool {
    PII_EMAIL.is_match(s) || PII_PHONE.is_match(s) || PII_IPV4.is_match(s) || PII_SSN.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_words_match_as_substrings() {
        assert!(contains_forbidden_word("user_email_hash"));
        assert!(contains_forbidden_word("RAW"));
        assert!(contains_forbidden_word("the-Secret-facet"));
        assert!(!contains_forbidden_word("domain:activity"));
        assert!(!contains_forbidden_word("quality:verified"));
    }

    #[test]
    fn pii_patterns_catch_common_shapes() {
        assert!(matches_index_pii("reach me at jane@example.com"));
        assert!(matches_index_pii("1234567890123"));
        assert!(matches_index_pii("123-45-6789"));
        assert!(matches_index_pii("4111-1111-1111-1111"));
        assert!(!matches_index_pii("domain:activity"));
    }

    #[test]
    fn precise_coordinates_detected() {
        assert!(PRECISE_COORDINATE.is_match("40.7128,-74.0060"));
        assert!(!PRECISE_COORDINATE.is_match("40.71"));
        assert!(!PRECISE_COORDINATE.is_match("US-NY"));
    }

    #[test]
    fn coarse_time_bucket_shapes() {
        for ok in ["2024", "2024-W03", "2024-01", "2024-01-15"] {
            assert!(COARSE_TIME_BUCKET.is_match(ok), "{ok}");
        }
        for bad in ["2024-01-15T10:00", "24-01", "2024-1", "20240115"] {
            assert!(!COARSE_TIME_BUCKET.is_match(bad), "{bad}");
        }
    }
}
