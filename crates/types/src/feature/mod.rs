// Path: crates/types/src/feature/mod.rs

//! Privacy-safe extracted feature records.
//!
//! Features are the bucketized, PII-free view of a canonical event. Raw
//! numeric values behind the buckets may be retained on-device only and are
//! never shipped outside the ODX.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Coarse time-of-day buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeOfDay {
    /// 05:00–11:59.
    Morning,
    /// 12:00–16:59.
    Afternoon,
    /// 17:00–21:59.
    Evening,
    /// 22:00–04:59.
    Night,
}

/// Weekday / weekend classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayType {
    /// Monday through Friday.
    Weekday,
    /// Saturday and Sunday.
    Weekend,
}

/// The deterministic time bucket of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    /// Hour of day, 0–23.
    pub hour_of_day: u8,
    /// Day of week, 1 = Monday … 7 = Sunday.
    pub day_of_week: u8,
    /// ISO week of year, 1–53.
    pub week_of_year: u8,
    /// Month, 1–12.
    pub month: u8,
    /// Quarter, 1–4.
    pub quarter: u8,
    /// Coarse time-of-day bucket.
    pub time_of_day: TimeOfDay,
    /// Weekday / weekend bucket.
    pub day_type: DayType,
}

/// Bounded duration buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationBucket {
    /// No duration recorded.
    None,
    /// Under one minute.
    Instant,
    /// Under five minutes.
    VeryShort,
    /// Under fifteen minutes.
    Short,
    /// Under thirty minutes.
    Medium,
    /// Under one hour.
    Long,
    /// Under two hours.
    VeryLong,
    /// Two hours or more.
    Extended,
}

/// Bounded count buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountBucket {
    /// Zero or negative.
    None,
    /// Exactly one.
    Single,
    /// Up to five.
    Few,
    /// Up to ten.
    Several,
    /// Up to fifty.
    Many,
    /// Up to one hundred.
    VeryMany,
    /// More than one hundred.
    Numerous,
}

/// Bounded distance buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceBucket {
    /// No distance recorded.
    None,
    /// Under 100 m.
    Nearby,
    /// Under 1 km.
    Short,
    /// Under 5 km.
    Medium,
    /// Under 20 km.
    Long,
    /// Under 100 km.
    VeryLong,
    /// 100 km or more.
    Distant,
}

/// The numeric bucket triple of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericBuckets {
    /// Duration bucket.
    pub duration: DurationBucket,
    /// Count bucket.
    pub count: CountBucket,
    /// Distance bucket.
    pub distance: DistanceBucket,
}

/// Cluster references derived from category and safe attributes only.
///
/// Raw content never participates in clustering; the references are stable
/// opaque identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterFeatures {
    /// Topic cluster reference.
    pub topic: Option<String>,
    /// Mood cluster reference.
    pub mood: Option<String>,
    /// Scene cluster reference.
    pub scene: Option<String>,
    /// Activity cluster reference.
    pub activity: Option<String>,
    /// Filtered safe tags.
    pub safe_tags: BTreeSet<String>,
}

/// How strongly the event's source vouches for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationLevel {
    /// Delivered by a platform connector.
    Verified,
    /// User import carrying a content hash.
    PartiallyVerified,
    /// Everything else.
    Unverified,
}

/// Quality flags derived from source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFlags {
    /// The connector or importer the event came through.
    pub data_source: String,
    /// Verification level.
    pub verification: VerificationLevel,
    /// Fraction of expected fields that were present, in [0,1].
    pub completeness: f64,
    /// Aggregate confidence score in [0,1].
    pub confidence: f64,
}

/// The full extracted feature set of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFeatures {
    /// The event this feature set was extracted from.
    pub event_id: String,
    /// Deterministic time bucket.
    pub time: TimeBucket,
    /// Numeric bucket triple.
    pub numeric: NumericBuckets,
    /// Cluster references and safe tags.
    pub clusters: ClusterFeatures,
    /// Quality flags.
    pub quality: QualityFlags,
}
