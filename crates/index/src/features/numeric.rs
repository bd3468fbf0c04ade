// Path: crates/index/src/features/numeric.rs
//! Bounded numeric bucketization. Raw values stay on-device; only the
//! bucket names ever reach the ODX.

use veil_types::event::{AttributeValue, CanonicalEvent};
use veil_types::feature::{CountBucket, DistanceBucket, DurationBucket, NumericBuckets};

/// Buckets a duration in seconds.
pub fn duration_bucket(duration_secs: Option<u32>) -> DurationBucket {
    match duration_secs {
        None => DurationBucket::None,
        Some(s) if s < 60 => DurationBucket::Instant,
        Some(s) if s < 5 * 60 => DurationBucket::VeryShort,
        Some(s) if s < 15 * 60 => DurationBucket::Short,
        Some(s) if s < 30 * 60 => DurationBucket::Medium,
        Some(s) if s < 60 * 60 => DurationBucket::Long,
        Some(s) if s < 120 * 60 => DurationBucket::VeryLong,
        Some(_) => DurationBucket::Extended,
    }
}

/// Buckets a count.
pub fn count_bucket(count: i64) -> CountBucket {
    match count {
        c if c <= 0 => CountBucket::None,
        1 => CountBucket::Single,
        c if c <= 5 => CountBucket::Few,
        c if c <= 10 => CountBucket::Several,
        c if c <= 50 => CountBucket::Many,
        c if c <= 100 => CountBucket::VeryMany,
        _ => CountBucket::Numerous,
    }
}

/// Buckets a distance in meters.
pub fn distance_bucket(meters: Option<f64>) -> DistanceBucket {
    match meters {
        None => DistanceBucket::None,
        Some(m) if m < 100.0 => DistanceBucket::Nearby,
        Some(m) if m < 1_000.0 => DistanceBucket::Short,
        Some(m) if m < 5_000.0 => DistanceBucket::Medium,
        Some(m) if m < 20_000.0 => DistanceBucket::Long,
        Some(m) if m < 100_000.0 => DistanceBucket::VeryLong,
        Some(_) => DistanceBucket::Distant,
    }
}

/// Extracts the numeric bucket triple of an event.
///
/// Count comes from the `count` attribute, distance from `distance_m`.
pub fn numeric_buckets(event: &CanonicalEvent) -> NumericBuckets {
    let count = match event.attributes.get("count") {
        Some(AttributeValue::Integer(c)) => *c,
        Some(v) => v.as_f64().map(|f| f as i64).unwrap_or(0),
        None => 0,
    };
    let distance = event.attributes.get("distance_m").and_then(AttributeValue::as_f64);
    NumericBuckets {
        duration: duration_bucket(event.duration_secs),
        count: count_bucket(count),
        distance: distance_bucket(distance),
    }
}
