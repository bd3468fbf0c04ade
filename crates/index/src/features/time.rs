// Path: crates/index/src/features/time.rs
//! Deterministic time bucketization in a configured zone offset.

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Utc};
use veil_types::feature::{DayType, TimeBucket, TimeOfDay};

fn local_time(timestamp_ms: u64, offset_minutes: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    let utc: DateTime<Utc> = Utc
        .timestamp_millis_opt(timestamp_ms as i64)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().expect("epoch is valid"));
    utc.with_timezone(&offset)
}

/// Buckets a timestamp; total over all inputs.
pub fn time_bucket(timestamp_ms: u64, offset_minutes: i32) -> TimeBucket {
    let local = local_time(timestamp_ms, offset_minutes);
    let hour = local.hour() as u8;
    let day_of_week = local.weekday().number_from_monday() as u8;
    let month = local.month() as u8;

    let time_of_day = match hour {
        5..=11 => TimeOfDay::Morning,
        12..=16 => TimeOfDay::Afternoon,
        17..=21 => TimeOfDay::Evening,
        _ => TimeOfDay::Night,
    };
    let day_type = if day_of_week >= 6 {
        DayType::Weekend
    } else {
        DayType::Weekday
    };

    TimeBucket {
        hour_of_day: hour,
        day_of_week,
        week_of_year: local.iso_week().week() as u8,
        month,
        quarter: (month - 1) / 3 + 1,
        time_of_day,
        day_type,
    }
}

/// `YYYY-MM-DD` bucket string.
pub fn day_bucket(timestamp_ms: u64, offset_minutes: i32) -> String {
    local_time(timestamp_ms, offset_minutes)
        .format("%Y-%m-%d")
        .to_string()
}

/// `YYYY-WNN` bucket string (ISO week).
pub fn week_bucket(timestamp_ms: u64, offset_minutes: i32) -> String {
    let local = local_time(timestamp_ms, offset_minutes);
    let iso = local.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

/// `YYYY-MM` bucket string.
pub fn month_bucket(timestamp_ms: u64, offset_minutes: i32) -> String {
    local_time(timestamp_ms, offset_minutes)
        .format("%Y-%m")
        .to_string()
}

/// `YYYY` bucket string.
pub fn year_bucket(timestamp_ms: u64, offset_minutes: i32) -> String {
    local_time(timestamp_ms, offset_minutes).format("%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-15T10:30:00Z, a Monday.
    const TS: u64 = 1_705_314_600_000;

    #[test]
    fn buckets_are_deterministic_and_correct() {
        let b = time_bucket(TS, 0);
        assert_eq!(b.hour_of_day, 10);
        assert_eq!(b.day_of_week, 1);
        assert_eq!(b.month, 1);
        assert_eq!(b.quarter, 1);
        assert_eq!(b.time_of_day, TimeOfDay::Morning);
        assert_eq!(b.day_type, DayType::Weekday);
        assert_eq!(b, time_bucket(TS, 0));
    }

    #[test]
    fn offset_shifts_the_day() {
        // 10:30 UTC with +14h offset lands on the next day's night bucket.
        let b = time_bucket(TS, 14 * 60);
        assert_eq!(b.hour_of_day, 0);
        assert_eq!(day_bucket(TS, 14 * 60), "2024-01-16");
    }

    #[test]
    fn bucket_strings_match_coarse_format() {
        assert_eq!(day_bucket(TS, 0), "2024-01-15");
        assert_eq!(week_bucket(TS, 0), "2024-W03");
        assert_eq!(month_bucket(TS, 0), "2024-01");
        assert_eq!(year_bucket(TS, 0), "2024");
    }
}
