// Path: crates/types/src/odx/mod.rs

//! Privacy-safe facet index (ODX) entries.
//!
//! An ODX entry is the only data structure ever visible to the coordinator,
//! so its safety invariants are enforced at construction: coarse-only time
//! buckets, no precise coordinates, no exact geo resolution, forbidden-word
//! free facet keys, and counts at or above the privacy floor.

use crate::error::SafetyError;
use crate::event::GeoResolution;
use crate::privacy;
use serde::{Deserialize, Serialize};

/// Time resolution tags for ODX buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeResolution {
    /// `YYYY`.
    Year,
    /// `YYYY-WNN`.
    Week,
    /// `YYYY-MM`.
    Month,
    /// `YYYY-MM-DD`.
    Day,
}

/// Coarse quality classification carried on each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityClass {
    /// Connector-verified data only.
    High,
    /// Mixed or partially verified data.
    Medium,
    /// Unverified data present.
    Low,
}

/// One privacy-safe facet index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OdxEntry {
    /// Facet key, `namespace:category`.
    pub facet_key: String,
    /// Coarse time bucket (`YYYY`, `YYYY-WNN`, `YYYY-MM`, `YYYY-MM-DD`).
    pub time_bucket: String,
    /// Region-code geo bucket, when present.
    pub geo_bucket: Option<String>,
    /// Aggregated, non-negative count.
    pub count: u64,
    /// Quality classification of the aggregate.
    pub quality: QualityClass,
    /// Minimum k-anonymity group size for this entry.
    pub privacy_floor: u32,
    /// Geo resolution tag; never `Exact`.
    pub geo_resolution: GeoResolution,
    /// Time resolution tag.
    pub time_resolution: TimeResolution,
    /// Ontology version the entry was built under.
    pub ontology_version: u32,
}

impl OdxEntry {
    /// Builds an entry, enforcing every construction-time safety check.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        facet_key: impl Into<String>,
        time_bucket: impl Into<String>,
        geo_bucket: Option<String>,
        count: u64,
        quality: QualityClass,
        privacy_floor: u32,
        geo_resolution: GeoResolution,
        time_resolution: TimeResolution,
        ontology_version: u32,
    ) -> Result<Self, SafetyError> {
        let facet_key = facet_key.into();
        let time_bucket = time_bucket.into();

        if !privacy::COARSE_TIME_BUCKET.is_match(&time_bucket) {
            return Err(SafetyError::OdxSafety(format!(
                "Time bucket '{}' is not coarse",
                time_bucket
            )));
        }
        if geo_resolution == GeoResolution::Exact {
            return Err(SafetyError::OdxSafety(
                "Exact geo resolution is not permitted in the index".to_string(),
            ));
        }
        if let Some(bucket) = &geo_bucket {
            if privacy::PRECISE_COORDINATE.is_match(bucket) {
                return Err(SafetyError::OdxSafety(format!(
                    "Geo bucket '{}' contains precise coordinates",
                    bucket
                )));
            }
        }
        if privacy::contains_forbidden_word(&facet_key) {
            return Err(SafetyError::OdxSafety(format!(
                "Facet key '{}' contains a forbidden word",
                facet_key
            )));
        }
        if count < u64::from(privacy_floor) {
            return Err(SafetyError::OdxSafety(format!(
                "Count {} is below the privacy floor {}",
                count, privacy_floor
            )));
        }

        Ok(Self {
            facet_key,
            time_bucket,
            geo_bucket,
            count,
            quality,
            privacy_floor,
            geo_resolution,
            time_resolution,
            ontology_version,
        })
    }

    /// The aggregation key of this entry.
    pub fn aggregation_key(&self) -> (String, String, Option<String>, u32) {
        (
            self.facet_key.clone(),
            self.time_bucket.clone(),
            self.geo_bucket.clone(),
            self.ontology_version,
        )
    }
}
