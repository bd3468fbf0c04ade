// Path: crates/types/src/event/mod.rs

//! The source-agnostic canonical event model.
//!
//! Every connector record, file import, or manual entry is normalized into a
//! [`CanonicalEvent`] before anything downstream (feature extraction,
//! labeling, indexing) sees it. Normalization is deterministic: the same raw
//! record always yields the same canonical event.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a canonical event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A platform connector (health framework, fitness API).
    Connector,
    /// A user-initiated file import.
    Import,
    /// A manually entered record.
    Manual,
}

/// The closed set of event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Physical activity and exercise.
    Activity,
    /// Visits and movement.
    Location,
    /// Calls and messaging metadata.
    Communication,
    /// Photos, video, audio metadata.
    Media,
    /// Purchases and payments.
    Transaction,
    /// Social interactions.
    Social,
    /// Health and wellness measurements.
    Health,
    /// Device state and usage.
    Device,
    /// Trips and itineraries.
    Travel,
    /// Consumed or produced content metadata.
    Content,
    /// Anything else.
    Other,
}

impl EventCategory {
    /// The stable lowercase name used in labels and facet keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Location => "location",
            Self::Communication => "communication",
            Self::Media => "media",
            Self::Transaction => "transaction",
            Self::Social => "social",
            Self::Health => "health",
            Self::Device => "device",
            Self::Travel => "travel",
            Self::Content => "content",
            Self::Other => "other",
        }
    }
}

/// Geographic resolution tags, coarsest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeoResolution {
    /// Full-precision coordinates. Never leaves the device.
    Exact,
    /// City-level (two decimal places, ~1 km).
    City,
    /// Region-level (one decimal place, ~11 km).
    Region,
    /// Country-level (integer degrees).
    Country,
    /// No geographic information.
    None,
}

/// A geographic point carrying its declared resolution.
///
/// Invariant: if `resolution != Exact` the coordinates are rounded to the
/// declared granularity before storage. Construct through
/// [`GeoPoint::at_resolution`] to uphold this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Declared resolution of the stored coordinates.
    pub resolution: GeoResolution,
}

impl GeoPoint {
    /// Builds a point whose coordinates are rounded to the declared
    /// resolution.
    pub fn at_resolution(lat: f64, lon: f64, resolution: GeoResolution) -> Option<Self> {
        let round = |v: f64, decimals: i32| {
            let factor = 10f64.powi(decimals);
            (v * factor).round() / factor
        };
        match resolution {
            GeoResolution::None => None,
            GeoResolution::Exact => Some(Self { lat, lon, resolution }),
            GeoResolution::City => Some(Self {
                lat: round(lat, 2),
                lon: round(lon, 2),
                resolution,
            }),
            GeoResolution::Region => Some(Self {
                lat: round(lat, 1),
                lon: round(lon, 1),
                resolution,
            }),
            GeoResolution::Country => Some(Self {
                lat: round(lat, 0),
                lon: round(lon, 0),
                resolution,
            }),
        }
    }
}

/// A primitive attribute value on a canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    /// A short semantic string (never raw user content).
    Text(String),
    /// An integer quantity.
    Integer(i64),
    /// A floating-point quantity.
    Float(f64),
    /// A boolean flag.
    Flag(bool),
}

impl AttributeValue {
    /// The numeric view of this value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Provenance metadata attached to every canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// The connector or importer that produced the record.
    pub connector_id: String,
    /// When the record entered the device, UTC epoch milliseconds.
    pub imported_at_ms: u64,
    /// Content hash of the original record, when the source provided one.
    pub content_hash: Option<String>,
}

/// The current canonical event schema version.
pub const EVENT_SCHEMA_VERSION: u16 = 2;

/// A source-agnostic normalized event; the single input to labeling and
/// feature extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Deterministic event identity.
    pub event_id: String,
    /// Where the event originated.
    pub source_type: SourceType,
    /// Identifier of the concrete source.
    pub source_id: String,
    /// Event category.
    pub category: EventCategory,
    /// Source-specific event type (e.g. `workout.run`).
    pub event_type: String,
    /// Event time, UTC epoch milliseconds.
    pub timestamp_ms: u64,
    /// Duration in seconds, when the event has an extent.
    pub duration_secs: Option<u32>,
    /// Coarsened location, when present.
    pub geo: Option<GeoPoint>,
    /// Semantic attributes.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Provenance metadata.
    pub provenance: Provenance,
    /// Schema version the event was normalized under.
    pub schema_version: u16,
    /// Hex SHA-256 over the normalized representation.
    pub content_hash: String,
}

/// Explicit builder for [`CanonicalEvent`].
#[derive(Debug, Default)]
pub struct CanonicalEventBuilder {
    event_id: Option<String>,
    source_type: Option<SourceType>,
    source_id: Option<String>,
    category: Option<EventCategory>,
    event_type: Option<String>,
    timestamp_ms: Option<u64>,
    duration_secs: Option<u32>,
    geo: Option<GeoPoint>,
    attributes: BTreeMap<String, AttributeValue>,
    provenance: Option<Provenance>,
    content_hash: Option<String>,
}

impl CanonicalEventBuilder {
    /// Starts an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deterministic event identity.
    pub fn event_id(mut self, id: impl Into<String>) -> Self {
        self.event_id = Some(id.into());
        self
    }

    /// Sets the source type.
    pub fn source_type(mut self, st: SourceType) -> Self {
        self.source_type = Some(st);
        self
    }

    /// Sets the source identifier.
    pub fn source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    /// Sets the event category.
    pub fn category(mut self, c: EventCategory) -> Self {
        self.category = Some(c);
        self
    }

    /// Sets the source-specific event type.
    pub fn event_type(mut self, t: impl Into<String>) -> Self {
        self.event_type = Some(t.into());
        self
    }

    /// Sets the event timestamp (UTC epoch milliseconds).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    /// Sets the event duration in seconds.
    pub fn duration_secs(mut self, d: u32) -> Self {
        self.duration_secs = Some(d);
        self
    }

    /// Sets the location, rounding to the declared resolution.
    pub fn geo(mut self, lat: f64, lon: f64, resolution: GeoResolution) -> Self {
        self.geo = GeoPoint::at_resolution(lat, lon, resolution);
        self
    }

    /// Adds a semantic attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Sets the provenance record.
    pub fn provenance(mut self, p: Provenance) -> Self {
        self.provenance = Some(p);
        self
    }

    /// Sets the content hash (hex SHA-256 of the normalized form).
    pub fn content_hash(mut self, h: impl Into<String>) -> Self {
        self.content_hash = Some(h.into());
        self
    }

    /// Finalizes the event, failing on missing required fields.
    pub fn build(self) -> Result<CanonicalEvent, CoreError> {
        let missing =
            |field: &str| CoreError::Validation(format!("canonical event missing {}", field));
        Ok(CanonicalEvent {
            event_id: self.event_id.ok_or_else(|| missing("event_id"))?,
            source_type: self.source_type.ok_or_else(|| missing("source_type"))?,
            source_id: self.source_id.ok_or_else(|| missing("source_id"))?,
            category: self.category.ok_or_else(|| missing("category"))?,
            event_type: self.event_type.ok_or_else(|| missing("event_type"))?,
            timestamp_ms: self.timestamp_ms.ok_or_else(|| missing("timestamp_ms"))?,
            duration_secs: self.duration_secs,
            geo: self.geo,
            attributes: self.attributes,
            provenance: self.provenance.ok_or_else(|| missing("provenance"))?,
            schema_version: EVENT_SCHEMA_VERSION,
            content_hash: self.content_hash.ok_or_else(|| missing("content_hash"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_rounding_follows_resolution() {
        let city = GeoPoint::at_resolution(40.712_8, -74.006_0, GeoResolution::City).unwrap();
        assert_eq!(city.lat, 40.71);
        assert_eq!(city.lon, -74.01);

        let region = GeoPoint::at_resolution(40.712_8, -74.006_0, GeoResolution::Region).unwrap();
        assert_eq!(region.lat, 40.7);
        assert_eq!(region.lon, -74.0);

        let country = GeoPoint::at_resolution(40.712_8, -74.006_0, GeoResolution::Country).unwrap();
        assert_eq!(country.lat, 41.0);
        assert_eq!(country.lon, -74.0);

        assert!(GeoPoint::at_resolution(1.0, 1.0, GeoResolution::None).is_none());
    }

    #[test]
    fn builder_rejects_missing_fields() {
        let err = CanonicalEventBuilder::new().build().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
