// Path: crates/index/src/odx/mod.rs
//! The ODX store: privacy-safe facet aggregation.
//!
//! Cells accumulate at day granularity under `(facet, day, geo, version)`
//! keys; queries roll cells up to the requested time resolution and only
//! report aggregates whose count has reached the effective privacy floor.
//! Ingestion is idempotent per `(event, ontology version)`, so concurrent
//! or repeated writers cannot inflate counts.

use chrono::{Datelike, NaiveDate};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;
use veil_types::error::SafetyError;
use veil_types::event::{CanonicalEvent, GeoResolution};
use veil_types::feature::{ExtractedFeatures, VerificationLevel};
use veil_types::label::LabelSet;
use veil_types::odx::{OdxEntry, QualityClass, TimeResolution};
use veil_types::privacy;
use veil_types::request::TimeWindow;

use crate::features::time as time_features;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CellKey {
    facet: String,
    day_bucket: String,
    geo_bucket: Option<String>,
    version: u32,
}

#[derive(Debug, Clone)]
struct Cell {
    count: u64,
    verified: u64,
    partially_verified: u64,
    unverified: u64,
    floor: u32,
    geo_resolution: GeoResolution,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            count: 0,
            verified: 0,
            partially_verified: 0,
            unverified: 0,
            floor: 0,
            geo_resolution: GeoResolution::None,
        }
    }
}

fn coarser(a: GeoResolution, b: GeoResolution) -> GeoResolution {
    fn rank(r: GeoResolution) -> u8 {
        match r {
            GeoResolution::Exact => 0,
            GeoResolution::City => 1,
            GeoResolution::Region => 2,
            GeoResolution::Country => 3,
            GeoResolution::None => 4,
        }
    }
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}

impl Cell {
    fn quality(&self) -> QualityClass {
        if self.unverified > 0 {
            QualityClass::Low
        } else if self.partially_verified > 0 {
            QualityClass::Medium
        } else {
            QualityClass::High
        }
    }

    fn merge_from(&mut self, other: &Cell) {
        self.count += other.count;
        self.verified += other.verified;
        self.partially_verified += other.partially_verified;
        self.unverified += other.unverified;
        self.floor = self.floor.max(other.floor);
        self.geo_resolution = coarser(self.geo_resolution, other.geo_resolution);
    }
}

struct Inner {
    cells: BTreeMap<CellKey, Cell>,
    seen_events: HashSet<(String, u32)>,
}

/// The privacy-safe facet index.
pub struct OdxStore {
    min_floor: u32,
    offset_minutes: i32,
    inner: RwLock<Inner>,
}

impl OdxStore {
    /// A store enforcing `min_floor` as the global k-anonymity minimum.
    pub fn new(min_floor: u32, offset_minutes: i32) -> Self {
        Self {
            min_floor,
            offset_minutes,
            inner: RwLock::new(Inner {
                cells: BTreeMap::new(),
                seen_events: HashSet::new(),
            }),
        }
    }

    /// Parses the `privacy:floor:k{n}` label into an effective floor.
    fn effective_floor(&self, labels: &LabelSet) -> u32 {
        let labeled = labels
            .labels
            .iter()
            .filter(|l| l.facet_key() == "privacy:floor")
            .filter_map(|l| l.value.strip_prefix('k').and_then(|v| v.parse::<u32>().ok()))
            .max()
            .unwrap_or(0);
        labeled.max(self.min_floor)
    }

    /// Ingests one labeled event into the index.
    ///
    /// Returns the number of facet cells updated; re-ingesting the same
    /// event under the same ontology version is a no-op.
    pub fn ingest(
        &self,
        event: &CanonicalEvent,
        labels: &LabelSet,
        features: &ExtractedFeatures,
    ) -> Result<usize, SafetyError> {
        let facets: BTreeSet<String> =
            labels.labels.iter().map(|l| l.facet_key()).collect();
        for facet in &facets {
            if privacy::contains_forbidden_word(facet) {
                return Err(SafetyError::OdxSafety(format!(
                    "Facet key '{}' contains a forbidden word",
                    facet
                )));
            }
        }

        let day_bucket = time_features::day_bucket(event.timestamp_ms, self.offset_minutes);
        let (geo_bucket, geo_resolution) = match (&event.geo, event.attributes.get("region_code")) {
            (Some(geo), Some(veil_types::event::AttributeValue::Text(code)))
                if geo.resolution != GeoResolution::Exact =>
            {
                (Some(code.clone()), geo.resolution)
            }
            _ => (None, GeoResolution::None),
        };
        if let Some(bucket) = &geo_bucket {
            if privacy::PRECISE_COORDINATE.is_match(bucket) {
                return Err(SafetyError::OdxSafety(format!(
                    "Geo bucket '{}' contains precise coordinates",
                    bucket
                )));
            }
        }

        let floor = self.effective_floor(labels);
        let mut inner = self.inner.write();
        if !inner
            .seen_events
            .insert((event.event_id.clone(), labels.ontology_version))
        {
            return Ok(0);
        }

        for facet in &facets {
            let key = CellKey {
                facet: facet.clone(),
                day_bucket: day_bucket.clone(),
                geo_bucket: geo_bucket.clone(),
                version: labels.ontology_version,
            };
            let cell = inner.cells.entry(key).or_default();
            cell.count += 1;
            match features.quality.verification {
                VerificationLevel::Verified => cell.verified += 1,
                VerificationLevel::PartiallyVerified => cell.partially_verified += 1,
                VerificationLevel::Unverified => cell.unverified += 1,
            }
            cell.floor = cell.floor.max(floor);
            cell.geo_resolution = coarser(cell.geo_resolution, geo_resolution);
        }
        Ok(facets.len())
    }

    fn rollup_bucket(day: &str, resolution: TimeResolution) -> Option<String> {
        match resolution {
            TimeResolution::Day => Some(day.to_string()),
            TimeResolution::Month => day.get(..7).map(str::to_string),
            TimeResolution::Year => day.get(..4).map(str::to_string),
            TimeResolution::Week => {
                let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
                let iso = date.iso_week();
                Some(format!("{}-W{:02}", iso.year(), iso.week()))
            }
        }
    }

    /// Queries the index at a time resolution, reporting only aggregates at
    /// or above their effective privacy floor. Below-floor cells stay
    /// withheld until further aggregation lifts them over it.
    pub fn query(
        &self,
        resolution: TimeResolution,
        window: Option<TimeWindow>,
    ) -> Vec<OdxEntry> {
        let inner = self.inner.read();

        let window_days = window.map(|w| {
            (
                time_features::day_bucket(w.start_ms, self.offset_minutes),
                time_features::day_bucket(w.end_ms, self.offset_minutes),
            )
        });

        let mut merged: BTreeMap<(String, String, Option<String>, u32), Cell> = BTreeMap::new();
        for (key, cell) in inner.cells.iter() {
            if let Some((start, end)) = &window_days {
                if key.day_bucket < *start || key.day_bucket > *end {
                    continue;
                }
            }
            let Some(bucket) = Self::rollup_bucket(&key.day_bucket, resolution) else {
                continue;
            };
            merged
                .entry((key.facet.clone(), bucket, key.geo_bucket.clone(), key.version))
                .or_default()
                .merge_from(cell);
        }

        let mut entries = Vec::new();
        for ((facet, bucket, geo, version), cell) in merged {
            if cell.count < u64::from(cell.floor.max(self.min_floor)) {
                continue;
            }
            match OdxEntry::new(
                facet,
                bucket,
                geo,
                cell.count,
                cell.quality(),
                cell.floor.max(self.min_floor),
                cell.geo_resolution,
                resolution,
                version,
            ) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "dropped unsafe aggregate from query"),
            }
        }
        entries
    }

    /// Queries entries whose facet key is named by `selected` label keys
    /// (either the facet itself or any `facet:value` label under it).
    pub fn query_selected(
        &self,
        selected: &BTreeSet<String>,
        resolution: TimeResolution,
        window: Option<TimeWindow>,
    ) -> Vec<OdxEntry> {
        self.query(resolution, window)
            .into_iter()
            .filter(|entry| {
                selected.iter().any(|label| {
                    label == &entry.facet_key || label.starts_with(&format!("{}:", entry.facet_key))
                })
            })
            .collect()
    }

    /// Drops every cell; used on ontology/schema rebuilds.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.cells.clear();
        inner.seen_events.clear();
    }

    /// Number of day-granularity cells currently held.
    pub fn cell_count(&self) -> usize {
        self.inner.read().cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features;
    use crate::labeler::ontology::Ontology;
    use crate::labeler::Labeler;
    use std::sync::Arc;
    use veil_test_utils::fixtures;

    fn ingest_n(store: &OdxStore, n: usize) {
        let labeler = Labeler::new(Arc::new(Ontology::v1()));
        for i in 0..n {
            let event = fixtures::activity_event(&format!("run-{}", i));
            let feats = features::extract(&event, 0);
            let labels = labeler.label(&event, &feats);
            store.ingest(&event, &labels, &feats).unwrap();
        }
    }

    #[test]
    fn below_floor_aggregates_are_withheld() {
        let store = OdxStore::new(5, 0);
        ingest_n(&store, 3);
        assert!(store.query(TimeResolution::Day, None).is_empty());
        ingest_n(&store, 3); // idempotent: same event ids, still 3 events
        assert!(store.query(TimeResolution::Day, None).is_empty());
    }

    #[test]
    fn floor_is_reached_by_aggregation() {
        let store = OdxStore::new(5, 0);
        ingest_n(&store, 6);
        let entries = store.query(TimeResolution::Day, None);
        assert!(!entries.is_empty());
        let activity = entries
            .iter()
            .find(|e| e.facet_key == "domain:activity")
            .unwrap();
        assert_eq!(activity.count, 6);
        assert!(activity.count >= u64::from(activity.privacy_floor));
    }

    #[test]
    fn reingesting_the_same_event_is_idempotent() {
        let store = OdxStore::new(1, 0);
        let labeler = Labeler::new(Arc::new(Ontology::v1()));
        let event = fixtures::activity_event("run-1");
        let feats = features::extract(&event, 0);
        let labels = labeler.label(&event, &feats);

        assert!(store.ingest(&event, &labels, &feats).unwrap() > 0);
        assert_eq!(store.ingest(&event, &labels, &feats).unwrap(), 0);

        // Five more distinct events clear the labeled k5 floor; the
        // duplicate above must not have inflated the aggregate.
        ingest_n(&store, 6);
        let entries = store.query(TimeResolution::Day, None);
        let activity = entries
            .iter()
            .find(|e| e.facet_key == "domain:activity")
            .unwrap();
        assert_eq!(activity.count, 6);
    }

    #[test]
    fn rollup_merges_day_cells() {
        let store = OdxStore::new(1, 0);
        ingest_n(&store, 6);
        let day = store.query(TimeResolution::Day, None);
        let month = store.query(TimeResolution::Month, None);
        let day_total: u64 = day
            .iter()
            .filter(|e| e.facet_key == "domain:activity")
            .map(|e| e.count)
            .sum();
        let month_total: u64 = month
            .iter()
            .filter(|e| e.facet_key == "domain:activity")
            .map(|e| e.count)
            .sum();
        assert_eq!(day_total, month_total);
        assert!(month
            .iter()
            .all(|e| veil_types::privacy::COARSE_TIME_BUCKET.is_match(&e.time_bucket)));
    }

    #[test]
    fn selection_filters_facets() {
        let store = OdxStore::new(1, 0);
        ingest_n(&store, 6);
        let selected: BTreeSet<String> = ["domain:activity".to_string()].into();
        let entries = store.query_selected(&selected, TimeResolution::Day, None);
        assert!(!entries.is_empty());
        assert!(entries.iter().all(|e| e.facet_key == "domain:activity"));
    }
}
