// Path: crates/index/src/labeler/ontology.rs
//! Ontology versioning: which `(namespace, category)` pairs are valid, and
//! for some categories the closed set of values.
//!
//! The ontology is copy-on-write: the labeler holds an `Arc` snapshot, so
//! readers always see a consistent version while a new one is installed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use veil_types::label::{Label, LabelNamespace, LabelSet};

/// Ontology lookup and migration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OntologyError {
    /// Migrating to a lower version is not supported.
    #[error("ontology downgrade from {from} to {to} is unsupported")]
    DowngradeUnsupported {
        /// Version the label set is at.
        from: u32,
        /// Requested target version.
        to: u32,
    },
}

/// One ontology version: the valid `(namespace, category)` pairs, each with
/// an optional closed value set.
#[derive(Debug, Clone)]
pub struct Ontology {
    version: u32,
    valid: BTreeMap<(LabelNamespace, String), Option<BTreeSet<String>>>,
}

impl Ontology {
    /// An empty ontology at `version`.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            valid: BTreeMap::new(),
        }
    }

    /// The ontology version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Registers a category with an open value set.
    pub fn allow_open(mut self, namespace: LabelNamespace, category: &str) -> Self {
        self.valid.insert((namespace, category.to_string()), None);
        self
    }

    /// Registers a category with a closed value set.
    pub fn allow_closed<const N: usize>(
        mut self,
        namespace: LabelNamespace,
        category: &str,
        values: [&str; N],
    ) -> Self {
        self.valid.insert(
            (namespace, category.to_string()),
            Some(values.iter().map(|v| v.to_string()).collect()),
        );
        self
    }

    /// True when the label's pair (and, for closed categories, its value)
    /// exists in this version.
    pub fn allows(&self, label: &Label) -> bool {
        match self.valid.get(&(label.namespace, label.category.clone())) {
            None => false,
            Some(None) => true,
            Some(Some(values)) => values.contains(&label.value),
        }
    }

    /// The current production ontology, version 1.
    pub fn v1() -> Self {
        let mut ontology = Ontology::new(1);
        for category in [
            "activity",
            "location",
            "communication",
            "media",
            "transaction",
            "social",
            "health",
            "device",
            "travel",
            "content",
            "other",
        ] {
            ontology = ontology.allow_open(LabelNamespace::Domain, category);
        }
        ontology
            .allow_closed(
                LabelNamespace::Time,
                "period",
                ["morning", "afternoon", "evening", "night"],
            )
            .allow_closed(LabelNamespace::Time, "day_type", ["weekday", "weekend"])
            .allow_closed(
                LabelNamespace::Time,
                "season",
                ["winter", "spring", "summer", "autumn"],
            )
            .allow_open(LabelNamespace::Geo, "type")
            .allow_closed(
                LabelNamespace::Geo,
                "resolution",
                ["city", "region", "country"],
            )
            .allow_closed(
                LabelNamespace::Quality,
                "source",
                ["connector", "import", "manual"],
            )
            .allow_closed(
                LabelNamespace::Quality,
                "verification",
                ["verified", "partially_verified", "unverified"],
            )
            .allow_closed(
                LabelNamespace::Quality,
                "completeness",
                ["high", "medium", "low"],
            )
            .allow_closed(LabelNamespace::Privacy, "sensitivity", ["high", "normal"])
            .allow_open(LabelNamespace::Privacy, "floor")
            .allow_closed(LabelNamespace::Privacy, "pii", ["clear", "flagged"])
            .allow_closed(
                LabelNamespace::Source,
                "channel",
                ["connector", "import", "manual"],
            )
            .allow_open(LabelNamespace::Behavior, "pattern")
    }
}

/// A registered migration function between two adjacent versions.
pub type MigrationFn = Box<dyn Fn(LabelSet) -> LabelSet + Send + Sync>;

/// Holds registered forward migrations between ontology versions.
///
/// Unregistered paths are the identity; downgrades are rejected.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: HashMap<(u32, u32), MigrationFn>,
}

impl MigrationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a forward migration from `from` to `to`.
    pub fn register(&mut self, from: u32, to: u32, f: MigrationFn) {
        self.migrations.insert((from, to), f);
    }

    /// Migrates a label set to `target` version.
    pub fn migrate(&self, set: LabelSet, target: u32) -> Result<LabelSet, OntologyError> {
        let from = set.ontology_version;
        if target < from {
            return Err(OntologyError::DowngradeUnsupported { from, to: target });
        }
        if target == from {
            return Ok(set);
        }
        let mut migrated = match self.migrations.get(&(from, target)) {
            Some(f) => f(set),
            None => set,
        };
        migrated.ontology_version = target;
        Ok(migrated)
    }
}
