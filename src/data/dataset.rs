//! Training table construction
//!
//! Turns the processed historical results into one feature/label table per canonical
//! class. Features: grid position plus label-encoded team and vehicle; label: finishing
//! position.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::normalizer::{DEFAULT_TEAM, DEFAULT_VEHICLE};
use super::results_loader::HistoricalResultRecord;
use super::taxonomy::CanonicalClass;

pub const GRID_FEATURE: &str = "grid";
pub const TEAM_FEATURE: &str = "team";
pub const VEHICLE_FEATURE: &str = "vehicle";

/// Bound of the random offset used when a row has no grid position
pub const SYNTHETIC_GRID_JITTER: i64 = 2;

/// Maps category labels to integer indices (sorted label order)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on the given labels; duplicates are collapsed and the result sorted
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(|s| s.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Index of a known label
    pub fn transform(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    /// Encode for model input; unseen labels map one past the last known index
    pub fn encode(&self, label: &str) -> f64 {
        self.transform(label).unwrap_or(self.classes.len()) as f64
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Feature rows and labels for one class
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl ClassTable {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Output of the dataset builder
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub feature_names: Vec<String>,
    pub encoders: BTreeMap<String, LabelEncoder>,
    /// Every canonical class is present, possibly with an empty table
    pub tables: BTreeMap<CanonicalClass, ClassTable>,
    /// Rows dropped for lacking a numeric finishing position
    pub dropped_rows: usize,
    /// Rows whose grid feature was synthesized from the finishing position
    pub synthesized_grid_rows: usize,
}

impl TrainingSet {
    pub fn table(&self, class: CanonicalClass) -> Option<&ClassTable> {
        self.tables.get(&class)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(ClassTable::len).sum()
    }
}

/// Build the per-class training tables
///
/// Rows without an explicit grid get `position + U{-2..=2}`; those labels carry noise.
/// `rng` drives only that synthesis.
pub fn build_training_table<R: Rng + ?Sized>(
    records: &[HistoricalResultRecord],
    rng: &mut R,
) -> TrainingSet {
    let usable: Vec<(&HistoricalResultRecord, i64)> = records
        .iter()
        .filter_map(|r| r.position.map(|p| (r, p)))
        .collect();
    let dropped_rows = records.len() - usable.len();
    if dropped_rows > 0 {
        warn!("Dropped {} rows without a numeric position", dropped_rows);
    }

    let mut feature_names = vec![GRID_FEATURE.to_string()];
    let mut encoders = BTreeMap::new();

    if usable.iter().any(|(r, _)| r.team.is_some()) {
        encoders.insert(
            TEAM_FEATURE.to_string(),
            LabelEncoder::fit(usable.iter().map(|(r, _)| team_of(*r))),
        );
        feature_names.push(TEAM_FEATURE.to_string());
    }
    if usable.iter().any(|(r, _)| r.vehicle.is_some()) {
        encoders.insert(
            VEHICLE_FEATURE.to_string(),
            LabelEncoder::fit(usable.iter().map(|(r, _)| vehicle_of(*r))),
        );
        feature_names.push(VEHICLE_FEATURE.to_string());
    }

    let mut tables: BTreeMap<CanonicalClass, ClassTable> = CanonicalClass::ALL
        .into_iter()
        .map(|c| (c, ClassTable::default()))
        .collect();
    let mut synthesized_grid_rows = 0;

    for (record, position) in usable {
        let grid = match record.grid {
            Some(grid) => grid,
            None => {
                synthesized_grid_rows += 1;
                position + rng.random_range(-SYNTHETIC_GRID_JITTER..=SYNTHETIC_GRID_JITTER)
            }
        };

        let Some(class) = CanonicalClass::from_tag(&record.standard_class) else {
            continue;
        };

        let mut row = vec![grid as f64];
        if let Some(encoder) = encoders.get(TEAM_FEATURE) {
            row.push(encoder.encode(&team_of(record)));
        }
        if let Some(encoder) = encoders.get(VEHICLE_FEATURE) {
            row.push(encoder.encode(&vehicle_of(record)));
        }

        let table = tables.entry(class).or_default();
        table.features.push(row);
        table.labels.push(position as f64);
    }

    if synthesized_grid_rows > 0 {
        warn!(
            "Synthesized grid positions for {} rows; labels for these rows are noisy",
            synthesized_grid_rows
        );
    }
    for (class, table) in &tables {
        info!("Training table {}: {} rows", class, table.len());
    }

    TrainingSet {
        feature_names,
        encoders,
        tables,
        dropped_rows,
        synthesized_grid_rows,
    }
}

fn team_of(record: &HistoricalResultRecord) -> String {
    record.team.clone().unwrap_or_else(|| DEFAULT_TEAM.to_string())
}

fn vehicle_of(record: &HistoricalResultRecord) -> String {
    record.vehicle.clone().unwrap_or_else(|| DEFAULT_VEHICLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    fn record(class: &str, position: Option<i64>, grid: Option<i64>, team: Option<&str>) -> HistoricalResultRecord {
        HistoricalResultRecord {
            year: "2023".to_string(),
            event: "daytona".to_string(),
            position,
            number: Some("1".to_string()),
            class: Some(class.to_string()),
            standard_class: class.to_string(),
            team: team.map(|t| t.to_string()),
            vehicle: None,
            grid,
            best_lap: None,
        }
    }

    #[test]
    fn test_label_encoder_sorted() {
        let encoder = LabelEncoder::fit(["Wayne Taylor", "Action Express", "Wayne Taylor", "Ganassi"]);
        assert_eq!(encoder.classes(), ["Action Express", "Ganassi", "Wayne Taylor"]);
        assert_eq!(encoder.transform("Ganassi"), Some(1));
        assert_eq!(encoder.transform("Penske"), None);
        assert_eq!(encoder.encode("Penske"), 3.0);
        assert_eq!(encoder.len(), 3);
    }

    #[test]
    fn test_drops_rows_without_position() {
        let records = vec![
            record("GTP", Some(1), Some(1), None),
            record("GTP", None, Some(2), None),
        ];
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        let set = build_training_table(&records, &mut rng);

        assert_eq!(set.dropped_rows, 1);
        assert_eq!(set.table(CanonicalClass::Gtp).unwrap().len(), 1);
        assert_eq!(set.feature_names, vec!["grid"]);
    }

    #[test]
    fn test_synthesized_grid_is_bounded() {
        let records: Vec<_> = (1..=50).map(|p| record("GTD", Some(p), None, None)).collect();
        let mut rng = Pcg64Mcg::seed_from_u64(42);
        let set = build_training_table(&records, &mut rng);

        assert_eq!(set.synthesized_grid_rows, 50);
        let table = set.table(CanonicalClass::Gtd).unwrap();
        for (row, label) in table.features.iter().zip(&table.labels) {
            assert!((row[0] - label).abs() <= 2.0);
        }
    }

    #[test]
    fn test_explicit_grid_is_kept() {
        let records = vec![record("LMP2", Some(4), Some(9), None)];
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        let set = build_training_table(&records, &mut rng);

        assert_eq!(set.synthesized_grid_rows, 0);
        assert_eq!(set.table(CanonicalClass::Lmp2).unwrap().features[0], vec![9.0]);
    }

    #[test]
    fn test_partitions_and_encodes() {
        let records = vec![
            record("GTP", Some(1), Some(1), Some("Penske")),
            record("GTD_PRO", Some(2), Some(2), Some("Corvette")),
            record("GTD", Some(3), Some(3), None),
            record("Unknown", Some(4), Some(4), Some("Mystery")),
        ];
        let mut rng = Pcg64Mcg::seed_from_u64(3);
        let set = build_training_table(&records, &mut rng);

        assert_eq!(set.feature_names, vec!["grid", "team"]);
        assert_eq!(set.tables.len(), 4);
        assert_eq!(set.total_rows(), 3);

        let team = &set.encoders["team"];
        // missing team encodes as the normalizer default
        assert!(team.transform(DEFAULT_TEAM).is_some());

        let gtp = set.table(CanonicalClass::Gtp).unwrap();
        assert_eq!(gtp.features[0][1], team.encode("Penske"));
        assert!(set.table(CanonicalClass::Lmp2).unwrap().is_empty());
    }
}
