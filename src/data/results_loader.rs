//! Historical race results loading
//!
//! Walks `<raw_dir>/<year>/<event>/*race-results.csv`, reconciles column naming across
//! seasons and writes the concatenated table once as the processed dataset.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::taxonomy::canonicalize_historical;

/// Suffix identifying a race results export inside an event directory
const RESULTS_FILE_SUFFIX: &str = "race-results.csv";
/// Class used when an export has no class information
pub const UNKNOWN_CLASS: &str = "Unknown";

/// Data loading errors
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Raw data directory not found: {0}")]
    MissingRawDir(PathBuf),

    #[error("Processed dataset is missing column: {0}")]
    MissingColumn(String),
}

/// Loader settings
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Season directories to scan, in order
    pub years: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            years: ["2021", "2022", "2023", "2024"]
                .iter()
                .map(|y| y.to_string())
                .collect(),
        }
    }
}

/// One row of one event's results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalResultRecord {
    pub year: String,
    pub event: String,
    pub position: Option<i64>,
    pub number: Option<String>,
    pub class: Option<String>,
    pub standard_class: String,
    pub team: Option<String>,
    pub vehicle: Option<String>,
    pub grid: Option<i64>,
    pub best_lap: Option<String>,
}

/// Canonical column name -> accepted spellings after lower-casing and trimming
const COLUMN_ALIASES: [(&str, &[&str]); 7] = [
    ("position", &["position", "pos"]),
    ("number", &["number", "no", "#"]),
    ("class", &["class"]),
    ("team", &["team"]),
    ("vehicle", &["vehicle", "car"]),
    ("grid", &["grid", "grid_position", "start", "starting position"]),
    ("best_lap", &["best_lap", "best lap"]),
];

/// Normalize a raw header the way every season's export is reconciled
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Parse a position-like cell, returning None for DNF/blank/garbage
pub fn parse_position(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    cell.parse::<i64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

/// Loads historical results from the raw directory tree
pub struct ResultsLoader {
    raw_dir: PathBuf,
    config: LoaderConfig,
}

impl ResultsLoader {
    pub fn new<P: AsRef<Path>>(raw_dir: P, config: LoaderConfig) -> Self {
        Self {
            raw_dir: raw_dir.as_ref().to_path_buf(),
            config,
        }
    }

    /// Load every event of every configured season
    ///
    /// Seasons or events without a results export are skipped.
    pub fn load(&self) -> Result<Vec<HistoricalResultRecord>, DataError> {
        if !self.raw_dir.is_dir() {
            return Err(DataError::MissingRawDir(self.raw_dir.clone()));
        }

        info!("Loading data from {:?}", self.raw_dir);
        let mut records = Vec::new();

        for year in &self.config.years {
            let year_dir = self.raw_dir.join(year);
            if !year_dir.is_dir() {
                debug!("Season {} not present, skipping", year);
                continue;
            }

            info!("Processing {}...", year);
            for event_dir in sorted_subdirs(&year_dir)? {
                let Some(results_file) = find_results_file(&event_dir)? else {
                    continue;
                };
                let event = event_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();

                match load_results_csv(&results_file, year, &event) {
                    Ok(mut rows) => {
                        debug!("{} rows from {:?}", rows.len(), results_file);
                        records.append(&mut rows);
                    }
                    Err(e) => warn!("Skipping {:?}: {}", results_file, e),
                }
            }
        }

        info!("Loaded {} historical result rows", records.len());
        Ok(records)
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn find_results_file(event_dir: &Path) -> Result<Option<PathBuf>, DataError> {
    let mut files: Vec<PathBuf> = fs::read_dir(event_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().ends_with(RESULTS_FILE_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files.into_iter().next())
}

/// Read one results export; every column is read as text and coerced per field
pub fn load_results_csv(
    csv_path: &Path,
    year: &str,
    event: &str,
) -> Result<Vec<HistoricalResultRecord>, DataError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(csv_path.to_path_buf()))?
        .finish()?;

    Ok(dataframe_to_records(&df, year, event)?)
}

/// Map canonical column names onto the frame's actual column names
fn resolve_columns(df: &DataFrame) -> HashMap<&'static str, String> {
    let normalized: HashMap<String, String> = df
        .get_column_names()
        .into_iter()
        .map(|name| (normalize_column_name(name.as_str()), name.to_string()))
        .collect();

    COLUMN_ALIASES
        .iter()
        .filter_map(|(canonical, aliases)| {
            aliases
                .iter()
                .find_map(|alias| normalized.get(*alias))
                .map(|actual| (*canonical, actual.clone()))
        })
        .collect()
}

fn text_column(df: &DataFrame, name: Option<&String>) -> PolarsResult<Vec<Option<String>>> {
    let Some(name) = name else {
        return Ok(vec![None; df.height()]);
    };
    let column = df.column(name.as_str())?.cast(&DataType::String)?;
    let values = column.str()?;

    Ok(values
        .into_iter()
        .map(|v| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
        .collect())
}

fn dataframe_to_records(
    df: &DataFrame,
    year: &str,
    event: &str,
) -> PolarsResult<Vec<HistoricalResultRecord>> {
    let columns = resolve_columns(df);

    let positions = text_column(df, columns.get("position"))?;
    let numbers = text_column(df, columns.get("number"))?;
    let classes = text_column(df, columns.get("class"))?;
    let teams = text_column(df, columns.get("team"))?;
    let vehicles = text_column(df, columns.get("vehicle"))?;
    let grids = text_column(df, columns.get("grid"))?;
    let best_laps = text_column(df, columns.get("best_lap"))?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let class = classes[i].clone();
        let standard_class = class
            .as_deref()
            .map(canonicalize_historical)
            .unwrap_or_else(|| UNKNOWN_CLASS.to_string());

        records.push(HistoricalResultRecord {
            year: year.to_string(),
            event: event.to_string(),
            position: positions[i].as_deref().and_then(parse_position),
            number: numbers[i].clone(),
            class,
            standard_class,
            team: teams[i].clone(),
            vehicle: vehicles[i].clone(),
            grid: grids[i].as_deref().and_then(parse_position),
            best_lap: best_laps[i].clone(),
        });
    }

    Ok(records)
}

/// Write the processed dataset as parquet
pub fn save_processed<P: AsRef<Path>>(
    records: &[HistoricalResultRecord],
    path: P,
) -> Result<(), DataError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut df = df!(
        "year" => records.iter().map(|r| r.year.clone()).collect::<Vec<_>>(),
        "event" => records.iter().map(|r| r.event.clone()).collect::<Vec<_>>(),
        "position" => records.iter().map(|r| r.position).collect::<Vec<_>>(),
        "number" => records.iter().map(|r| r.number.clone()).collect::<Vec<_>>(),
        "class" => records.iter().map(|r| r.class.clone()).collect::<Vec<_>>(),
        "standard_class" => records.iter().map(|r| r.standard_class.clone()).collect::<Vec<_>>(),
        "team" => records.iter().map(|r| r.team.clone()).collect::<Vec<_>>(),
        "vehicle" => records.iter().map(|r| r.vehicle.clone()).collect::<Vec<_>>(),
        "grid" => records.iter().map(|r| r.grid).collect::<Vec<_>>(),
        "best_lap" => records.iter().map(|r| r.best_lap.clone()).collect::<Vec<_>>()
    )?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = File::create(&tmp_path)?;
    ParquetWriter::new(file).finish(&mut df)?;
    fs::rename(&tmp_path, path)?;

    info!("Saved {} records to {:?}", records.len(), path);
    Ok(())
}

/// Read the processed dataset written by [`save_processed`]
pub fn load_processed<P: AsRef<Path>>(path: P) -> Result<Vec<HistoricalResultRecord>, DataError> {
    let file = File::open(path.as_ref())?;
    let df = ParquetReader::new(file).finish()?;

    let text = |name: &str| -> Result<Vec<Option<String>>, DataError> {
        let column = df
            .column(name)
            .map_err(|_| DataError::MissingColumn(name.to_string()))?;
        Ok(column
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect())
    };
    let int = |name: &str| -> Result<Vec<Option<i64>>, DataError> {
        let column = df
            .column(name)
            .map_err(|_| DataError::MissingColumn(name.to_string()))?;
        Ok(column.i64()?.into_iter().collect())
    };

    let years = text("year")?;
    let events = text("event")?;
    let positions = int("position")?;
    let numbers = text("number")?;
    let classes = text("class")?;
    let standard_classes = text("standard_class")?;
    let teams = text("team")?;
    let vehicles = text("vehicle")?;
    let grids = int("grid")?;
    let best_laps = text("best_lap")?;

    let records = (0..df.height())
        .map(|i| HistoricalResultRecord {
            year: years[i].clone().unwrap_or_default(),
            event: events[i].clone().unwrap_or_default(),
            position: positions[i],
            number: numbers[i].clone(),
            class: classes[i].clone(),
            standard_class: standard_classes[i]
                .clone()
                .unwrap_or_else(|| UNKNOWN_CLASS.to_string()),
            team: teams[i].clone(),
            vehicle: vehicles[i].clone(),
            grid: grids[i],
            best_lap: best_laps[i].clone(),
        })
        .collect();

    Ok(records)
}
