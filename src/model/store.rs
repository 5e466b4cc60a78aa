//! Model artifact persistence
//!
//! Layout of a model directory:
//! - `imec_s3_<CLASS>.json`: one model per canonical class
//! - `le_<column>.json`: one label encoder per encoded feature column
//! - `model_metadata.json`: version, classes, features and per-class metrics
//!
//! Each file is written to a temporary sibling and renamed into place.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::trainer::{TrainedClassModel, TrainingReport};
use crate::data::dataset::LabelEncoder;
use crate::data::taxonomy::CanonicalClass;

/// Artifact format version written into the metadata
pub const MODEL_VERSION: &str = "1.2";
const METADATA_FILE: &str = "model_metadata.json";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid artifact {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Metadata record written next to the artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: String,
    pub classes: Vec<String>,
    pub features: Vec<String>,
    /// Held-out R² per class; fallback classes are absent
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub fallback_classes: Vec<String>,
    #[serde(default)]
    pub trained_at: Option<String>,
}

impl ModelMetadata {
    pub fn from_report(report: &TrainingReport) -> Self {
        Self {
            version: MODEL_VERSION.to_string(),
            classes: CanonicalClass::ALL.iter().map(|c| c.to_string()).collect(),
            features: report.feature_names.clone(),
            metrics: report.metrics(),
            fallback_classes: report
                .fallback_classes()
                .iter()
                .map(|c| c.to_string())
                .collect(),
            trained_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// Read-only set of loaded artifacts, shared by all requests
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<CanonicalClass, TrainedClassModel>,
    encoders: BTreeMap<String, LabelEncoder>,
    metadata: Option<ModelMetadata>,
}

impl ModelRegistry {
    /// Registry with no artifacts; every class uses the heuristic path
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_parts(
        models: Vec<TrainedClassModel>,
        encoders: BTreeMap<String, LabelEncoder>,
        metadata: Option<ModelMetadata>,
    ) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.class, m)).collect(),
            encoders,
            metadata,
        }
    }

    pub fn model(&self, class: CanonicalClass) -> Option<&TrainedClassModel> {
        self.models.get(&class)
    }

    /// Model usable for scoring: present and not a fallback
    pub fn scoring_model(&self, class: CanonicalClass) -> Option<&TrainedClassModel> {
        self.model(class).filter(|m| !m.is_fallback())
    }

    pub fn encoder(&self, column: &str) -> Option<&LabelEncoder> {
        self.encoders.get(column)
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }

    /// Loaded classes in canonical order
    pub fn loaded_classes(&self) -> Vec<CanonicalClass> {
        CanonicalClass::ALL
            .into_iter()
            .filter(|c| self.models.contains_key(c))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Reads and writes artifacts under one directory
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn model_path(&self, class: CanonicalClass) -> PathBuf {
        self.dir.join(format!("imec_s3_{}.json", class))
    }

    pub fn encoder_path(&self, column: &str) -> PathBuf {
        self.dir.join(format!("le_{}.json", column))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Persist every artifact of a training run, then the metadata
    pub fn save(&self, report: &TrainingReport) -> Result<ModelMetadata, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        for (column, encoder) in &report.encoders {
            write_json(&self.encoder_path(column), encoder)?;
        }
        for model in &report.models {
            let path = self.model_path(model.class);
            write_json(&path, model)?;
            info!("Saved {} model to {:?}", model.class, path);
        }

        let metadata = ModelMetadata::from_report(report);
        write_json(&self.metadata_path(), &metadata)?;
        Ok(metadata)
    }

    pub fn load_metadata(&self) -> Result<ModelMetadata, StoreError> {
        read_json(&self.metadata_path())
    }

    /// Load whatever artifacts exist
    ///
    /// Missing, unreadable or structurally broken files are logged and skipped; the
    /// registry may be empty.
    pub fn load(&self) -> ModelRegistry {
        if !self.dir.is_dir() {
            warn!("Model directory {:?} not found, using heuristics only", self.dir);
            return ModelRegistry::empty();
        }

        let metadata = match self.load_metadata() {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("No usable model metadata: {}", e);
                None
            }
        };

        let mut models = Vec::new();
        for class in CanonicalClass::ALL {
            let path = self.model_path(class);
            if !path.exists() {
                continue;
            }
            match read_json::<TrainedClassModel>(&path) {
                Ok(model) if model.class == class => match model.model.validate() {
                    Ok(()) => {
                        info!("Loaded model for {}", class);
                        models.push(model);
                    }
                    Err(e) => warn!("Skipping malformed model {:?}: {}", path, e),
                },
                Ok(model) => warn!(
                    "Model file {:?} holds class {}, expected {}; skipping",
                    path, model.class, class
                ),
                Err(e) => warn!("Skipping model for {}: {}", class, e),
            }
        }

        let columns: Vec<String> = metadata
            .as_ref()
            .map(|m| m.features.clone())
            .unwrap_or_default();
        let mut encoders = BTreeMap::new();
        for column in columns {
            let path = self.encoder_path(&column);
            if !path.exists() {
                continue;
            }
            match read_json::<LabelEncoder>(&path) {
                Ok(encoder) => {
                    encoders.insert(column, encoder);
                }
                Err(e) => warn!("Skipping encoder {}: {}", column, e),
            }
        }

        ModelRegistry::from_parts(models, encoders, metadata)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{ClassTable, TrainingSet};
    use crate::model::trainer::Trainer;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("imec-store-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn report() -> TrainingReport {
        let mut tables: BTreeMap<CanonicalClass, ClassTable> = CanonicalClass::ALL
            .into_iter()
            .map(|c| (c, ClassTable::default()))
            .collect();
        tables.insert(
            CanonicalClass::Gtp,
            ClassTable {
                features: (1..=20).map(|g| vec![g as f64, (g % 4) as f64]).collect(),
                labels: (1..=20).map(|g| g as f64).collect(),
            },
        );
        tables.insert(
            CanonicalClass::Gtd,
            ClassTable {
                features: (1..=5).map(|g| vec![g as f64, 0.0]).collect(),
                labels: (1..=5).map(|g| g as f64).collect(),
            },
        );

        let mut encoders = BTreeMap::new();
        encoders.insert("team".to_string(), LabelEncoder::fit(["Penske", "Ganassi"]));

        let set = TrainingSet {
            feature_names: vec!["grid".to_string(), "team".to_string()],
            encoders,
            tables,
            dropped_rows: 0,
            synthesized_grid_rows: 0,
        };
        Trainer::with_defaults().train_all(&set)
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = temp_dir("roundtrip");
        let store = ModelStore::new(&dir);
        let report = report();

        let saved = store.save(&report).unwrap();
        assert_eq!(saved.version, "1.2");
        assert_eq!(saved.classes, vec!["GTP", "LMP2", "GTD_PRO", "GTD"]);
        assert_eq!(saved.features, vec!["grid", "team"]);
        assert!(saved.metrics.contains_key("GTP"));
        assert!(!saved.metrics.contains_key("GTD"));
        assert!(saved.fallback_classes.contains(&"GTD".to_string()));

        assert!(store.model_path(CanonicalClass::Gtp).exists());
        assert!(store.encoder_path("team").exists());

        let registry = store.load();
        assert_eq!(registry.loaded_classes().len(), 4);
        let loaded_meta = registry.metadata().unwrap();
        assert_eq!(loaded_meta.classes, saved.classes);
        assert_eq!(loaded_meta.fallback_classes, saved.fallback_classes);
        assert_eq!(loaded_meta.trained_at, saved.trained_at);
        assert!((loaded_meta.metrics["GTP"] - saved.metrics["GTP"]).abs() < 1e-9);
        assert_eq!(registry.encoder("team"), report.encoders.get("team"));

        let original = report.models.iter().find(|m| m.class == CanonicalClass::Gtp).unwrap();
        let loaded = registry.model(CanonicalClass::Gtp).unwrap();
        let x = [7.0, 3.0];
        assert!((original.predict(&x) - loaded.predict(&x)).abs() < 1e-9);

        assert!(registry.scoring_model(CanonicalClass::Gtp).is_some());
        assert!(registry.scoring_model(CanonicalClass::Gtd).is_none());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_dir_is_empty() {
        let registry = ModelStore::new(temp_dir("missing")).load();
        assert!(registry.is_empty());
        assert!(registry.metadata().is_none());
    }

    #[test]
    fn test_corrupt_model_is_skipped() {
        let dir = temp_dir("corrupt");
        let store = ModelStore::new(&dir);
        store.save(&report()).unwrap();
        fs::write(store.model_path(CanonicalClass::Lmp2), b"{not json").unwrap();

        let registry = store.load();
        assert!(registry.model(CanonicalClass::Lmp2).is_none());
        assert!(registry.model(CanonicalClass::Gtp).is_some());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_malformed_trees_are_skipped() {
        let dir = temp_dir("malformed");
        let store = ModelStore::new(&dir);
        store.save(&report()).unwrap();

        let path = store.model_path(CanonicalClass::Gtp);
        let mut artifact: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        artifact["model"]["trees"] = serde_json::json!([{"nodes": []}]);
        fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        let path = store.model_path(CanonicalClass::Lmp2);
        let mut artifact: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        artifact["model"]["trees"] = serde_json::json!([{"nodes": [
            {"kind": "split", "feature": 0, "threshold": 1.0, "left": 0, "right": 0}
        ]}]);
        fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        let registry = store.load();
        assert!(registry.model(CanonicalClass::Gtp).is_none());
        assert!(registry.model(CanonicalClass::Lmp2).is_none());
        assert!(registry.model(CanonicalClass::GtdPro).is_some());
        assert!(registry.scoring_model(CanonicalClass::Gtp).is_none());

        fs::remove_dir_all(&dir).unwrap();
    }
}
