//! Per-class model training
//!
//! Each canonical class is trained independently. Classes below the sample threshold get
//! a fallback model fit on random data so that an artifact of the right shape exists; it
//! is flagged and carries no metric.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info, warn};

use super::gbdt::{GbdtParams, GradientBoostedRegressor};
use super::metrics::{calculate_metrics, EvaluationMetrics};
use crate::data::dataset::{ClassTable, LabelEncoder, TrainingSet};
use crate::data::taxonomy::CanonicalClass;

/// Training errors for a single class
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No feature columns defined")]
    NoFeatures,

    #[error("Row {row} has {actual} features, expected {expected}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{features} feature rows but {labels} labels")]
    LabelCountMismatch { features: usize, labels: usize },

    #[error("Non-finite value in row {0}")]
    NonFinite(usize),

    #[error("No training table for class {0}")]
    MissingTable(CanonicalClass),
}

/// Whether an artifact came from real data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Trained,
    /// Fit on synthetic data; predictions carry no meaning
    Fallback,
}

/// Trainer settings
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Minimum rows for a real fit
    pub min_samples: usize,
    pub test_size: f64,
    pub seed: u64,
    pub params: GbdtParams,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            test_size: 0.2,
            seed: 42,
            params: GbdtParams::default(),
        }
    }
}

/// Regressor for one class plus what inference needs to feed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedClassModel {
    pub class: CanonicalClass,
    pub kind: ModelKind,
    pub feature_names: Vec<String>,
    pub model: GradientBoostedRegressor,
    /// Held-out R², absent for fallback models
    pub metric: Option<f64>,
    pub evaluation: Option<EvaluationMetrics>,
    pub training_samples: usize,
}

impl TrainedClassModel {
    pub fn is_fallback(&self) -> bool {
        self.kind == ModelKind::Fallback
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        self.model.predict(features)
    }
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub feature_names: Vec<String>,
    pub encoders: BTreeMap<String, LabelEncoder>,
    pub models: Vec<TrainedClassModel>,
    pub failures: Vec<(CanonicalClass, String)>,
}

impl TrainingReport {
    /// Per-class R² for classes fit on real data
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        self.models
            .iter()
            .filter_map(|m| m.metric.map(|r2| (m.class.to_string(), r2)))
            .collect()
    }

    pub fn fallback_classes(&self) -> Vec<CanonicalClass> {
        self.models
            .iter()
            .filter(|m| m.is_fallback())
            .map(|m| m.class)
            .collect()
    }
}

/// Fits one regressor per canonical class
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(TrainerConfig::default())
    }

    /// Train every canonical class; a failing class is reported and the rest continue
    pub fn train_all(&self, set: &TrainingSet) -> TrainingReport {
        let mut models = Vec::with_capacity(CanonicalClass::ALL.len());
        let mut failures = Vec::new();

        for class in CanonicalClass::ALL {
            info!("Training model for class {}", class);
            let result = set
                .table(class)
                .ok_or(ModelError::MissingTable(class))
                .and_then(|table| self.train_class_model(class, table, &set.feature_names));

            match result {
                Ok(model) => models.push(model),
                Err(e) => {
                    error!("Training failed for {}: {}", class, e);
                    failures.push((class, e.to_string()));
                }
            }
        }

        TrainingReport {
            feature_names: set.feature_names.clone(),
            encoders: set.encoders.clone(),
            models,
            failures,
        }
    }

    /// Train a single class: fallback below the threshold, split/fit/evaluate otherwise
    pub fn train_class_model(
        &self,
        class: CanonicalClass,
        table: &ClassTable,
        feature_names: &[String],
    ) -> Result<TrainedClassModel, ModelError> {
        validate_table(table, feature_names.len())?;

        if table.len() < self.config.min_samples {
            warn!(
                "Insufficient data for {} ({} rows), using fallback model",
                class,
                table.len()
            );
            return Ok(self.fallback_model(class, feature_names, table.len()));
        }

        let (train_idx, test_idx) = train_test_split(table.len(), self.config.test_size, self.config.seed);
        let select = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
            (
                idx.iter().map(|&i| table.features[i].clone()).collect(),
                idx.iter().map(|&i| table.labels[i]).collect(),
            )
        };
        let (x_train, y_train) = select(&train_idx);
        let (x_test, y_test) = select(&test_idx);

        let model = GradientBoostedRegressor::fit(&x_train, &y_train, self.config.params.clone());
        let evaluation = calculate_metrics(&y_test, &model.predict_batch(&x_test));
        info!("Score for {}: {:.4}", class, evaluation.r2);

        Ok(TrainedClassModel {
            class,
            kind: ModelKind::Trained,
            feature_names: feature_names.to_vec(),
            model,
            metric: Some(evaluation.r2),
            evaluation: Some(evaluation),
            training_samples: x_train.len(),
        })
    }

    fn fallback_model(
        &self,
        class: CanonicalClass,
        feature_names: &[String],
        available: usize,
    ) -> TrainedClassModel {
        let mut rng = Pcg64Mcg::seed_from_u64(self.config.seed);
        let rows = self.config.min_samples.max(1);

        let x: Vec<Vec<f64>> = (0..rows)
            .map(|_| (0..feature_names.len()).map(|_| rng.random::<f64>()).collect())
            .collect();
        let y: Vec<f64> = (0..rows).map(|_| rng.random::<f64>()).collect();

        TrainedClassModel {
            class,
            kind: ModelKind::Fallback,
            feature_names: feature_names.to_vec(),
            model: GradientBoostedRegressor::fit(&x, &y, self.config.params.clone()),
            metric: None,
            evaluation: None,
            training_samples: available,
        }
    }
}

fn validate_table(table: &ClassTable, n_features: usize) -> Result<(), ModelError> {
    if n_features == 0 {
        return Err(ModelError::NoFeatures);
    }
    if table.features.len() != table.labels.len() {
        return Err(ModelError::LabelCountMismatch {
            features: table.features.len(),
            labels: table.labels.len(),
        });
    }
    for (row, (features, label)) in table.features.iter().zip(&table.labels).enumerate() {
        if features.len() != n_features {
            return Err(ModelError::ShapeMismatch {
                row,
                expected: n_features,
                actual: features.len(),
            });
        }
        if !label.is_finite() || features.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite(row));
        }
    }
    Ok(())
}

/// Shuffled index split; the test side gets `ceil(n * test_size)` rows
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_size).ceil() as usize).min(n.saturating_sub(1));
    let test = indices.split_off(n - n_test);
    (indices, test)
}
