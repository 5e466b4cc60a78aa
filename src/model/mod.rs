//! Per-class regression models: fitting, evaluation and artifact storage

pub mod gbdt;
pub mod metrics;
pub mod store;
pub mod trainer;

// Re-export commonly used types
pub use gbdt::{GbdtParams, GradientBoostedRegressor, TreeError};
pub use metrics::{calculate_metrics, r2_score, EvaluationMetrics};
pub use store::{ModelMetadata, ModelRegistry, ModelStore, StoreError, MODEL_VERSION};
pub use trainer::{
    ModelError, ModelKind, TrainedClassModel, Trainer, TrainerConfig, TrainingReport,
};
