//! Data loading, normalization and training table construction

pub mod dataset;
pub mod normalizer;
pub mod results_loader;
pub mod taxonomy;

// Re-export commonly used types
pub use dataset::{build_training_table, ClassTable, LabelEncoder, TrainingSet};
pub use normalizer::{normalize, CarEntry, Driver};
pub use results_loader::{
    load_processed, save_processed, DataError, HistoricalResultRecord, LoaderConfig,
    ResultsLoader,
};
pub use taxonomy::{canonicalize_historical, classify_live, CanonicalClass, RaceClass};
