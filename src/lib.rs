//! IMEC - Endurance race strategy prediction
//!
//! This library provides:
//! - Normalization of practice/qualifying entry lists from heterogeneous timing exports
//! - Historical results ingestion and per-class training tables
//! - One gradient-boosted finishing-position model per vehicle class
//! - Lap, stint, pit-stop and tyre planning for a full grid
//!
//! # Example
//!
//! ```no_run
//! use imec::models::PredictRequest;
//! use imec::strategy::StrategyEngine;
//!
//! let req: PredictRequest = serde_json::from_str(
//!     r#"{"qualifying": [{"number": "55", "class": "GTD PRO", "position": 3}],
//!         "race_details": {"duration_hours": 2.0}}"#,
//! )
//! .unwrap();
//!
//! let engine = StrategyEngine::heuristic();
//! let response = engine.predict_race(&req, &mut rand::rng());
//! println!("{} laps", response.predictions[0].laps);
//! ```

pub mod core;
pub mod data;
pub mod model;
pub mod models;
pub mod strategy;

// API-specific modules (only available with api feature)
#[cfg(feature = "api")]
pub mod error;

// Re-export commonly used types
pub use data::{normalize, CanonicalClass, CarEntry, RaceClass};
pub use model::{ModelRegistry, ModelStore, Trainer};
pub use models::{CarPrediction, PredictRequest, PredictResponse};
pub use strategy::{InferenceMode, RaceContext, StrategyEngine, StrategyPlan};
