use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Race descriptors sent with a prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceDetails {
    #[serde(default)]
    pub race_name: String,
    #[serde(default)]
    pub date: String,
    pub duration_hours: f64,
}

/// Race prediction request
///
/// Session records are schema-free; they go through the normalizer as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub practice: Vec<Value>,
    #[serde(default)]
    pub qualifying: Vec<Value>,
    pub race_details: RaceDetails,
    #[serde(default)]
    pub track_conditions: String,
    #[serde(default)]
    pub weather: String,
    #[serde(default)]
    pub car_type: String,
}

impl PredictRequest {
    /// Qualifying is authoritative when present, practice otherwise
    pub fn entry_list(&self) -> &[Value] {
        if self.qualifying.is_empty() {
            &self.practice
        } else {
            &self.qualifying
        }
    }
}

/// Predicted result row for one car
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarPrediction {
    pub position: u32,
    pub number: String,
    pub status: String,
    pub laps: u32,
    pub total_time: String,
    pub gap_first: String,
    pub fastest_lap_time: String,
    pub fastest_lap_number: u32,
    pub team: String,
    pub class: String,
    pub vehicle: String,
    pub tires: String,
    pub driver1_first: String,
    pub driver1_last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver2_first: Option<String>,
}

/// Tyre plan for one car
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TyreStrategy {
    pub compound_sequence: Vec<String>,
    pub expected_stint_lengths: Vec<u32>,
    pub pressures: Vec<f64>,
}

/// Pit plan for one car
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitstopStrategy {
    pub pit_timestamps: Vec<String>,
    pub pit_durations: Vec<f64>,
}

/// Race prediction response; maps are keyed by car number
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<CarPrediction>,
    pub tyre_strategies: BTreeMap<String, TyreStrategy>,
    pub pitstop_strategies: BTreeMap<String, PitstopStrategy>,
    pub confidence: BTreeMap<String, f64>,
    pub explanations: BTreeMap<String, String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub loaded_classes: Vec<String>,
    pub inference_mode: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
