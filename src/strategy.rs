//! Strategy engine
//!
//! Turns an entry list into a finishing order with per-car lap, pit, tyre and confidence
//! plans. Heuristic fields depend only on the race duration and the car's class; the
//! optional hybrid mode lets trained class models decide the order.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::core::race_plan::{
    class_pace, default_fastest_lap, gap_to_leader, lap_count, model_confidence, pit_events,
    pit_timestamps, sample_confidence, sample_fastest_lap_number, sample_pit_durations,
    stint_count, total_time_label, tyre_strategy, TYRE_SUPPLIER,
};
use crate::data::dataset::{GRID_FEATURE, TEAM_FEATURE, VEHICLE_FEATURE};
use crate::data::normalizer::{normalize, CarEntry};
use crate::model::store::ModelRegistry;
use crate::model::trainer::TrainedClassModel;
use crate::models::{CarPrediction, PitstopStrategy, PredictRequest, PredictResponse, TyreStrategy};

pub const STATUS_RUNNING: &str = "RUNNING";

/// How the finishing order and confidence are decided
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    /// Grid order and sampled confidence; models are not consulted
    #[default]
    Heuristic,
    /// Trained class models score each car; unscored cars fall back to their grid slot
    Hybrid,
}

impl InferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMode::Heuristic => "heuristic",
            InferenceMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error for an unrecognized inference mode name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown inference mode '{0}', expected 'heuristic' or 'hybrid'")]
pub struct UnknownInferenceMode(pub String);

impl FromStr for InferenceMode {
    type Err = UnknownInferenceMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" => Ok(InferenceMode::Heuristic),
            "hybrid" => Ok(InferenceMode::Hybrid),
            _ => Err(UnknownInferenceMode(s.to_string())),
        }
    }
}

/// Race descriptors used by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceContext {
    pub duration_hours: f64,
    pub race_name: String,
    pub date: String,
    pub track_conditions: String,
    pub weather: String,
    pub car_type: String,
}

impl RaceContext {
    pub fn with_duration(duration_hours: f64) -> Self {
        Self {
            duration_hours,
            ..Self::default()
        }
    }

    pub fn from_request(req: &PredictRequest) -> Self {
        Self {
            duration_hours: req.race_details.duration_hours,
            race_name: req.race_details.race_name.clone(),
            date: req.race_details.date.clone(),
            track_conditions: req.track_conditions.clone(),
            weather: req.weather.clone(),
            car_type: req.car_type.clone(),
        }
    }
}

/// Full plan for one car
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyPlan {
    pub entry: CarEntry,
    /// 1-based finishing position
    pub position: u32,
    pub laps: u32,
    pub stints: u32,
    pub gap_to_leader: String,
    pub fastest_lap_time: String,
    pub fastest_lap_number: u32,
    pub tyres: TyreStrategy,
    pub pitstops: PitstopStrategy,
    pub confidence: f64,
    /// Predicted finishing position from a class model, hybrid mode only
    pub model_score: Option<f64>,
    pub explanation: Option<String>,
}

impl StrategyPlan {
    pub fn pit_events(&self) -> usize {
        self.pitstops.pit_timestamps.len()
    }

    pub fn to_prediction(&self, context: &RaceContext) -> CarPrediction {
        let lead = self.entry.lead_driver();
        CarPrediction {
            position: self.position,
            number: self.entry.number.clone(),
            status: STATUS_RUNNING.to_string(),
            laps: self.laps,
            total_time: total_time_label(context.duration_hours),
            gap_first: self.gap_to_leader.clone(),
            fastest_lap_time: self.fastest_lap_time.clone(),
            fastest_lap_number: self.fastest_lap_number,
            team: self.entry.team.clone(),
            class: self.entry.canonical_class.as_str().to_string(),
            vehicle: self.entry.vehicle.clone(),
            tires: TYRE_SUPPLIER.to_string(),
            driver1_first: lead.first_name.clone(),
            driver1_last: lead.last_name.clone(),
            driver2_first: self.entry.drivers.get(1).map(|d| d.first_name.clone()),
        }
    }
}

/// Per-car values drawn before ordering
struct Draft {
    entry: CarEntry,
    laps: u32,
    stints: u32,
    pit_durations: Vec<f64>,
    fastest_lap_number: u32,
    confidence: f64,
    score: f64,
    model_score: Option<f64>,
    explanation: Option<String>,
}

/// Prediction engine over a read-only model registry
#[derive(Debug, Clone)]
pub struct StrategyEngine {
    registry: Arc<ModelRegistry>,
    mode: InferenceMode,
}

impl StrategyEngine {
    pub fn new(registry: Arc<ModelRegistry>, mode: InferenceMode) -> Self {
        Self { registry, mode }
    }

    /// Engine with no models in heuristic mode
    pub fn heuristic() -> Self {
        Self::new(Arc::new(ModelRegistry::empty()), InferenceMode::Heuristic)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn mode(&self) -> InferenceMode {
        self.mode
    }

    /// Plan every car in the entry list
    ///
    /// Random draws are made per car in input order (pit durations, fastest lap, confidence),
    /// so a car's heuristic fields do not depend on the final order or on any model.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        entries: &[Value],
        context: &RaceContext,
        rng: &mut R,
    ) -> Vec<StrategyPlan> {
        let mut drafts: Vec<Draft> = entries
            .iter()
            .map(|raw| self.draft(normalize(raw), context, rng))
            .collect();

        // stable: equal scores keep input order
        drafts.sort_by(|a, b| a.score.total_cmp(&b.score));

        drafts
            .into_iter()
            .enumerate()
            .map(|(idx, draft)| {
                let position = idx as u32 + 1;
                let fastest_lap_time = if draft.entry.has_lap_time() {
                    draft.entry.best_lap_time.clone()
                } else {
                    default_fastest_lap(&draft.entry.canonical_class).to_string()
                };

                StrategyPlan {
                    position,
                    laps: draft.laps,
                    stints: draft.stints,
                    gap_to_leader: gap_to_leader(position),
                    fastest_lap_time,
                    fastest_lap_number: draft.fastest_lap_number,
                    tyres: tyre_strategy(draft.stints),
                    pitstops: PitstopStrategy {
                        pit_timestamps: pit_timestamps(pit_events(draft.stints)),
                        pit_durations: draft.pit_durations,
                    },
                    confidence: draft.confidence,
                    model_score: draft.model_score,
                    explanation: draft.explanation,
                    entry: draft.entry,
                }
            })
            .collect()
    }

    /// Build the response for a request
    pub fn predict_race<R: Rng + ?Sized>(&self, req: &PredictRequest, rng: &mut R) -> PredictResponse {
        let context = RaceContext::from_request(req);
        let plans = self.predict(req.entry_list(), &context, rng);

        let mut response = PredictResponse::default();
        for plan in plans {
            let number = plan.entry.number.clone();
            response.predictions.push(plan.to_prediction(&context));
            response.confidence.insert(number.clone(), plan.confidence);
            if let Some(explanation) = plan.explanation {
                response.explanations.insert(number.clone(), explanation);
            }
            response.tyre_strategies.insert(number.clone(), plan.tyres);
            response.pitstop_strategies.insert(number, plan.pitstops);
        }
        response
    }

    fn draft<R: Rng + ?Sized>(&self, entry: CarEntry, context: &RaceContext, rng: &mut R) -> Draft {
        let laps = lap_count(context.duration_hours, class_pace(&entry.canonical_class));
        let stints = stint_count(context.duration_hours);
        let pit_durations = sample_pit_durations(pit_events(stints), rng);
        let fastest_lap_number = sample_fastest_lap_number(laps, rng);
        let sampled_confidence = sample_confidence(rng);

        let mut draft = Draft {
            laps,
            stints,
            pit_durations,
            fastest_lap_number,
            confidence: sampled_confidence,
            score: entry.grid_position as f64,
            model_score: None,
            explanation: None,
            entry,
        };

        if self.mode == InferenceMode::Hybrid {
            self.score(&mut draft);
        }
        draft
    }

    fn score(&self, draft: &mut Draft) {
        let entry = &draft.entry;
        let scored = entry
            .canonical_class
            .canonical()
            .and_then(|class| self.registry.scoring_model(class))
            .and_then(|model| {
                self.features_for(model, entry)
                    .map(|features| (model, model.predict(&features)))
            });

        match scored {
            Some((model, score)) if score.is_finite() => {
                let r2 = model.metric.unwrap_or(0.0);
                draft.explanation = Some(format!(
                    "{} model (R² {:.2}) predicts finishing position {:.1} from grid {}",
                    model.class, r2, score, entry.grid_position
                ));
                draft.score = score;
                draft.model_score = Some(score);
                draft.confidence = model_confidence(r2);
            }
            _ => {
                debug!("No usable model for car {} ({})", entry.number, entry.canonical_class);
                draft.explanation = Some(format!(
                    "No trained model for {}; ordered by grid position {}",
                    entry.canonical_class, entry.grid_position
                ));
            }
        }
    }

    /// Feature row in the model's column order; `None` if a column cannot be built
    fn features_for(&self, model: &TrainedClassModel, entry: &CarEntry) -> Option<Vec<f64>> {
        model
            .feature_names
            .iter()
            .map(|name| match name.as_str() {
                GRID_FEATURE => Some(entry.grid_position as f64),
                TEAM_FEATURE => self.registry.encoder(TEAM_FEATURE).map(|e| e.encode(&entry.team)),
                VEHICLE_FEATURE => self
                    .registry
                    .encoder(VEHICLE_FEATURE)
                    .map(|e| e.encode(&entry.vehicle)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::ClassTable;
    use crate::data::taxonomy::CanonicalClass;
    use crate::model::trainer::Trainer;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn rng() -> Pcg64Mcg {
        Pcg64Mcg::seed_from_u64(42)
    }

    fn request(value: Value) -> PredictRequest {
        serde_json::from_value(value).unwrap()
    }

    /// GTP model that predicts finishing position 21 - grid
    fn reversing_registry() -> ModelRegistry {
        let table = ClassTable {
            features: (1..=20).map(|g| vec![g as f64]).collect(),
            labels: (1..=20).map(|g| (21 - g) as f64).collect(),
        };
        let model = Trainer::with_defaults()
            .train_class_model(CanonicalClass::Gtp, &table, &["grid".to_string()])
            .unwrap();
        ModelRegistry::from_parts(vec![model], BTreeMap::new(), None)
    }

    fn fallback_registry() -> ModelRegistry {
        let table = ClassTable {
            features: (1..=5).map(|g| vec![g as f64]).collect(),
            labels: (1..=5).map(|g| (6 - g) as f64).collect(),
        };
        let model = Trainer::with_defaults()
            .train_class_model(CanonicalClass::Gtp, &table, &["grid".to_string()])
            .unwrap();
        assert!(model.is_fallback());
        ModelRegistry::from_parts(vec![model], BTreeMap::new(), None)
    }

    fn numbers(plans: &[StrategyPlan]) -> Vec<&str> {
        plans.iter().map(|p| p.entry.number.as_str()).collect()
    }

    #[test]
    fn test_inference_mode_parse() {
        assert_eq!("hybrid".parse::<InferenceMode>().unwrap(), InferenceMode::Hybrid);
        assert_eq!(" Heuristic ".parse::<InferenceMode>().unwrap(), InferenceMode::Heuristic);
        assert!("ml".parse::<InferenceMode>().is_err());
        assert_eq!(InferenceMode::default(), InferenceMode::Heuristic);
    }

    #[test]
    fn test_single_gtd_pro_car() {
        let req = request(json!({
            "qualifying": [{"number": "55", "class": "GTD PRO", "position": 3}],
            "race_details": {"duration_hours": 2.0}
        }));
        let response = StrategyEngine::heuristic().predict_race(&req, &mut rng());

        assert_eq!(response.predictions.len(), 1);
        let car = &response.predictions[0];
        assert_eq!(car.number, "55");
        assert_eq!(car.class, "GTD_PRO");
        assert_eq!(car.position, 1);
        assert_eq!(car.laps, 66);
        assert_eq!(car.gap_first, "0.0");
        assert_eq!(car.status, "RUNNING");
        assert_eq!(car.total_time, "2.0h");
        assert_eq!(car.fastest_lap_time, "01:45.000");
        assert!((5..=66).contains(&car.fastest_lap_number));

        assert_eq!(response.tyre_strategies["55"].compound_sequence.len(), 3);
        let pits = &response.pitstop_strategies["55"];
        assert_eq!(pits.pit_timestamps, vec!["3000s", "6000s"]);
        assert_eq!(pits.pit_durations.len(), 2);

        let confidence = response.confidence["55"];
        assert!((0.85..=0.95).contains(&confidence));
        assert!(response.explanations.is_empty());
    }

    #[test]
    fn test_empty_entry_lists() {
        let req = request(json!({"race_details": {"duration_hours": 6.0}}));
        let response = StrategyEngine::heuristic().predict_race(&req, &mut rng());

        assert!(response.predictions.is_empty());
        assert!(response.tyre_strategies.is_empty());
        assert!(response.pitstop_strategies.is_empty());
        assert!(response.confidence.is_empty());
    }

    #[test]
    fn test_practice_used_when_qualifying_empty() {
        let req = request(json!({
            "practice": [{"number": "7", "class": "GTP", "grid": 2}, {"number": "8", "class": "LMP2", "grid": 1}],
            "qualifying": [],
            "race_details": {"duration_hours": 1.0}
        }));
        let response = StrategyEngine::heuristic().predict_race(&req, &mut rng());

        let order: Vec<&str> = response.predictions.iter().map(|p| p.number.as_str()).collect();
        assert_eq!(order, vec!["8", "7"]);
        assert_eq!(response.predictions[0].laps, 36);
        assert_eq!(response.predictions[1].laps, 38);
        assert_eq!(response.predictions[1].gap_first, "10.5");
        assert_eq!(response.predictions[1].fastest_lap_time, "01:34.222");
    }

    #[test]
    fn test_grid_ties_keep_input_order() {
        let entries = vec![
            json!({"number": "a", "grid": 2}),
            json!({"number": "b", "grid": 2}),
            json!({"number": "c", "grid": 1}),
            json!({"number": "d", "grid": 2}),
        ];
        let plans = StrategyEngine::heuristic().predict(&entries, &RaceContext::with_duration(1.0), &mut rng());
        assert_eq!(numbers(&plans), vec!["c", "a", "b", "d"]);
        assert_eq!(plans.iter().map(|p| p.position).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_non_positive_duration() {
        let entries = vec![json!({"number": "1", "class": "GTP"})];
        for duration in [0.0, -4.0, f64::NAN] {
            let plans = StrategyEngine::heuristic().predict(&entries, &RaceContext::with_duration(duration), &mut rng());
            assert_eq!(plans[0].laps, 0);
            assert_eq!(plans[0].stints, 0);
            assert_eq!(plans[0].pit_events(), 0);
            assert_eq!(plans[0].fastest_lap_number, 0);
            assert!(plans[0].tyres.compound_sequence.is_empty());
        }
    }

    #[test]
    fn test_known_lap_time_is_kept() {
        let entries = vec![json!({"number": "1", "class": "GTP", "best_lap": "1:33.500"})];
        let plans = StrategyEngine::heuristic().predict(&entries, &RaceContext::with_duration(1.0), &mut rng());
        assert_eq!(plans[0].fastest_lap_time, "1:33.500");
    }

    #[test]
    fn test_hybrid_without_models_matches_heuristic() {
        let entries: Vec<Value> = (0..6)
            .map(|i| json!({"number": i.to_string(), "class": "GTP", "grid": (i * 7) % 5}))
            .collect();
        let context = RaceContext::with_duration(6.0);

        let heuristic = StrategyEngine::heuristic().predict(&entries, &context, &mut rng());
        let hybrid = StrategyEngine::new(Arc::new(ModelRegistry::empty()), InferenceMode::Hybrid)
            .predict(&entries, &context, &mut rng());

        assert_eq!(numbers(&heuristic), numbers(&hybrid));
        for (h, y) in heuristic.iter().zip(&hybrid) {
            assert_eq!(h.confidence, y.confidence);
            assert!(y.model_score.is_none());
            assert!(y.explanation.as_deref().unwrap().starts_with("No trained model"));
        }
    }

    #[test]
    fn test_hybrid_orders_by_model_score() {
        let entries = vec![
            json!({"number": "front", "class": "GTP", "grid": 1}),
            json!({"number": "back", "class": "GTP", "grid": 18}),
        ];
        let registry = Arc::new(reversing_registry());
        let r2 = registry.model(CanonicalClass::Gtp).unwrap().metric.unwrap();
        let engine = StrategyEngine::new(registry, InferenceMode::Hybrid);

        let plans = engine.predict(&entries, &RaceContext::with_duration(2.0), &mut rng());

        assert_eq!(numbers(&plans), vec!["back", "front"]);
        for plan in &plans {
            assert!(plan.model_score.is_some());
            assert_eq!(plan.confidence, model_confidence(r2));
            assert!(plan.explanation.as_deref().unwrap().starts_with("GTP model"));
        }
    }

    #[test]
    fn test_hybrid_ignores_fallback_models() {
        let entries = vec![
            json!({"number": "1", "class": "GTP", "grid": 1}),
            json!({"number": "2", "class": "GTP", "grid": 4}),
        ];
        let engine = StrategyEngine::new(Arc::new(fallback_registry()), InferenceMode::Hybrid);
        let plans = engine.predict(&entries, &RaceContext::with_duration(2.0), &mut rng());

        assert_eq!(numbers(&plans), vec!["1", "2"]);
        assert!(plans.iter().all(|p| p.model_score.is_none()));
    }

    #[test]
    fn test_heuristic_fields_independent_of_models() {
        let entries = vec![
            json!({"number": "10", "class": "GTP", "grid": 1}),
            json!({"number": "20", "class": "GTD", "grid": 2}),
            json!({"number": "30", "class": "GTP", "grid": 3}),
        ];
        let context = RaceContext::with_duration(4.0);

        let heuristic = StrategyEngine::heuristic().predict(&entries, &context, &mut rng());
        let hybrid = StrategyEngine::new(Arc::new(reversing_registry()), InferenceMode::Hybrid)
            .predict(&entries, &context, &mut rng());

        for plan in &heuristic {
            let other = hybrid.iter().find(|p| p.entry.number == plan.entry.number).unwrap();
            assert_eq!(plan.laps, other.laps);
            assert_eq!(plan.stints, other.stints);
            assert_eq!(plan.pitstops, other.pitstops);
            assert_eq!(plan.tyres, other.tyres);
            assert_eq!(plan.fastest_lap_number, other.fastest_lap_number);
        }
    }

    #[test]
    fn test_huge_duration_is_bounded() {
        let entries = vec![json!({"number": "1", "class": "GTP"})];
        let capped = StrategyEngine::heuristic().predict(&entries, &RaceContext::with_duration(48.0), &mut rng());
        for duration in [1.0e8, 1.0e10] {
            let plans = StrategyEngine::heuristic().predict(&entries, &RaceContext::with_duration(duration), &mut rng());
            assert_eq!(plans[0].laps, capped[0].laps);
            assert_eq!(plans[0].stints, capped[0].stints);
            assert_eq!(plans[0].pit_events(), 57);
            assert_eq!(plans[0].pitstops.pit_timestamps, capped[0].pitstops.pit_timestamps);
        }
    }

    #[test]
    fn test_saved_models_keep_heuristic_fields() {
        use crate::data::dataset::{LabelEncoder, TrainingSet};
        use crate::model::store::ModelStore;

        let mut tables: BTreeMap<CanonicalClass, ClassTable> = CanonicalClass::ALL
            .into_iter()
            .map(|c| (c, ClassTable::default()))
            .collect();
        tables.insert(
            CanonicalClass::Gtp,
            ClassTable {
                features: (1..=20).map(|g| vec![g as f64, (g % 3) as f64]).collect(),
                labels: (1..=20).map(|g| (21 - g) as f64).collect(),
            },
        );
        let mut encoders = BTreeMap::new();
        encoders.insert("team".to_string(), LabelEncoder::fit(["Penske", "Ganassi", "Wayne Taylor"]));
        let set = TrainingSet {
            feature_names: vec!["grid".to_string(), "team".to_string()],
            encoders,
            tables,
            dropped_rows: 0,
            synthesized_grid_rows: 0,
        };

        let dir = std::env::temp_dir().join(format!("imec-strategy-roundtrip-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let store = ModelStore::new(&dir);
        store.save(&Trainer::with_defaults().train_all(&set)).unwrap();
        let registry = store.load();
        assert!(registry.scoring_model(CanonicalClass::Gtp).is_some());

        let entries = vec![
            json!({"number": "6", "class": "GTP", "team": "Penske", "grid": 1}),
            json!({"number": "01", "class": "GTP", "team": "Ganassi", "grid": 12}),
            json!({"number": "63", "class": "GTD", "team": "Iron Lynx", "grid": 3}),
        ];
        let context = RaceContext::with_duration(6.0);
        let heuristic = StrategyEngine::heuristic().predict(&entries, &context, &mut rng());
        let hybrid = StrategyEngine::new(Arc::new(registry), InferenceMode::Hybrid)
            .predict(&entries, &context, &mut rng());

        for plan in &heuristic {
            let other = hybrid.iter().find(|p| p.entry.number == plan.entry.number).unwrap();
            assert_eq!(plan.laps, other.laps);
            assert_eq!(plan.stints, other.stints);
            assert_eq!(plan.pitstops, other.pitstops);
        }
        assert!(hybrid
            .iter()
            .filter(|p| p.entry.canonical_class.canonical() == Some(CanonicalClass::Gtp))
            .all(|p| p.model_score.is_some()));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
