use actix_web::{middleware, web, App, HttpServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use imec::error::json_error;
use imec::model::ModelStore;
use imec::strategy::{InferenceMode, StrategyEngine};

mod handlers;

use handlers::{health, predict};

/// Application state shared across handlers
pub struct AppState {
    pub engine: StrategyEngine,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let addr = format!("{}:{}", host, port);

    let model_dir = std::env::var("MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/models"));

    let mode = match std::env::var("INFERENCE_MODE") {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("{}; using heuristic mode", e);
            InferenceMode::Heuristic
        }),
        Err(_) => InferenceMode::default(),
    };

    info!("Loading models from {:?}", model_dir);
    let registry = ModelStore::new(&model_dir).load();
    if registry.is_empty() {
        warn!("No class models loaded. Using heuristic planning for every class.");
    } else {
        info!("Loaded models for {:?}", registry.loaded_classes());
    }

    let app_state = Arc::new(AppState {
        engine: StrategyEngine::new(Arc::new(registry), mode),
    });

    info!("Starting IMEC strategy API ({} mode) at http://{}", mode, addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| json_error(err).into()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/predict", web::post().to(predict::predict_race))
    })
    .bind(&addr)?
    .run()
    .await
}
