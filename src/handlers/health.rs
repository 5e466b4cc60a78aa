use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::AppState;
use imec::models::HealthResponse;

/// Health check endpoint
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let registry = state.engine.registry();
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: !registry.is_empty(),
        loaded_classes: registry
            .loaded_classes()
            .iter()
            .map(|c| c.to_string())
            .collect(),
        inference_mode: state.engine.mode().to_string(),
    };

    HttpResponse::Ok().json(response)
}
