use actix_web::{web, HttpResponse};
use std::sync::Arc;
use tracing::info;

use crate::AppState;
use imec::error::{validate_request, AppError};
use imec::models::PredictRequest;

/// Predict finishing order and race strategy for an entry list
pub async fn predict_race(
    state: web::Data<Arc<AppState>>,
    req: web::Json<PredictRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&req)?;

    let response = state.engine.predict_race(&req, &mut rand::rng());
    info!(
        "Predicted {} cars for '{}' ({} h)",
        response.predictions.len(),
        req.race_details.race_name,
        req.race_details.duration_hours
    );

    Ok(HttpResponse::Ok().json(response))
}
