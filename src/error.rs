use actix_web::{error::JsonPayloadError, http::StatusCode, HttpResponse, ResponseError};
use std::fmt;

use crate::core::race_plan::MAX_DURATION_HOURS;
use crate::models::{ErrorResponse, PredictRequest};

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Invalid request data
    ValidationError(String),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_code, message) = match self {
            AppError::ValidationError(msg) => ("validation_error", msg.clone()),
            AppError::InternalError(msg) => ("internal_error", msg.clone()),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error_code.to_string(),
            message,
        })
    }
}

/// Race duration must be a positive number of hours, at most 48
pub fn validate_duration(duration_hours: f64) -> Result<(), AppError> {
    if !duration_hours.is_finite() || duration_hours <= 0.0 {
        return Err(AppError::ValidationError(format!(
            "duration_hours must be a positive number, got {}",
            duration_hours
        )));
    }
    if duration_hours > MAX_DURATION_HOURS {
        return Err(AppError::ValidationError(format!(
            "duration_hours must not exceed {}, got {}",
            MAX_DURATION_HOURS, duration_hours
        )));
    }
    Ok(())
}

/// Boundary checks for a prediction request
///
/// Session records are not checked here; the normalizer substitutes defaults.
pub fn validate_request(req: &PredictRequest) -> Result<(), AppError> {
    validate_duration(req.race_details.duration_hours)
}

/// Map JSON extractor failures onto the error body
pub fn json_error(err: JsonPayloadError) -> AppError {
    match err {
        JsonPayloadError::Payload(e) => AppError::InternalError(e.to_string()),
        other => AppError::ValidationError(other.to_string()),
    }
}
