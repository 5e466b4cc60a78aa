//! Held-out evaluation metrics
//!
//! R² is the reported per-class metric; MAE and RMSE are kept alongside it in the model
//! artifact for inspection.

use serde::{Deserialize, Serialize};

/// Regression metrics on a held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub samples: usize,
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl Default for EvaluationMetrics {
    fn default() -> Self {
        Self {
            samples: 0,
            r2: 0.0,
            mae: 0.0,
            rmse: 0.0,
        }
    }
}

/// Coefficient of determination
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise.
///
/// # Examples
/// ```
/// use imec::model::metrics::r2_score;
/// let r2 = r2_score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
/// assert!((r2 - 1.0).abs() < 1e-12);
/// ```
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }

    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }

    1.0 - ss_res / ss_tot
}

/// Calculate all metrics for paired targets and predictions
pub fn calculate_metrics(y_true: &[f64], y_pred: &[f64]) -> EvaluationMetrics {
    if y_true.is_empty() {
        return EvaluationMetrics::default();
    }

    let n = y_true.len() as f64;
    let abs_err: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    let sq_err: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();

    EvaluationMetrics {
        samples: y_true.len(),
        r2: r2_score(y_true, y_pred),
        mae: abs_err / n,
        rmse: (sq_err / n).sqrt(),
    }
}
