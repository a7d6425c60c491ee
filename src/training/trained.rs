//! The selected, fitted model for one task

use super::category::AirQualityCategory;
use super::config::{MetricKind, TaskType};
use super::harness::CvScore;
use super::models::ModelMetrics;
use super::registry::{CandidateKind, FittedEstimator, HyperParams};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// The metric that won selection, with its cross-validated spread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionMetric {
    pub metric: MetricKind,
    pub cv_mean: f64,
    pub cv_std: f64,
}

/// Fitted parameters plus the frozen feature schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub candidate: String,
    pub kind: CandidateKind,
    pub task_type: TaskType,
    pub target_column: String,
    /// Ordered feature names the estimator expects
    pub schema: Vec<String>,
    pub hyperparams: HyperParams,
    pub selection: SelectionMetric,
    pub cv_secondary: CvScore,
    /// Metrics on the hold-out split, computed after selection
    pub holdout: ModelMetrics,
    pub train_rows: usize,
    pub estimator: FittedEstimator,
}

impl TrainedModel {
    pub fn n_features(&self) -> usize {
        self.schema.len()
    }

    /// Predict rows whose columns follow `schema`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.schema.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.schema.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        self.estimator.predict(x)
    }

    /// Predict one schema-ordered row
    pub fn predict_row(&self, row: &[f64]) -> Result<f64> {
        let x = Array2::from_shape_vec((1, row.len()), row.to_vec())?;
        Ok(self.predict(&x)?[0])
    }

    /// Map a classifier output back to its category
    pub fn category_of(&self, prediction: f64) -> Result<AirQualityCategory> {
        if self.task_type != TaskType::Classification {
            return Err(PipelineError::InvalidInput(format!(
                "model '{}' is a {} model",
                self.candidate, self.task_type
            )));
        }
        AirQualityCategory::from_code(prediction.round() as i64).ok_or_else(|| {
            PipelineError::ComputationError(format!("prediction {} is not a category code", prediction))
        })
    }
}
