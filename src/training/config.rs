//! Task and training configuration

use super::models::ModelMetrics;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Learning task over the unified table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Continuous target
    Regression,
    /// Air-quality category derived from a continuous concentration
    Classification,
}

impl TaskType {
    /// Metric that decides selection
    pub fn primary_metric(&self) -> MetricKind {
        match self {
            TaskType::Regression => MetricKind::R2,
            TaskType::Classification => MetricKind::Accuracy,
        }
    }

    /// Metric that breaks ties on the primary metric
    pub fn secondary_metric(&self) -> MetricKind {
        match self {
            TaskType::Regression => MetricKind::Mse,
            TaskType::Classification => MetricKind::F1Macro,
        }
    }

    pub fn evaluate(&self, y_true: &ndarray::Array1<f64>, y_pred: &ndarray::Array1<f64>) -> ModelMetrics {
        match self {
            TaskType::Regression => ModelMetrics::compute_regression(y_true, y_pred),
            TaskType::Classification => ModelMetrics::compute_classification(y_true, y_pred),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Regression => write!(f, "regression"),
            TaskType::Classification => write!(f, "classification"),
        }
    }
}

/// Scalar evaluation metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    R2,
    Mse,
    Accuracy,
    F1Macro,
}

impl MetricKind {
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, MetricKind::Mse)
    }

    pub fn extract(&self, metrics: &ModelMetrics) -> Option<f64> {
        match self {
            MetricKind::R2 => metrics.r2,
            MetricKind::Mse => metrics.mse,
            MetricKind::Accuracy => metrics.accuracy,
            MetricKind::F1Macro => metrics.f1_macro,
        }
    }

    /// Ordering where `Greater` means `a` is the better score
    pub fn compare(&self, a: f64, b: f64) -> Ordering {
        if self.higher_is_better() {
            a.total_cmp(&b)
        } else {
            b.total_cmp(&a)
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::R2 => "r2",
            MetricKind::Mse => "mse",
            MetricKind::Accuracy => "accuracy",
            MetricKind::F1Macro => "f1_macro",
        };
        f.write_str(name)
    }
}

/// Settings shared by every task in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub n_folds: usize,
    pub random_seed: u64,
    /// Share of rows held out for the final report
    pub holdout_fraction: f64,
    /// Append `mes` and `dia_semana` derived from `fecha`
    pub calendar_features: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            random_seed: 42,
            holdout_fraction: 0.2,
            calendar_features: true,
        }
    }
}

impl TrainingConfig {
    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_holdout_fraction(mut self, fraction: f64) -> Self {
        self.holdout_fraction = fraction;
        self
    }

    pub fn with_calendar_features(mut self, enabled: bool) -> Self {
        self.calendar_features = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_folds < 2 {
            return Err(PipelineError::ConfigError(format!(
                "n_folds must be at least 2, got {}",
                self.n_folds
            )));
        }
        if !(0.0..1.0).contains(&self.holdout_fraction) {
            return Err(PipelineError::ConfigError(format!(
                "holdout_fraction must lie in [0, 1), got {}",
                self.holdout_fraction
            )));
        }
        Ok(())
    }
}

/// One learning task: what to predict and where to store the winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Artifact name the selected model is saved under
    pub name: String,
    pub task_type: TaskType,
    /// Continuous column; classification derives its category from it
    pub target_column: String,
    /// Columns never used as features
    #[serde(default)]
    pub exclude_columns: Vec<String>,
}

impl TaskSpec {
    pub fn regression(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_type: TaskType::Regression,
            target_column: target.into(),
            exclude_columns: Vec::new(),
        }
    }

    pub fn classification(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_type: TaskType::Classification,
            target_column: target.into(),
            exclude_columns: Vec::new(),
        }
    }

    pub fn with_excluded(mut self, column: impl Into<String>) -> Self {
        self.exclude_columns.push(column.into());
        self
    }
}
