//! Serving predictions from a stored model

use super::adapter::{PredictionAdapter, PredictionRequest, ReconcilePolicy};
use crate::error::Result;
use crate::export::ArtifactStore;
use crate::training::{AirQualityCategory, TaskType, TrainedModel};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model output for one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    /// Regression output in target units
    Value(f64),
    /// Classification output
    Category(AirQualityCategory),
}

impl Prediction {
    pub fn as_value(&self) -> Option<f64> {
        match self {
            Prediction::Value(v) => Some(*v),
            Prediction::Category(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<AirQualityCategory> {
        match self {
            Prediction::Category(c) => Some(*c),
            Prediction::Value(_) => None,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Value(v) => write!(f, "{:.4}", v),
            Prediction::Category(c) => write!(f, "{}", c.label()),
        }
    }
}

/// A loaded model plus the adapter for its schema.
///
/// Cheap to clone; the model is shared.
#[derive(Debug, Clone)]
pub struct Predictor {
    model: Arc<TrainedModel>,
    adapter: PredictionAdapter,
}

impl Predictor {
    pub fn new(model: TrainedModel) -> Self {
        let adapter = PredictionAdapter::new(model.schema.clone());
        Self {
            model: Arc::new(model),
            adapter,
        }
    }

    /// Load `name` from `store`
    pub fn from_store(store: &ArtifactStore, name: &str) -> Result<Self> {
        Ok(Self::new(store.load(name)?))
    }

    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.adapter = self.adapter.with_policy(policy);
        self
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn schema(&self) -> &[String] {
        self.adapter.schema()
    }

    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction> {
        let row = self.adapter.adapt(request)?;
        let raw = self.model.predict_row(&row.values)?;
        self.wrap(raw)
    }

    /// Predict many requests with one model call
    pub fn predict_batch(&self, requests: &[PredictionRequest]) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let width = self.schema().len();
        let mut flat = Vec::with_capacity(requests.len() * width);
        for request in requests {
            flat.extend(self.adapter.adapt(request)?.values);
        }
        let x = Array2::from_shape_vec((requests.len(), width), flat)?;
        let raw = if requests.is_empty() {
            Vec::new()
        } else {
            self.model.predict(&x)?.to_vec()
        };

        let predictions = raw.into_iter().map(|v| self.wrap(v)).collect::<Result<Vec<_>>>()?;
        debug!(
            rows = requests.len(),
            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Batch prediction"
        );
        Ok(predictions)
    }

    fn wrap(&self, raw: f64) -> Result<Prediction> {
        match self.model.task_type {
            TaskType::Regression => Ok(Prediction::Value(raw)),
            TaskType::Classification => Ok(Prediction::Category(self.model.category_of(raw)?)),
        }
    }
}
