//! Inference on stored models
//!
//! Requests are free-form maps from feature name to value. The adapter lines
//! them up with the model's frozen schema before the estimator sees them.

mod adapter;
mod engine;

pub use adapter::{
    reconcile, reconcile_with_report, PredictionAdapter, PredictionRequest, ReconcilePolicy,
    Reconciliation,
};
pub use engine::{Prediction, Predictor};
