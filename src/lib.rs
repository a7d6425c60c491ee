//! airquality-automl - air-quality data unification and model benchmarking
//!
//! Raw traffic, pollutant and weather tables are cleaned and joined into one
//! hourly table, then a set of regression and classification candidates is
//! cross-validated on it. The winner per task is stored with its feature
//! schema and served through a schema-reconciling predictor.
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - loading, record normalization, unification by (fecha, hora)
//!
//! ## Models
//! - [`training`] - candidate registry, training harness, model selector
//! - [`export`] - artifact store with checksummed binary envelopes
//! - [`inference`] - prediction adapter and predictor
//!
//! ## Orchestration
//! - [`config`] - pipeline configuration (TOML + environment)
//! - [`pipeline`] - explicit pipeline context running every stage
//! - [`cli`] - command-line interface

// Core error handling
pub mod error;

// Data
pub mod data;

// Models
pub mod training;
pub mod export;
pub mod inference;

// Orchestration
pub mod config;
pub mod pipeline;
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result};

    // Data
    pub use crate::data::{
        normalize, text_frame, unify, DataLoader, DataSaver, DatasetUnifier, DropCounts, JoinReport,
        NormalizationRules, Source, SourceRole, DATE_COLUMN, HOUR_COLUMN,
    };

    // Training
    pub use crate::training::{
        AirQualityCategory, BenchmarkRun, ModelCandidateRegistry, ModelSelector, TaskSpec, TaskType,
        TrainedModel, TrainingConfig, TrainingHarness,
    };

    // Persistence and inference
    pub use crate::export::{ArtifactMetadata, ArtifactStore};
    pub use crate::inference::{reconcile, PredictionRequest, Prediction, Predictor, ReconcilePolicy};

    // Orchestration
    pub use crate::config::{PipelineConfig, SourceConfig};
    pub use crate::pipeline::Pipeline;
}
