//! Model benchmarking and selection
//!
//! - [`registry`]: candidate algorithms and their hyperparameter grids
//! - [`harness`]: seeded hold-out split, k-fold CV and grid search per candidate
//! - [`selector`]: deterministic choice of the winner and its final refit
//! - learners: linear/ridge/logistic, KNN, decision tree, random forest, Gaussian NB

pub mod category;
pub mod config;
pub mod cross_validation;
pub mod decision_tree;
pub mod features;
pub mod harness;
pub mod knn;
pub mod linear_models;
pub mod models;
pub mod naive_bayes;
pub mod random_forest;
pub mod registry;
pub mod scaler;
pub mod selector;
pub mod trained;

pub use category::AirQualityCategory;
pub use config::{MetricKind, TaskSpec, TaskType, TrainingConfig};
pub use cross_validation::{holdout_split, stratified_holdout_split, CVResults, CVSplit, CrossValidator};
pub use features::{DesignMatrix, FeatureBuilder};
pub use harness::{BenchmarkReport, BenchmarkRun, CvScore, TrainingHarness, TrialResult};
pub use models::{Model, ModelMetrics};
pub use registry::{
    CandidateKind, Estimator, FittedEstimator, HyperParams, ModelCandidate, ModelCandidateRegistry, ParamGrid,
};
pub use selector::ModelSelector;
pub use trained::{SelectionMetric, TrainedModel};
