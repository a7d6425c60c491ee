//! Candidate learning algorithms per task type
//!
//! Each candidate is a tagged registration exposing `fit`, `predict` (through
//! the fitted [`FittedEstimator`]) and `hyperparameter_grid`. Declaration order
//! inside a registry is significant: the selector falls back to it on ties.

use super::config::TaskType;
use super::decision_tree::DecisionTree;
use super::knn::{KNNClassifier, KNNRegressor};
use super::linear_models::{LinearRegression, LogisticRegression};
use super::models::Model;
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use super::scaler::StandardScaler;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hyperparameter assignment for one grid point
pub type HyperParams = BTreeMap<String, f64>;

/// Render hyperparameters as `a=1, b=2`
pub fn format_params(params: &HyperParams) -> String {
    if params.is_empty() {
        return "default".to_string();
    }
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Declared hyperparameter axes, expanded as a cartesian product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis(mut self, name: impl Into<String>, values: &[f64]) -> Self {
        self.axes.push((name.into(), values.to_vec()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Every grid point; the last declared axis varies fastest.
    ///
    /// An empty grid yields a single empty assignment.
    pub fn expand(&self) -> Vec<HyperParams> {
        let mut points = vec![HyperParams::new()];
        for (name, values) in &self.axes {
            points = points
                .into_iter()
                .flat_map(|point| {
                    values.iter().map(move |&v| {
                        let mut next = point.clone();
                        next.insert(name.clone(), v);
                        next
                    })
                })
                .collect();
        }
        points
    }
}

/// The algorithm behind a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    LinearRegression,
    Ridge,
    KnnRegressor,
    DecisionTreeRegressor,
    RandomForestRegressor,
    LogisticRegression,
    KnnClassifier,
    DecisionTreeClassifier,
    GaussianNb,
    RandomForestClassifier,
}

impl CandidateKind {
    /// Distance and gradient based learners see standardized features
    pub fn needs_scaling(&self) -> bool {
        matches!(
            self,
            CandidateKind::KnnRegressor | CandidateKind::KnnClassifier | CandidateKind::LogisticRegression
        )
    }
}

/// A fitted learner of any registered kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    Linear(LinearRegression),
    Logistic(LogisticRegression),
    KnnRegressor(KNNRegressor),
    KnnClassifier(KNNClassifier),
    Tree(DecisionTree),
    Forest(RandomForest),
    NaiveBayes(GaussianNaiveBayes),
}

impl Estimator {
    fn as_model_mut(&mut self) -> &mut dyn Model {
        match self {
            Estimator::Linear(m) => m,
            Estimator::Logistic(m) => m,
            Estimator::KnnRegressor(m) => m,
            Estimator::KnnClassifier(m) => m,
            Estimator::Tree(m) => m,
            Estimator::Forest(m) => m,
            Estimator::NaiveBayes(m) => m,
        }
    }

    fn as_model(&self) -> &dyn Model {
        match self {
            Estimator::Linear(m) => m,
            Estimator::Logistic(m) => m,
            Estimator::KnnRegressor(m) => m,
            Estimator::KnnClassifier(m) => m,
            Estimator::Tree(m) => m,
            Estimator::Forest(m) => m,
            Estimator::NaiveBayes(m) => m,
        }
    }
}

/// Estimator plus the scaler fitted alongside it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedEstimator {
    pub scaler: Option<StandardScaler>,
    pub estimator: Estimator,
}

impl FittedEstimator {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match &self.scaler {
            Some(scaler) => self.estimator.as_model().predict(&scaler.transform(x)?),
            None => self.estimator.as_model().predict(x),
        }
    }
}

/// A named learning algorithm bound to one task type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub name: String,
    pub kind: CandidateKind,
    pub task_type: TaskType,
    pub grid: ParamGrid,
}

impl ModelCandidate {
    pub fn new(name: impl Into<String>, kind: CandidateKind, task_type: TaskType) -> Self {
        Self {
            name: name.into(),
            kind,
            task_type,
            grid: ParamGrid::new(),
        }
    }

    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn hyperparameter_grid(&self) -> Vec<HyperParams> {
        self.grid.expand()
    }

    fn build(&self, params: &HyperParams, seed: u64) -> Result<Estimator> {
        let usize_param = |name: &str, default: usize| -> Result<usize> {
            match params.get(name) {
                Some(&v) if v >= 1.0 && v.fract() == 0.0 => Ok(v as usize),
                Some(&v) => Err(PipelineError::InvalidInput(format!(
                    "{} expects a positive integer, got {}",
                    name, v
                ))),
                None => Ok(default),
            }
        };
        let max_depth = params.get("max_depth").map(|_| usize_param("max_depth", 1)).transpose()?;

        let estimator = match self.kind {
            CandidateKind::LinearRegression => Estimator::Linear(LinearRegression::new()),
            CandidateKind::Ridge => {
                Estimator::Linear(LinearRegression::ridge(params.get("alpha").copied().unwrap_or(1.0)))
            }
            CandidateKind::KnnRegressor => {
                Estimator::KnnRegressor(KNNRegressor::with_k(usize_param("n_neighbors", 5)?))
            }
            CandidateKind::KnnClassifier => {
                Estimator::KnnClassifier(KNNClassifier::with_k(usize_param("n_neighbors", 5)?))
            }
            CandidateKind::DecisionTreeRegressor | CandidateKind::DecisionTreeClassifier => {
                let mut tree = if self.kind == CandidateKind::DecisionTreeClassifier {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                };
                if let Some(depth) = max_depth {
                    tree = tree.with_max_depth(depth);
                }
                Estimator::Tree(tree)
            }
            CandidateKind::RandomForestRegressor | CandidateKind::RandomForestClassifier => {
                let n_estimators = usize_param("n_estimators", 50)?;
                let mut forest = if self.kind == CandidateKind::RandomForestClassifier {
                    RandomForest::new_classifier(n_estimators)
                } else {
                    RandomForest::new_regressor(n_estimators)
                }
                .with_random_state(seed);
                if let Some(depth) = max_depth {
                    forest = forest.with_max_depth(depth);
                }
                Estimator::Forest(forest)
            }
            CandidateKind::LogisticRegression => Estimator::Logistic(LogisticRegression::new()),
            CandidateKind::GaussianNb => Estimator::NaiveBayes(GaussianNaiveBayes::new()),
        };
        Ok(estimator)
    }

    /// Fit this candidate with one hyperparameter assignment
    pub fn fit(&self, params: &HyperParams, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<FittedEstimator> {
        let mut estimator = self.build(params, seed)?;
        let scaler = if self.kind.needs_scaling() {
            Some(StandardScaler::fit(x)?)
        } else {
            None
        };

        match &scaler {
            Some(s) => estimator.as_model_mut().fit(&s.transform(x)?, y)?,
            None => estimator.as_model_mut().fit(x, y)?,
        }

        Ok(FittedEstimator { scaler, estimator })
    }
}

/// Ordered candidate list for one task type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidateRegistry {
    task_type: TaskType,
    candidates: Vec<ModelCandidate>,
}

impl ModelCandidateRegistry {
    pub fn empty(task_type: TaskType) -> Self {
        Self {
            task_type,
            candidates: Vec::new(),
        }
    }

    /// The built-in candidates for `task_type`
    pub fn for_task(task_type: TaskType) -> Self {
        let depth_grid = || ParamGrid::new().with_axis("max_depth", &[3.0, 5.0, 8.0]);
        let knn_grid = || ParamGrid::new().with_axis("n_neighbors", &[3.0, 5.0, 7.0]);
        let forest_grid = || {
            ParamGrid::new()
                .with_axis("n_estimators", &[50.0])
                .with_axis("max_depth", &[5.0, 8.0])
        };

        let t = task_type;
        let candidates = match task_type {
            TaskType::Regression => vec![
                ModelCandidate::new("linear_regression", CandidateKind::LinearRegression, t),
                ModelCandidate::new("ridge", CandidateKind::Ridge, t)
                    .with_grid(ParamGrid::new().with_axis("alpha", &[0.1, 1.0, 10.0])),
                ModelCandidate::new("knn_regressor", CandidateKind::KnnRegressor, t).with_grid(knn_grid()),
                ModelCandidate::new("decision_tree_regressor", CandidateKind::DecisionTreeRegressor, t)
                    .with_grid(depth_grid()),
                ModelCandidate::new("random_forest_regressor", CandidateKind::RandomForestRegressor, t)
                    .with_grid(forest_grid()),
            ],
            TaskType::Classification => vec![
                ModelCandidate::new("logistic_regression", CandidateKind::LogisticRegression, t),
                ModelCandidate::new("knn_classifier", CandidateKind::KnnClassifier, t).with_grid(knn_grid()),
                ModelCandidate::new("decision_tree_classifier", CandidateKind::DecisionTreeClassifier, t)
                    .with_grid(depth_grid()),
                ModelCandidate::new("gaussian_nb", CandidateKind::GaussianNb, t),
                ModelCandidate::new("random_forest_classifier", CandidateKind::RandomForestClassifier, t)
                    .with_grid(forest_grid()),
            ],
        };

        Self {
            task_type,
            candidates,
        }
    }

    /// Append a candidate; it must match the registry's task type and have a fresh name
    pub fn register(&mut self, candidate: ModelCandidate) -> Result<()> {
        if candidate.task_type != self.task_type {
            return Err(PipelineError::InvalidInput(format!(
                "candidate '{}' is for {} but the registry is for {}",
                candidate.name, candidate.task_type, self.task_type
            )));
        }
        if self.get(&candidate.name).is_some() {
            return Err(PipelineError::InvalidInput(format!(
                "candidate '{}' already registered",
                candidate.name
            )));
        }
        self.candidates.push(candidate);
        Ok(())
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    pub fn get(&self, name: &str) -> Option<&ModelCandidate> {
        self.candidates.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
