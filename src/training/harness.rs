//! Cross-validated benchmarking of every registered candidate

use super::config::{MetricKind, TaskSpec, TaskType, TrainingConfig};
use super::cross_validation::{holdout_split, stratified_holdout_split, CVResults, CVSplit, CrossValidator};
use super::features::FeatureBuilder;
use super::registry::{format_params, CandidateKind, HyperParams, ModelCandidate, ModelCandidateRegistry};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::DataFrame;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Mean and spread of one metric across folds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvScore {
    pub metric: MetricKind,
    pub mean: f64,
    pub std: f64,
    pub folds: Vec<f64>,
}

impl CvScore {
    fn from_folds(metric: MetricKind, folds: Vec<f64>) -> Self {
        let results = CVResults::from_scores(folds);
        Self {
            metric,
            mean: results.mean_score,
            std: results.std_score,
            folds: results.scores,
        }
    }
}

/// Outcome of benchmarking one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub candidate: String,
    pub kind: CandidateKind,
    /// Position in the registry, used as the last tie-breaker
    pub declaration_index: usize,
    pub primary: Option<CvScore>,
    pub secondary: Option<CvScore>,
    /// Winning grid point (empty when the candidate has no grid)
    pub best_params: HyperParams,
    pub grid_points: usize,
    /// Set when no grid point could be fitted
    pub error: Option<String>,
    pub elapsed_secs: f64,
}

impl TrialResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.primary.is_some() && self.secondary.is_some()
    }
}

/// Rows and features a run was scored on
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_holdout: Array2<f64>,
    pub y_holdout: Array1<f64>,
}

/// Everything the selector needs from one benchmark
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    pub task: TaskSpec,
    pub config: TrainingConfig,
    pub registry: ModelCandidateRegistry,
    pub schema: Vec<String>,
    pub split: PreparedSplit,
    /// One entry per candidate, in declaration order
    pub trials: Vec<TrialResult>,
}

impl BenchmarkRun {
    pub fn successful_trials(&self) -> impl Iterator<Item = &TrialResult> {
        self.trials.iter().filter(|t| t.is_success())
    }

    pub fn report(&self) -> BenchmarkReport {
        BenchmarkReport {
            task: self.task.name.clone(),
            task_type: self.task.task_type,
            target_column: self.task.target_column.clone(),
            primary_metric: self.task.task_type.primary_metric(),
            secondary_metric: self.task.task_type.secondary_metric(),
            train_rows: self.split.x_train.nrows(),
            holdout_rows: self.split.x_holdout.nrows(),
            n_features: self.schema.len(),
            n_folds: self.config.n_folds,
            trials: self.trials.clone(),
        }
    }
}

/// Serializable summary of a benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub task: String,
    pub task_type: TaskType,
    pub target_column: String,
    pub primary_metric: MetricKind,
    pub secondary_metric: MetricKind,
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub n_features: usize,
    pub n_folds: usize,
    pub trials: Vec<TrialResult>,
}

impl BenchmarkReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs k-fold cross-validation and grid search over a candidate registry
pub struct TrainingHarness {
    config: TrainingConfig,
    registry: Option<ModelCandidateRegistry>,
}

impl TrainingHarness {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            registry: None,
        }
    }

    /// Benchmark a custom registry instead of the built-in one
    pub fn with_registry(mut self, registry: ModelCandidateRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Score every candidate for `task` on `table`
    pub fn benchmark(&self, table: &DataFrame, task: &TaskSpec) -> Result<BenchmarkRun> {
        self.config.validate()?;
        let registry = match &self.registry {
            Some(r) if r.task_type() != task.task_type => {
                return Err(PipelineError::InvalidInput(format!(
                    "registry is for {} but task '{}' is {}",
                    r.task_type(),
                    task.name,
                    task.task_type
                )))
            }
            Some(r) => r.clone(),
            None => ModelCandidateRegistry::for_task(task.task_type),
        };
        if registry.is_empty() {
            return Err(PipelineError::TrainingError(format!(
                "no candidates registered for {}",
                task.task_type
            )));
        }

        let design = FeatureBuilder::new(task.task_type, &task.target_column)
            .with_excluded(&task.exclude_columns)
            .with_calendar_features(self.config.calendar_features)
            .build(table)?;
        check_target(&design.y, task, self.config.n_folds)?;

        let (train_idx, holdout_idx) = match task.task_type {
            TaskType::Classification => {
                stratified_holdout_split(&design.y, self.config.holdout_fraction, self.config.random_seed)?
            }
            TaskType::Regression => {
                holdout_split(design.x.nrows(), self.config.holdout_fraction, self.config.random_seed)?
            }
        };
        if train_idx.len() < self.config.n_folds {
            return Err(PipelineError::TrainingError(format!(
                "training split has {} rows, fewer than {} folds",
                train_idx.len(),
                self.config.n_folds
            )));
        }
        let split = PreparedSplit {
            x_train: design.x.select(Axis(0), &train_idx),
            y_train: design.y.select(Axis(0), &train_idx),
            x_holdout: design.x.select(Axis(0), &holdout_idx),
            y_holdout: design.y.select(Axis(0), &holdout_idx),
        };

        let folds = CrossValidator::k_fold(self.config.n_folds)
            .with_random_state(self.config.random_seed)
            .split(split.x_train.nrows())?;

        info!(
            task = %task.name,
            task_type = %task.task_type,
            train_rows = split.x_train.nrows(),
            holdout_rows = split.x_holdout.nrows(),
            features = design.schema.len(),
            candidates = registry.len(),
            "Benchmarking candidates"
        );

        let trials: Vec<TrialResult> = registry
            .candidates()
            .par_iter()
            .enumerate()
            .map(|(idx, candidate)| {
                evaluate_candidate(candidate, idx, &split, &folds, task.task_type, self.config.random_seed)
            })
            .collect();

        for trial in &trials {
            match (&trial.primary, &trial.error) {
                (Some(score), None) => info!(
                    candidate = %trial.candidate,
                    metric = %score.metric,
                    mean = score.mean,
                    std = score.std,
                    params = %format_params(&trial.best_params),
                    "Candidate scored"
                ),
                (_, error) => warn!(
                    candidate = %trial.candidate,
                    error = error.as_deref().unwrap_or("unknown"),
                    "Candidate failed"
                ),
            }
        }

        Ok(BenchmarkRun {
            task: task.clone(),
            config: self.config.clone(),
            registry,
            schema: design.schema,
            split,
            trials,
        })
    }
}

fn check_target(y: &Array1<f64>, task: &TaskSpec, n_folds: usize) -> Result<()> {
    if y.len() < n_folds {
        return Err(PipelineError::TrainingError(format!(
            "{} usable rows for target '{}', fewer than {} folds",
            y.len(),
            task.target_column,
            n_folds
        )));
    }
    let first = y[0];
    if y.iter().all(|&v| v == first) {
        let what = match task.task_type {
            TaskType::Regression => "target is constant",
            TaskType::Classification => "target has a single class",
        };
        return Err(PipelineError::TrainingError(format!(
            "{} for '{}'",
            what, task.target_column
        )));
    }
    Ok(())
}

/// Compare two (primary, secondary) score pairs; `Greater` means `a` wins
pub(crate) fn compare_scores(task_type: TaskType, a: (f64, f64), b: (f64, f64)) -> Ordering {
    task_type
        .primary_metric()
        .compare(a.0, b.0)
        .then_with(|| task_type.secondary_metric().compare(a.1, b.1))
}

fn evaluate_candidate(
    candidate: &ModelCandidate,
    declaration_index: usize,
    split: &PreparedSplit,
    folds: &[CVSplit],
    task_type: TaskType,
    seed: u64,
) -> TrialResult {
    let start = Instant::now();
    let points = candidate.hyperparameter_grid();

    let scored: Vec<Result<(CvScore, CvScore)>> = points
        .par_iter()
        .map(|params| cross_validate(candidate, params, split, folds, task_type, seed))
        .collect();

    let mut best: Option<(usize, &(CvScore, CvScore))> = None;
    let mut first_error = None;
    for (idx, outcome) in scored.iter().enumerate() {
        match outcome {
            Ok(scores) => {
                let better = best.map_or(true, |(_, current)| {
                    compare_scores(
                        task_type,
                        (scores.0.mean, scores.1.mean),
                        (current.0.mean, current.1.mean),
                    ) == Ordering::Greater
                });
                if better {
                    best = Some((idx, scores));
                }
            }
            Err(e) => {
                debug!(candidate = %candidate.name, params = %format_params(&points[idx]), error = %e, "Grid point failed");
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    match best {
        Some((idx, (primary, secondary))) => TrialResult {
            candidate: candidate.name.clone(),
            kind: candidate.kind,
            declaration_index,
            primary: Some(primary.clone()),
            secondary: Some(secondary.clone()),
            best_params: points[idx].clone(),
            grid_points: points.len(),
            error: None,
            elapsed_secs,
        },
        None => TrialResult {
            candidate: candidate.name.clone(),
            kind: candidate.kind,
            declaration_index,
            primary: None,
            secondary: None,
            best_params: HyperParams::new(),
            grid_points: points.len(),
            error: Some(first_error.unwrap_or_else(|| "no grid point evaluated".to_string())),
            elapsed_secs,
        },
    }
}

fn cross_validate(
    candidate: &ModelCandidate,
    params: &HyperParams,
    split: &PreparedSplit,
    folds: &[CVSplit],
    task_type: TaskType,
    seed: u64,
) -> Result<(CvScore, CvScore)> {
    let primary = task_type.primary_metric();
    let secondary = task_type.secondary_metric();

    let fold_scores = folds
        .par_iter()
        .map(|fold| {
            let x_tr = split.x_train.select(Axis(0), &fold.train_indices);
            let y_tr = split.y_train.select(Axis(0), &fold.train_indices);
            let x_te = split.x_train.select(Axis(0), &fold.test_indices);
            let y_te = split.y_train.select(Axis(0), &fold.test_indices);

            let fitted = candidate.fit(params, &x_tr, &y_tr, seed)?;
            let metrics = task_type.evaluate(&y_te, &fitted.predict(&x_te)?);
            match (primary.extract(&metrics), secondary.extract(&metrics)) {
                (Some(p), Some(s)) if p.is_finite() && s.is_finite() => Ok((p, s)),
                _ => Err(PipelineError::ComputationError(format!(
                    "non-finite score on fold {}",
                    fold.fold_idx
                ))),
            }
        })
        .collect::<Result<Vec<(f64, f64)>>>()?;

    let (p, s): (Vec<f64>, Vec<f64>) = fold_scores.into_iter().unzip();
    Ok((CvScore::from_folds(primary, p), CvScore::from_folds(secondary, s)))
}
