//! Picking the winning candidate of a benchmark

use super::harness::{compare_scores, BenchmarkRun, TrialResult};
use super::models::ModelMetrics;
use super::registry::format_params;
use super::trained::{SelectionMetric, TrainedModel};
use crate::error::{PipelineError, Result};
use std::cmp::Ordering;
use tracing::info;

/// Deterministic selection: best primary CV mean, then best secondary, then
/// earliest declaration.
pub struct ModelSelector;

impl ModelSelector {
    /// The winning trial, without refitting
    pub fn rank(run: &BenchmarkRun) -> Result<&TrialResult> {
        let task_type = run.task.task_type;
        let mut best: Option<(&TrialResult, (f64, f64))> = None;

        for trial in run.successful_trials() {
            let (Some(primary), Some(secondary)) = (&trial.primary, &trial.secondary) else {
                continue;
            };
            let scores = (primary.mean, secondary.mean);
            let wins = match &best {
                None => true,
                Some((current, current_scores)) => match compare_scores(task_type, scores, *current_scores) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => trial.declaration_index < current.declaration_index,
                },
            };
            if wins {
                best = Some((trial, scores));
            }
        }

        best.map(|(trial, _)| trial).ok_or_else(|| {
            PipelineError::TrainingError(format!(
                "every candidate failed for task '{}'",
                run.task.name
            ))
        })
    }

    /// Refit the winner on the full training split, then score it on the hold-out split
    pub fn select(run: &BenchmarkRun) -> Result<TrainedModel> {
        let winner = Self::rank(run)?;
        let candidate = run.registry.get(&winner.candidate).ok_or_else(|| {
            PipelineError::TrainingError(format!("candidate '{}' not in registry", winner.candidate))
        })?;
        let (primary, secondary) = match (&winner.primary, &winner.secondary) {
            (Some(p), Some(s)) => (p.clone(), s.clone()),
            _ => {
                return Err(PipelineError::TrainingError(format!(
                    "candidate '{}' has no scores",
                    winner.candidate
                )))
            }
        };

        let split = &run.split;
        let estimator = candidate.fit(&winner.best_params, &split.x_train, &split.y_train, run.config.random_seed)?;

        let holdout = if split.x_holdout.nrows() > 0 {
            let predictions = estimator.predict(&split.x_holdout)?;
            run.task.task_type.evaluate(&split.y_holdout, &predictions)
        } else {
            ModelMetrics::default()
        };

        info!(
            task = %run.task.name,
            candidate = %winner.candidate,
            params = %format_params(&winner.best_params),
            cv_mean = primary.mean,
            holdout = run.task.task_type.primary_metric().extract(&holdout).unwrap_or(f64::NAN),
            "Selected model"
        );

        Ok(TrainedModel {
            candidate: winner.candidate.clone(),
            kind: winner.kind,
            task_type: run.task.task_type,
            target_column: run.task.target_column.clone(),
            schema: run.schema.clone(),
            hyperparams: winner.best_params.clone(),
            selection: SelectionMetric {
                metric: primary.metric,
                cv_mean: primary.mean,
                cv_std: primary.std,
            },
            cv_secondary: secondary,
            holdout,
            train_rows: split.x_train.nrows(),
            estimator,
        })
    }
}
