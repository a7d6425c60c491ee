//! Gaussian Naive Bayes for continuous features

use super::models::{check_xy, sorted_classes, Model};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    label: f64,
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

impl ClassStats {
    fn joint_log_likelihood(&self, row: ArrayView1<f64>) -> f64 {
        let likelihood: f64 = row
            .iter()
            .zip(&self.means)
            .zip(&self.variances)
            .map(|((&x, &mean), &var)| -0.5 * ((x - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
            .sum();
        self.log_prior + likelihood
    }
}

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
    classes: Vec<ClassStats>,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            var_smoothing: 1e-9,
            classes: Vec::new(),
        }
    }

    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }
}

/// Welford mean and population variance over the selected rows
fn mean_var(x: &Array2<f64>, rows: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let n_features = x.ncols();
    let mut means = vec![0.0; n_features];
    let mut m2 = vec![0.0; n_features];
    for (count, &idx) in rows.iter().enumerate() {
        let count = (count + 1) as f64;
        for (j, &val) in x.row(idx).iter().enumerate() {
            let delta = val - means[j];
            means[j] += delta / count;
            m2[j] += delta * (val - means[j]);
        }
    }
    let n = rows.len().max(1) as f64;
    (means, m2.into_iter().map(|v| v / n).collect())
}

impl Model for GaussianNaiveBayes {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let n_samples = x.nrows() as f64;

        let all_rows: Vec<usize> = (0..x.nrows()).collect();
        let (_, overall_var) = mean_var(x, &all_rows);
        let epsilon = self.var_smoothing * overall_var.iter().cloned().fold(0.0, f64::max);
        let epsilon = if epsilon > 0.0 { epsilon } else { self.var_smoothing };

        self.classes = sorted_classes(y)
            .into_iter()
            .map(|label| {
                let rows: Vec<usize> = y
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v == label)
                    .map(|(i, _)| i)
                    .collect();
                let (means, variances) = mean_var(x, &rows);
                ClassStats {
                    label,
                    log_prior: (rows.len() as f64 / n_samples).ln(),
                    means,
                    variances: variances.into_iter().map(|v| v + epsilon).collect(),
                }
            })
            .collect();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.classes.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut best = &self.classes[0];
                let mut best_score = best.joint_log_likelihood(row);
                for stats in &self.classes[1..] {
                    let score = stats.joint_log_likelihood(row);
                    if score > best_score {
                        best = stats;
                        best_score = score;
                    }
                }
                best.label
            })
            .collect())
    }
}
