//! Random Forest implementation

use super::decision_tree::DecisionTree;
use super::models::{check_xy, Model};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bagged ensemble of decision trees with per-tree feature subsampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub random_state: u64,
    is_classification: bool,
}

impl RandomForest {
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_leaf: 1,
            bootstrap: true,
            random_state: 42,
            is_classification: true,
        }
    }

    pub fn new_regressor(n_estimators: usize) -> Self {
        Self {
            is_classification: false,
            ..Self::new_classifier(n_estimators)
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// sqrt(n) features per tree for classification, n/3 for regression
    fn features_per_tree(&self, n_features: usize) -> usize {
        let k = if self.is_classification {
            (n_features as f64).sqrt().ceil() as usize
        } else {
            (n_features as f64 / 3.0).ceil() as usize
        };
        k.clamp(1, n_features.max(1))
    }

    fn fit_tree(&self, x: &Array2<f64>, y: &Array1<f64>, tree_idx: usize) -> Result<DecisionTree> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.wrapping_add(tree_idx as u64));

        let rows: Vec<usize> = if self.bootstrap {
            (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
        } else {
            (0..n_samples).collect()
        };
        let mut features = sample(&mut rng, n_features, self.features_per_tree(n_features)).into_vec();
        features.sort_unstable();

        let x_boot = x.select(Axis(0), &rows);
        let y_boot: Array1<f64> = rows.iter().map(|&i| y[i]).collect();

        let mut tree = if self.is_classification {
            DecisionTree::new_classifier()
        } else {
            DecisionTree::new_regressor()
        }
        .with_min_samples_leaf(self.min_samples_leaf)
        .with_feature_subset(features);
        if let Some(d) = self.max_depth {
            tree = tree.with_max_depth(d);
        }

        tree.fit(&x_boot, &y_boot)?;
        Ok(tree)
    }
}

impl Model for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if self.n_estimators == 0 {
            return Err(PipelineError::InvalidInput(
                "n_estimators must be positive".to_string(),
            ));
        }

        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| self.fit_tree(x, y, tree_idx))
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }

        let all_predictions = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let predictions = (0..x.nrows()).map(|i| {
            if self.is_classification {
                // ordered map: ties resolve to the lowest class
                let mut votes: BTreeMap<i64, usize> = BTreeMap::new();
                for preds in &all_predictions {
                    *votes.entry(preds[i].round() as i64).or_insert(0) += 1;
                }
                let mut winner = (0i64, 0usize);
                for (class, count) in votes {
                    if count > winner.1 {
                        winner = (class, count);
                    }
                }
                winner.0 as f64
            } else {
                all_predictions.iter().map(|p| p[i]).sum::<f64>() / all_predictions.len() as f64
            }
        });

        Ok(predictions.collect())
    }
}
