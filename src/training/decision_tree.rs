//! CART decision tree for classification and regression

use super::models::{check_xy, sorted_classes, Model};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Variance of the target (regression)
    MSE,
}

/// Running sufficient statistics for one side of a candidate split
#[derive(Clone)]
struct SideStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<usize>,
}

impl SideStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, y: f64, class: Option<usize>) {
        self.count += 1;
        self.sum += y;
        self.sq_sum += y * y;
        if let Some(c) = class {
            self.class_counts[c] += 1;
        }
    }

    fn remove(&mut self, y: f64, class: Option<usize>) {
        self.count -= 1;
        self.sum -= y;
        self.sq_sum -= y * y;
        if let Some(c) = class {
            self.class_counts[c] -= 1;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => {
                1.0 - self
                    .class_counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::MSE => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    /// Restrict split search to these feature columns
    pub feature_subset: Option<Vec<usize>>,
    classes: Vec<f64>,
}

impl DecisionTree {
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            feature_subset: None,
            classes: Vec::new(),
        }
    }

    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            ..Self::new_classifier()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_feature_subset(mut self, features: Vec<usize>) -> Self {
        self.feature_subset = Some(features);
        self
    }

    fn is_classification(&self) -> bool {
        self.criterion == Criterion::Gini
    }

    fn class_index(&self, y: f64) -> Option<usize> {
        if self.is_classification() {
            self.classes.iter().position(|&c| c == y)
        } else {
            None
        }
    }

    fn stats_for(&self, y: &Array1<f64>, indices: &[usize]) -> SideStats {
        let mut stats = SideStats::empty(self.classes.len());
        for &i in indices {
            stats.add(y[i], self.class_index(y[i]));
        }
        stats
    }

    fn build_tree(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize], depth: usize) -> TreeNode {
        let n_samples = indices.len();
        let stats = self.stats_for(y, indices);
        let leaf = || TreeNode::Leaf {
            value: self.leaf_value(&stats),
            n_samples,
        };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || stats.impurity(self.criterion) <= 1e-12;
        if should_stop {
            return leaf();
        }

        match self.find_best_split(x, y, indices, &stats) {
            Some((feature_idx, threshold)) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| x[[i, feature_idx]] <= threshold);

                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left: Box::new(self.build_tree(x, y, &left_idx, depth + 1)),
                    right: Box::new(self.build_tree(x, y, &right_idx, depth + 1)),
                    n_samples,
                }
            }
            None => leaf(),
        }
    }

    /// Best (feature, threshold) by impurity decrease; ties go to the lower feature index
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        parent: &SideStats,
    ) -> Option<(usize, f64)> {
        let features: Vec<usize> = match &self.feature_subset {
            Some(subset) => subset.clone(),
            None => (0..x.ncols()).collect(),
        };
        let parent_impurity = parent.impurity(self.criterion);
        let n = indices.len() as f64;

        let candidates: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut order = indices.to_vec();
                order.sort_by(|&a, &b| x[[a, feature_idx]].total_cmp(&x[[b, feature_idx]]));

                let mut left = SideStats::empty(self.classes.len());
                let mut right = parent.clone();
                let mut best: Option<(f64, f64)> = None;

                for pos in 0..order.len() - 1 {
                    let i = order[pos];
                    let class = self.class_index(y[i]);
                    left.add(y[i], class);
                    right.remove(y[i], class);

                    let here = x[[i, feature_idx]];
                    let next = x[[order[pos + 1], feature_idx]];
                    if here == next
                        || left.count < self.min_samples_leaf
                        || right.count < self.min_samples_leaf
                    {
                        continue;
                    }

                    let weighted = (left.count as f64 * left.impurity(self.criterion)
                        + right.count as f64 * right.impurity(self.criterion))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > 1e-12 && best.map_or(true, |(g, _)| gain > g) {
                        best = Some((gain, (here + next) / 2.0));
                    }
                }

                best.map(|(gain, threshold)| (feature_idx, threshold, gain))
            })
            .collect();

        candidates
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(best) if best.2 >= cand.2 => Some(best),
                _ => Some(cand),
            })
            .map(|(feature, threshold, _)| (feature, threshold))
    }

    fn leaf_value(&self, stats: &SideStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }
        if self.is_classification() {
            // first maximum keeps the lowest class on ties
            let mut best = 0;
            for (k, &c) in stats.class_counts.iter().enumerate() {
                if c > stats.class_counts[best] {
                    best = k;
                }
            }
            self.classes.get(best).copied().unwrap_or(0.0)
        } else {
            stats.sum / stats.count as f64
        }
    }

    fn predict_row(node: &TreeNode, x: &Array2<f64>, row: usize) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if x[[row, *feature_idx]] <= *threshold {
                    Self::predict_row(left, x, row)
                } else {
                    Self::predict_row(right, x, row)
                }
            }
        }
    }

    /// Number of split levels below the root
    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }
}

impl Model for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if let Some(subset) = &self.feature_subset {
            if subset.iter().any(|&f| f >= x.ncols()) {
                return Err(PipelineError::InvalidInput(
                    "feature subset index out of range".to_string(),
                ));
            }
        }

        if self.is_classification() {
            self.classes = sorted_classes(y);
        }
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        Ok((0..x.nrows()).map(|row| Self::predict_row(root, x, row)).collect())
    }
}
