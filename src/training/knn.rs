//! K-Nearest Neighbors classifier and regressor (Euclidean, uniform weights)

use super::models::{check_xy, Model};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Max-heap entry: (distance, training row, label)
struct Neighbor(f64, usize, f64);

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Neighbor {}
impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Neighbor {
    // distance first, then row index so equal distances favor earlier rows
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Labels of the k nearest training rows, found with a bounded max-heap
fn k_nearest_labels(point: ArrayView1<f64>, x_train: &Array2<f64>, y_train: &Array1<f64>, k: usize) -> Vec<f64> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (i, row) in x_train.rows().into_iter().enumerate() {
        let candidate = Neighbor(squared_distance(point, row), i, y_train[i]);
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }
    heap.into_iter().map(|n| n.2).collect()
}

/// Stored training set shared by both KNN flavors
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Memory {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Memory {
    fn predict_with<F>(&self, x: &Array2<f64>, k: usize, aggregate: F) -> Result<Array1<f64>>
    where
        F: Fn(&[f64]) -> f64 + Sync,
    {
        if x.ncols() != self.x.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.x.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let k = k.min(self.x.nrows()).max(1);
        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| aggregate(&k_nearest_labels(x.row(i), &self.x, &self.y, k)))
            .collect();
        Ok(Array1::from_vec(predictions))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    pub n_neighbors: usize,
    memory: Option<Memory>,
}

impl KNNClassifier {
    pub fn with_k(k: usize) -> Self {
        Self {
            n_neighbors: k,
            memory: None,
        }
    }
}

impl Model for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.memory = Some(Memory {
            x: x.clone(),
            y: y.clone(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let memory = self.memory.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        memory.predict_with(x, self.n_neighbors, |labels| {
            let mut votes: BTreeMap<i64, usize> = BTreeMap::new();
            for &label in labels {
                *votes.entry(label.round() as i64).or_insert(0) += 1;
            }
            let mut winner = (0i64, 0usize);
            for (class, count) in votes {
                if count > winner.1 {
                    winner = (class, count);
                }
            }
            winner.0 as f64
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    pub n_neighbors: usize,
    memory: Option<Memory>,
}

impl KNNRegressor {
    pub fn with_k(k: usize) -> Self {
        Self {
            n_neighbors: k,
            memory: None,
        }
    }
}

impl Model for KNNRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.memory = Some(Memory {
            x: x.clone(),
            y: y.clone(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let memory = self.memory.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        memory.predict_with(x, self.n_neighbors, |labels| {
            labels.iter().sum::<f64>() / labels.len() as f64
        })
    }
}
