//! Seeded data splitting: hold-out (plain or stratified) and k-fold

use crate::error::{PipelineError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Shuffled k-fold splitter with a fixed seed
#[derive(Debug, Clone)]
pub struct CrossValidator {
    n_splits: usize,
    shuffle: bool,
    random_state: u64,
}

impl CrossValidator {
    pub fn k_fold(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: true,
            random_state: 0,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate train/test splits over `n_samples` rows.
    ///
    /// The first `n_samples % n_splits` folds get one extra test row.
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        if self.n_splits < 2 {
            return Err(PipelineError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < self.n_splits {
            return Err(PipelineError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut splits = Vec::with_capacity(self.n_splits);
        let mut current = 0;
        for fold_idx in 0..self.n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }

        Ok(splits)
    }
}

/// Seeded shuffle split into (train, hold-out) index sets.
///
/// The hold-out gets `round(n * fraction)` rows, at least one whenever the
/// fraction is positive and at least two rows exist. Indices in each half are
/// sorted so downstream row order stays stable.
pub fn holdout_split(n_samples: usize, fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(PipelineError::InvalidInput(format!(
            "hold-out fraction must lie in [0, 1), got {}",
            fraction
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut n_test = (n_samples as f64 * fraction).round() as usize;
    if fraction > 0.0 && n_test == 0 && n_samples >= 2 {
        n_test = 1;
    }
    n_test = n_test.min(n_samples.saturating_sub(1));

    let mut test = indices[..n_test].to_vec();
    let mut train = indices[n_test..].to_vec();
    test.sort_unstable();
    train.sort_unstable();
    Ok((train, test))
}

/// Seeded hold-out split that keeps class proportions.
///
/// Rows are grouped by label and each class is shuffled on its own; a class
/// of `n` rows sends `round(n * fraction)` of them to the hold-out, capped so
/// at least one stays in training. Classes are visited in label order, so the
/// result depends only on `y`, `fraction` and `seed`.
pub fn stratified_holdout_split(
    y: &Array1<f64>,
    fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(PipelineError::InvalidInput(format!(
            "hold-out fraction must lie in [0, 1), got {}",
            fraction
        )));
    }

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        by_class.entry(label as i64).or_default().push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::new();
    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64 * fraction).round() as usize)
            .min(indices.len().saturating_sub(1));
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    test.sort_unstable();
    train.sort_unstable();
    Ok((train, test))
}

/// Cross-validation results for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    pub mean_score: f64,
    /// Population standard deviation of the fold scores
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self {
                scores,
                mean_score: f64::NAN,
                std_score: f64::NAN,
                n_folds,
            };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::k_fold(5).with_shuffle(false);
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_k_fold_seeded_is_deterministic() {
        let a = CrossValidator::k_fold(3).with_random_state(42).split(17).unwrap();
        let b = CrossValidator::k_fold(3).with_random_state(42).split(17).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].test_indices.len(), 6);
        assert_eq!(a[2].test_indices.len(), 5);
    }

    #[test]
    fn test_k_fold_too_few_samples() {
        assert!(CrossValidator::k_fold(5).split(4).is_err());
        assert!(CrossValidator::k_fold(1).split(10).is_err());
    }

    #[test]
    fn test_holdout_split() {
        let (train, test) = holdout_split(50, 0.2, 42).unwrap();
        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 40);
        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());

        assert_eq!(holdout_split(50, 0.2, 42).unwrap(), (train, test));
        assert!(holdout_split(10, 1.0, 0).is_err());
    }

    #[test]
    fn test_stratified_holdout_keeps_class_proportions() {
        // 40 rows of class 0, 10 rows of class 3
        let y = Array1::from_iter((0..50).map(|i| if i % 5 == 4 { 3.0 } else { 0.0 }));
        for seed in 0..20 {
            let (train, test) = stratified_holdout_split(&y, 0.2, seed).unwrap();
            assert_eq!(test.len(), 10);
            assert_eq!(train.len(), 40);
            assert_eq!(test.iter().filter(|&&i| y[i] == 3.0).count(), 2, "seed {}", seed);

            let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
            all.sort();
            assert_eq!(all, (0..50).collect::<Vec<_>>());
        }
        assert_eq!(
            stratified_holdout_split(&y, 0.2, 7).unwrap(),
            stratified_holdout_split(&y, 0.2, 7).unwrap()
        );
    }

    #[test]
    fn test_stratified_holdout_small_classes_stay_in_training() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        let (train, test) = stratified_holdout_split(&y, 0.3, 1).unwrap();
        assert!(train.contains(&9));
        assert_eq!(test.len(), 3);
        assert!(stratified_holdout_split(&y, 1.0, 1).is_err());
    }

    #[test]
    fn test_cv_results() {
        let r = CVResults::from_scores(vec![0.8, 0.9, 1.0]);
        assert!((r.mean_score - 0.9).abs() < 1e-12);
        assert!((r.std_score - (0.02f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
