//! Linear model implementations

use super::models::{check_xy, Model};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Cholesky solve of a symmetric positive-definite system `a x = b`
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Gauss-Jordan elimination with partial pivoting, used when Cholesky fails
fn gauss_jordan_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut aug = Array2::zeros((n, n + 1));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = a[[i, j]];
        }
        aug[[i, n]] = b[i];
    }

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&r1, &r2| {
            aug[[r1, col]]
                .abs()
                .partial_cmp(&aug[[r2, col]].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if aug[[pivot_row, col]].abs() < 1e-10 {
            return None;
        }
        if pivot_row != col {
            for j in 0..=n {
                aug.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = aug[[col, col]];
        for j in 0..=n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..=n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    Some(aug.column(n).to_owned())
}

/// Solve normal equations, adding a tiny ridge when the system is not positive definite
fn solve_normal_equations(xtx: &Array2<f64>, xty: &Array1<f64>) -> Result<Array1<f64>> {
    if let Some(w) = cholesky_solve(xtx, xty) {
        return Ok(w);
    }

    let n = xtx.nrows().max(1);
    let jitter = (1e-8 * xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64).max(1e-10);
    let mut regularized = xtx.clone();
    for k in 0..xtx.nrows() {
        regularized[[k, k]] += jitter;
    }

    cholesky_solve(&regularized, xty)
        .or_else(|| gauss_jordan_solve(&regularized, xty))
        .ok_or_else(|| PipelineError::ComputationError("singular normal equations".to_string()))
}

/// Center columns and target, returning the means for intercept recovery
fn center(x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>, f64)> {
    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| PipelineError::TrainingError("cannot fit on zero rows".to_string()))?;
    let y_mean = y.mean().unwrap_or(0.0);
    let x_centered = x - &x_mean.clone().insert_axis(Axis(0));
    let y_centered = y - y_mean;
    Ok((x_centered, y_centered, x_mean, y_mean))
}

/// Least-squares linear regression with optional L2 penalty.
///
/// `alpha == 0` is ordinary least squares; `alpha > 0` is ridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// L2 regularization strength
    pub alpha: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 0.0,
        }
    }

    /// Ridge regression with the given penalty
    pub fn ridge(alpha: f64) -> Self {
        Self::new().with_alpha(alpha)
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

impl Model for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;

        let mut xtx = x_c.t().dot(&x_c);
        if self.alpha > 0.0 {
            for i in 0..xtx.nrows() {
                xtx[[i, i]] += self.alpha;
            }
        }
        let xty = x_c.t().dot(&y_c);
        let coefficients = solve_normal_equations(&xtx, &xty)?;

        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        Ok(x.dot(coefficients) + self.intercept)
    }
}

/// Binary logistic regression trained by batch gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryLogistic {
    pub weights: Array1<f64>,
    pub bias: f64,
}

impl BinaryLogistic {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &LogisticParams) -> Self {
        let n_samples = x.nrows() as f64;
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..params.max_iter {
            let probabilities = sigmoid(&(x.dot(&weights) + bias));
            let errors = &probabilities - y;
            let dw = x.t().dot(&errors) / n_samples + params.alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < params.tol {
                break;
            }
            weights = weights - params.learning_rate * dw;
            bias -= params.learning_rate * db;
        }

        Self { weights, bias }
    }

    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.bias
    }
}

fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticParams {
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub learning_rate: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
        }
    }
}

/// Multiclass logistic regression, one binary model per class (one-vs-rest)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub params: LogisticParams,
    /// Sorted class labels
    pub classes: Vec<f64>,
    pub estimators: Vec<BinaryLogistic>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            params: LogisticParams::default(),
            classes: Vec::new(),
            estimators: Vec::new(),
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.params.alpha = alpha;
        self
    }
}

impl Model for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let classes = super::models::sorted_classes(y);
        if classes.len() < 2 {
            return Err(PipelineError::TrainingError(
                "logistic regression needs at least two classes".to_string(),
            ));
        }

        self.estimators = classes
            .iter()
            .map(|&class| {
                let target = y.mapv(|v| if v == class { 1.0 } else { 0.0 });
                BinaryLogistic::fit(x, &target, &self.params)
            })
            .collect();
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.estimators.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }

        let scores: Vec<Array1<f64>> = self.estimators.iter().map(|e| e.decision(x)).collect();
        let predictions = (0..x.nrows())
            .map(|row| {
                // strict comparison keeps the lowest class on ties
                let mut best = 0;
                for k in 1..scores.len() {
                    if scores[k][row] > scores[best][row] {
                        best = k;
                    }
                }
                self.classes[best]
            })
            .collect();
        Ok(predictions)
    }
}
