// classifier.rs
//
// The fit/predict/predict_proba capability, and a multinomial logistic
// regression implementing it with an L2 penalty, solved by argmin's L-BFGS.

use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};

use crate::error::{ImpRefError, Result};

/// A probabilistic multi-class classifier over integer class labels.
///
/// Probability columns follow [`Classifier::classes`], which is sorted
/// ascending and holds every label seen by `fit`.
pub trait Classifier: Send + Sync {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize]) -> Result<()>;

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>>;

    /// Label of the highest-probability column for each row (first on ties).
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        let classes = self.classes();
        Ok(proba
            .axis_iter(Axis(0))
            .map(|row| classes[argmax(row.iter().copied())])
            .collect())
    }

    fn classes(&self) -> &[usize];

    /// Feature count seen during `fit`; `None` before fitting.
    fn n_features(&self) -> Option<usize>;

    fn name(&self) -> &str {
        "classifier"
    }
}

pub(crate) fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best_idx = 0;
    let mut best = f64::NEG_INFINITY;
    for (idx, value) in values.enumerate() {
        if value > best {
            best = value;
            best_idx = idx;
        }
    }
    best_idx
}

/// Hyperparameters of [`MultinomialLogisticRegression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Inverse L2 regularisation strength.
    pub c: f64,
    pub max_iterations: usize,
    /// Stop once the L2 norm of the gradient falls below this.
    pub tolerance: f64,
    /// Number of correction pairs kept by L-BFGS.
    pub history: usize,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 10.0,
            max_iterations: 1000,
            tolerance: 1e-4,
            history: 10,
        }
    }
}

impl LogisticConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(ImpRefError::InvalidConfig(format!(
                "C must be a positive finite number, got {}",
                self.c
            )));
        }
        if self.max_iterations == 0 {
            return Err(ImpRefError::InvalidConfig(
                "max iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(ImpRefError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.history == 0 {
            return Err(ImpRefError::InvalidConfig(
                "L-BFGS history must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Softmax regression over all classes (one coefficient column per class).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultinomialLogisticRegression {
    pub config: LogisticConfig,
    classes: Vec<usize>,
    /// features x classes
    coefficients: Array2<f64>,
    intercepts: Array1<f64>,
    iterations: usize,
    converged: bool,
}

impl MultinomialLogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            classes: Vec::new(),
            coefficients: Array2::zeros((0, 0)),
            intercepts: Array1::zeros(0),
            iterations: 0,
            converged: false,
        }
    }

    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn intercepts(&self) -> &Array1<f64> {
        &self.intercepts
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    /// Pretty-printed JSON form read back by [`MultinomialLogisticRegression::load`].
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| ImpRefError::io(path, e))?;
        info!("Model has been saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ImpRefError::io(path, e))?;
        let model: Self = serde_json::from_reader(BufReader::new(file))?;
        if model.coefficients.ncols() != model.classes.len()
            || model.intercepts.len() != model.classes.len()
        {
            return Err(ImpRefError::dimension(
                "model load",
                model.classes.len(),
                model.coefficients.ncols(),
            ));
        }
        Ok(model)
    }
}

impl Classifier for MultinomialLogisticRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize]) -> Result<()> {
        self.config.validate()?;
        if x.nrows() != y.len() {
            return Err(ImpRefError::dimension("classifier fit", x.nrows(), y.len()));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ImpRefError::EmptyInput {
                what: "training samples or features",
            });
        }

        let mut classes = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(ImpRefError::InvalidConfig(format!(
                "training labels contain a single class ({}); at least two are required",
                classes[0]
            )));
        }
        let targets: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();

        let problem = SoftmaxProblem::new(x.view(), &targets, classes.len(), self.config.c);
        info!(
            "Fitting multinomial logistic regression: {} samples, {} features, {} classes, C={}, max_iter={}",
            x.nrows(),
            x.ncols(),
            classes.len(),
            self.config.c,
            self.config.max_iterations
        );

        let (n_features, n_classes) = (x.ncols(), classes.len());
        let init = vec![0.0; problem.n_params()];
        debug!(
            "L-BFGS over {} parameters (memory {}, gradient tolerance {}).",
            init.len(),
            self.config.history,
            self.config.tolerance
        );
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.config.history)
            .with_tolerance_grad(self.config.tolerance)
            .map_err(|e| ImpRefError::Optimization(e.to_string()))?;
        let max_iters = self.config.max_iterations as u64;
        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(max_iters))
            .run()
            .map_err(|e| ImpRefError::Optimization(format!("L-BFGS failed: {}", e)))?;

        let iterations = res.state.iter as usize;
        let loss = res.state.best_cost;
        let converged = matches!(
            res.state.termination_status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        );
        let theta = res.state.best_param.ok_or_else(|| {
            ImpRefError::Optimization("L-BFGS returned no parameters".to_string())
        })?;
        if !loss.is_finite() {
            return Err(ImpRefError::Optimization(format!(
                "final loss is not finite: {}",
                loss
            )));
        }
        if !converged {
            warn!(
                "L-BFGS did not converge within {} iterations (final loss {:.6}); increase --max-iter.",
                iterations, loss
            );
        }
        info!(
            "Model training completed after {} iterations (loss {:.6}).",
            iterations, loss
        );

        let (coefficients, intercepts) = unpack_parameters(&theta, n_features, n_classes)?;
        self.classes = classes;
        self.coefficients = coefficients;
        self.intercepts = intercepts;
        self.iterations = iterations;
        self.converged = converged;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if !self.is_fitted() {
            return Err(ImpRefError::NotFitted("multinomial logistic regression"));
        }
        if x.ncols() != self.coefficients.nrows() {
            return Err(ImpRefError::dimension(
                "prediction (feature count)",
                self.coefficients.nrows(),
                x.ncols(),
            ));
        }
        let mut logits = x.dot(&self.coefficients) + &self.intercepts;
        for mut row in logits.axis_iter_mut(Axis(0)) {
            let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let total = row.sum();
            row.mapv_inplace(|v| v / total);
        }
        Ok(logits)
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn n_features(&self) -> Option<usize> {
        self.is_fitted().then(|| self.coefficients.nrows())
    }

    fn name(&self) -> &str {
        "LogisticRegression"
    }
}

/// Splits a packed parameter vector into the features x classes coefficient
/// block and the per-class intercepts.
fn unpack_parameters(
    theta: &[f64],
    n_features: usize,
    n_classes: usize,
) -> Result<(Array2<f64>, Array1<f64>)> {
    let n_weights = n_features * n_classes;
    if theta.len() != n_weights + n_classes {
        return Err(ImpRefError::dimension(
            "parameter unpacking",
            n_weights + n_classes,
            theta.len(),
        ));
    }
    let w = Array2::from_shape_vec((n_features, n_classes), theta[..n_weights].to_vec())
        .map_err(|e| ImpRefError::Optimization(e.to_string()))?;
    let b = Array1::from(theta[n_weights..].to_vec());
    Ok((w, b))
}

/// Penalised softmax cross-entropy over a fixed training set.
///
/// Parameters are packed as the row-major features x classes coefficient
/// block followed by one intercept per class.
struct SoftmaxProblem<'a> {
    x: ArrayView2<'a, f64>,
    targets: &'a [usize],
    n_classes: usize,
    /// L2 weight applied to the mean loss: 1 / (C * n).
    alpha: f64,
    chunk_rows: usize,
}

impl<'a> SoftmaxProblem<'a> {
    fn new(x: ArrayView2<'a, f64>, targets: &'a [usize], n_classes: usize, c: f64) -> Self {
        let n = x.nrows();
        let chunks = rayon::current_num_threads().max(1) * 2;
        Self {
            x,
            targets,
            n_classes,
            alpha: 1.0 / (c * n as f64),
            chunk_rows: n.div_ceil(chunks).max(64),
        }
    }

    fn n_params(&self) -> usize {
        (self.x.ncols() + 1) * self.n_classes
    }

    /// Mean loss plus penalty, and its gradient. Row chunks are evaluated in
    /// parallel and reduced in chunk order so the result does not depend on
    /// scheduling.
    fn loss_and_gradient(&self, theta: &[f64]) -> Result<(f64, Vec<f64>)> {
        let (w, b) = unpack_parameters(theta, self.x.ncols(), self.n_classes)?;
        let n = self.x.nrows();
        let starts: Vec<usize> = (0..n).step_by(self.chunk_rows).collect();

        let partials: Vec<(f64, Array2<f64>, Array1<f64>)> = starts
            .par_iter()
            .map(|&start| {
                let end = (start + self.chunk_rows).min(n);
                let xs = self.x.slice(s![start..end, ..]);
                let mut residual = xs.dot(&w) + &b;
                let mut loss = 0.0;
                for (row_offset, mut row) in residual.axis_iter_mut(Axis(0)).enumerate() {
                    let target = self.targets[start + row_offset];
                    let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
                    let log_norm = max + row.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
                    loss += log_norm - row[target];
                    row.mapv_inplace(|v| (v - log_norm).exp());
                    row[target] -= 1.0;
                }
                let grad_w = xs.t().dot(&residual);
                let grad_b = residual.sum_axis(Axis(0));
                (loss, grad_w, grad_b)
            })
            .collect();

        let mut loss = 0.0;
        let mut grad_w = Array2::<f64>::zeros(w.raw_dim());
        let mut grad_b = Array1::<f64>::zeros(b.raw_dim());
        for (chunk_loss, chunk_w, chunk_b) in partials {
            loss += chunk_loss;
            grad_w += &chunk_w;
            grad_b += &chunk_b;
        }

        let inv_n = 1.0 / n as f64;
        loss = loss * inv_n + 0.5 * self.alpha * w.iter().map(|v| v * v).sum::<f64>();
        grad_w.mapv_inplace(|g| g * inv_n);
        grad_w.scaled_add(self.alpha, &w);
        grad_b.mapv_inplace(|g| g * inv_n);

        let gradient = grad_w.iter().chain(grad_b.iter()).copied().collect();
        Ok((loss, gradient))
    }
}

impl<'a> CostFunction for SoftmaxProblem<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let (loss, _) = self.loss_and_gradient(param)?;
        Ok(loss)
    }
}

impl<'a> Gradient for SoftmaxProblem<'a> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Self::Param) -> std::result::Result<Self::Gradient, ArgminError> {
        let (_, gradient) = self.loss_and_gradient(param)?;
        Ok(gradient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    /// Three well separated clusters in two dimensions.
    fn clusters() -> (Array2<f64>, Vec<usize>) {
        let centers = [(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)];
        let offsets = [(-0.3, -0.2), (0.2, 0.3), (0.3, -0.1), (-0.1, 0.25), (0.0, 0.0)];
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for (label, (cx, cy)) in centers.iter().enumerate() {
            for (dx, dy) in offsets.iter() {
                values.push(cx + dx);
                values.push(cy + dy);
                labels.push(label * 2);
            }
        }
        (Array2::from_shape_vec((labels.len(), 2), values).unwrap(), labels)
    }

    fn fitted() -> MultinomialLogisticRegression {
        let (x, y) = clusters();
        let mut model = MultinomialLogisticRegression::new(LogisticConfig::default());
        model.fit(x.view(), &y).unwrap();
        model
    }

    #[test]
    fn separates_clusters_and_reports_sorted_classes() {
        let model = fitted();
        let (x, y) = clusters();
        assert_eq!(model.classes(), &[0, 2, 4]);
        assert_eq!(model.n_features(), Some(2));
        assert!(model.converged());
        assert_eq!(model.predict(x.view()).unwrap(), y);
    }

    #[test]
    fn probabilities_sum_to_one_and_predictions_are_argmax() {
        let model = fitted();
        let query = array![[0.1, 0.1], [3.9, 0.2], [0.2, 3.7], [2.0, 2.0]];
        let proba = model.predict_proba(query.view()).unwrap();
        let predicted = model.predict(query.view()).unwrap();
        assert_eq!(proba.dim(), (4, 3));
        for (row, label) in proba.axis_iter(Axis(0)).zip(predicted) {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
            assert_eq!(model.classes()[argmax(row.iter().copied())], label);
        }
    }

    #[test]
    fn wrong_feature_count_is_rejected() {
        let model = fitted();
        let err = model.predict_proba(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(
            err,
            ImpRefError::DimensionMismatch {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn unfitted_model_refuses_to_predict() {
        let model = MultinomialLogisticRegression::new(LogisticConfig::default());
        assert!(matches!(
            model.predict(array![[1.0]].view()),
            Err(ImpRefError::NotFitted(_))
        ));
    }

    #[test]
    fn single_class_is_rejected() {
        let mut model = MultinomialLogisticRegression::new(LogisticConfig::default());
        let err = model.fit(array![[0.0], [1.0]].view(), &[3, 3]).unwrap_err();
        assert!(matches!(err, ImpRefError::InvalidConfig(_)));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let (x, y) = clusters();
        let targets: Vec<usize> = y.iter().map(|l| l / 2).collect();
        let problem = SoftmaxProblem::new(x.view(), &targets, 3, 10.0);
        let theta: Vec<f64> = (0..problem.n_params()).map(|i| (i as f64 * 0.37).sin() * 0.5).collect();
        let (_, grad) = problem.loss_and_gradient(&theta).unwrap();

        let h = 1e-6;
        for i in 0..theta.len() {
            let mut plus = theta.clone();
            plus[i] += h;
            let mut minus = theta.clone();
            minus[i] -= h;
            let numeric = (problem.loss_and_gradient(&plus).unwrap().0
                - problem.loss_and_gradient(&minus).unwrap().0)
                / (2.0 * h);
            assert_abs_diff_eq!(grad[i], numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn reloaded_model_predicts_identically() {
        let model = fitted();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LogisticRegression.json");
        model.save(&path).unwrap();
        let reloaded = MultinomialLogisticRegression::load(&path).unwrap();

        let (x, _) = clusters();
        assert_eq!(reloaded.classes(), model.classes());
        let a = model.predict_proba(x.view()).unwrap();
        let b = reloaded.predict_proba(x.view()).unwrap();
        for (pa, pb) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(pa, pb, epsilon = 1e-12);
        }
    }
}
