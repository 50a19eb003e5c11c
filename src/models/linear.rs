//! Linear predictors: softmax classifier and ridge regressor.
//!
//! Both operate on standardized features. The standardization is learned on
//! the train partition and travels with the fitted model, so scoring a raw
//! [`FeatureVector`](crate::features::FeatureVector) needs nothing else.

use crate::features::FEATURE_COUNT;
use crate::game::PlayCall;
use crate::training::CancellationToken;
use crate::{DecisionServiceError, Result};

/// Hyperparameters for gradient-based fitting.
#[derive(Debug, Clone, Copy)]
pub struct FitParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

/// Per-feature centering and scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl Standardizer {
    /// Learn means and standard deviations; constant features keep scale 1.
    pub fn fit(rows: &[[f64; FEATURE_COUNT]]) -> Self {
        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];
        if rows.is_empty() {
            return Self { mean, scale };
        }
        let n = rows.len() as f64;
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        for j in 0..FEATURE_COUNT {
            let var = rows.iter().map(|r| (r[j] - mean[j]).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            scale[j] = if std > 1e-9 { std } else { 1.0 };
        }
        Self { mean, scale }
    }

    pub fn from_parts(mean: [f64; FEATURE_COUNT], scale: [f64; FEATURE_COUNT]) -> Result<Self> {
        if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) || mean.iter().any(|m| !m.is_finite()) {
            return Err(DecisionServiceError::Artifact(
                "standardizer must have finite means and positive scales".to_string(),
            ));
        }
        Ok(Self { mean, scale })
    }

    pub fn apply(&self, x: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            out[j] = (x[j] - self.mean[j]) / self.scale[j];
        }
        out
    }

    pub fn mean(&self) -> &[f64; FEATURE_COUNT] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; FEATURE_COUNT] {
        &self.scale
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn dot(w: &[f64; FEATURE_COUNT], x: &[f64; FEATURE_COUNT]) -> f64 {
    w.iter().zip(x).map(|(a, b)| a * b).sum()
}

/// Multinomial logistic regression over [`PlayCall`] options.
///
/// Logits are divided by `temperature` before the softmax. The temperature
/// starts at 1 and is fitted on held-out data by [`SoftmaxClassifier::calibrate`].
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxClassifier {
    labels: Vec<PlayCall>,
    weights: Vec<[f64; FEATURE_COUNT]>,
    bias: Vec<f64>,
    standardizer: Standardizer,
    temperature: f64,
}

/// Search interval of the calibration temperature
const TEMPERATURE_RANGE: (f64, f64) = (0.05, 20.0);

impl SoftmaxClassifier {
    /// Full-batch gradient descent from a zero initialisation.
    ///
    /// `targets` index into `labels`. Cancellation is checked once per epoch.
    pub fn fit(
        rows: &[[f64; FEATURE_COUNT]],
        targets: &[usize],
        labels: Vec<PlayCall>,
        params: &FitParams,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        if rows.is_empty() || rows.len() != targets.len() {
            return Err(DecisionServiceError::InvalidConfig(format!(
                "classifier needs matching rows and targets, got {} and {}",
                rows.len(),
                targets.len()
            )));
        }
        if let Some(t) = targets.iter().find(|t| **t >= labels.len()) {
            return Err(DecisionServiceError::InvalidConfig(format!(
                "target index {} outside {} labels",
                t,
                labels.len()
            )));
        }

        let standardizer = Standardizer::fit(rows);
        let xs: Vec<[f64; FEATURE_COUNT]> = rows.iter().map(|r| standardizer.apply(r)).collect();
        let classes = labels.len();
        let n = xs.len() as f64;

        let mut weights = vec![[0.0; FEATURE_COUNT]; classes];
        let mut bias = vec![0.0; classes];

        for _epoch in 0..params.epochs {
            cancel.check()?;

            let mut grad_w = vec![[0.0; FEATURE_COUNT]; classes];
            let mut grad_b = vec![0.0; classes];
            for (x, &target) in xs.iter().zip(targets) {
                let logits: Vec<f64> = (0..classes).map(|c| dot(&weights[c], x) + bias[c]).collect();
                let probs = softmax(&logits);
                for c in 0..classes {
                    let err = probs[c] - if c == target { 1.0 } else { 0.0 };
                    grad_b[c] += err;
                    for j in 0..FEATURE_COUNT {
                        grad_w[c][j] += err * x[j];
                    }
                }
            }
            for c in 0..classes {
                for j in 0..FEATURE_COUNT {
                    weights[c][j] -=
                        params.learning_rate * (grad_w[c][j] / n + params.l2 * weights[c][j]);
                }
                bias[c] -= params.learning_rate * grad_b[c] / n;
            }
        }

        Ok(Self {
            labels,
            weights,
            bias,
            standardizer,
            temperature: 1.0,
        })
    }

    pub fn from_parts(
        labels: Vec<PlayCall>,
        weights: Vec<[f64; FEATURE_COUNT]>,
        bias: Vec<f64>,
        standardizer: Standardizer,
    ) -> Result<Self> {
        if labels.is_empty() || labels.len() != weights.len() || labels.len() != bias.len() {
            return Err(DecisionServiceError::Artifact(format!(
                "classifier shape mismatch: {} labels, {} weight rows, {} biases",
                labels.len(),
                weights.len(),
                bias.len()
            )));
        }
        Ok(Self {
            labels,
            weights,
            bias,
            standardizer,
            temperature: 1.0,
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Result<Self> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(DecisionServiceError::Artifact(format!(
                "temperature must be positive, got {}",
                temperature
            )));
        }
        self.temperature = temperature;
        Ok(self)
    }

    fn logits(&self, x: &[f64; FEATURE_COUNT]) -> Vec<f64> {
        let z = self.standardizer.apply(x);
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| dot(w, &z) + b)
            .collect()
    }

    /// Class probabilities in `labels()` order; they sum to 1.
    pub fn predict_proba(&self, x: &[f64; FEATURE_COUNT]) -> Vec<f64> {
        let scaled: Vec<f64> = self.logits(x).iter().map(|l| l / self.temperature).collect();
        softmax(&scaled)
    }

    /// Temperature scaling: pick the temperature minimising the log loss of
    /// `rows` (golden-section search over log-temperature). Weights are untouched,
    /// so the ranking of options never changes.
    pub fn calibrate(mut self, rows: &[[f64; FEATURE_COUNT]], targets: &[usize]) -> Self {
        if rows.is_empty() || rows.len() != targets.len() {
            return self;
        }
        let logits: Vec<Vec<f64>> = rows.iter().map(|r| self.logits(r)).collect();
        let loss = |log_t: f64| -> f64 {
            let t = log_t.exp();
            logits
                .iter()
                .zip(targets)
                .map(|(l, &target)| {
                    let scaled: Vec<f64> = l.iter().map(|v| v / t).collect();
                    -softmax(&scaled)
                        .get(target)
                        .copied()
                        .unwrap_or(0.0)
                        .max(1e-15)
                        .ln()
                })
                .sum()
        };

        let ratio = (5f64.sqrt() - 1.0) / 2.0;
        let (mut lo, mut hi) = (TEMPERATURE_RANGE.0.ln(), TEMPERATURE_RANGE.1.ln());
        let mut a = hi - ratio * (hi - lo);
        let mut b = lo + ratio * (hi - lo);
        let (mut fa, mut fb) = (loss(a), loss(b));
        for _ in 0..60 {
            if fa < fb {
                hi = b;
                b = a;
                fb = fa;
                a = hi - ratio * (hi - lo);
                fa = loss(a);
            } else {
                lo = a;
                a = b;
                fa = fb;
                b = lo + ratio * (hi - lo);
                fb = loss(b);
            }
        }
        let fitted = ((lo + hi) / 2.0).exp();
        if loss(fitted.ln()) <= loss(0.0) {
            self.temperature = fitted;
        }
        self
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn labels(&self) -> &[PlayCall] {
        &self.labels
    }

    pub fn weights(&self) -> &[[f64; FEATURE_COUNT]] {
        &self.weights
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }

    pub fn standardizer(&self) -> &Standardizer {
        &self.standardizer
    }
}

/// Ridge regression with a Gaussian residual model for intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegressor {
    weights: [f64; FEATURE_COUNT],
    bias: f64,
    residual_std: f64,
    standardizer: Standardizer,
}

impl LinearRegressor {
    /// Closed-form ridge fit on standardized, centered features.
    pub fn fit(rows: &[[f64; FEATURE_COUNT]], targets: &[f64], l2: f64) -> Result<Self> {
        if rows.is_empty() || rows.len() != targets.len() {
            return Err(DecisionServiceError::InvalidConfig(format!(
                "regressor needs matching rows and targets, got {} and {}",
                rows.len(),
                targets.len()
            )));
        }
        let standardizer = Standardizer::fit(rows);
        let xs: Vec<[f64; FEATURE_COUNT]> = rows.iter().map(|r| standardizer.apply(r)).collect();
        let n = xs.len() as f64;
        let y_mean = targets.iter().sum::<f64>() / n;

        // (XᵀX / n + λI) w = Xᵀy / n
        let ridge = l2.max(1e-8);
        let mut a = vec![vec![0.0; FEATURE_COUNT + 1]; FEATURE_COUNT];
        for (x, y) in xs.iter().zip(targets) {
            for i in 0..FEATURE_COUNT {
                for j in 0..FEATURE_COUNT {
                    a[i][j] += x[i] * x[j] / n;
                }
                a[i][FEATURE_COUNT] += x[i] * (y - y_mean) / n;
            }
        }
        for (i, row) in a.iter_mut().enumerate() {
            row[i] += ridge;
        }
        let solution = solve_augmented(a)?;
        let mut weights = [0.0; FEATURE_COUNT];
        weights.copy_from_slice(&solution);

        let mut model = Self {
            weights,
            bias: y_mean,
            residual_std: 0.0,
            standardizer,
        };
        let sse: f64 = rows
            .iter()
            .zip(targets)
            .map(|(r, y)| (model.predict(r) - y).powi(2))
            .sum();
        model.residual_std = (sse / n).sqrt();
        Ok(model)
    }

    pub fn from_parts(
        weights: [f64; FEATURE_COUNT],
        bias: f64,
        residual_std: f64,
        standardizer: Standardizer,
    ) -> Result<Self> {
        if !bias.is_finite() || !residual_std.is_finite() || residual_std < 0.0 {
            return Err(DecisionServiceError::Artifact(
                "regressor bias and residual std must be finite".to_string(),
            ));
        }
        Ok(Self {
            weights,
            bias,
            residual_std,
            standardizer,
        })
    }

    pub fn predict(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        dot(&self.weights, &self.standardizer.apply(x)) + self.bias
    }

    pub fn weights(&self) -> &[f64; FEATURE_COUNT] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn residual_std(&self) -> f64 {
        self.residual_std
    }

    pub fn standardizer(&self) -> &Standardizer {
        &self.standardizer
    }
}

/// Gauss-Jordan elimination with partial pivoting on an `n x (n+1)` system.
fn solve_augmented(mut a: Vec<Vec<f64>>) -> Result<Vec<f64>> {
    let n = a.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(DecisionServiceError::Artifact(
                "singular normal equations".to_string(),
            ));
        }
        a.swap(col, pivot);
        let p = a[col][col];
        for v in a[col].iter_mut() {
            *v /= p;
        }
        for row in 0..n {
            if row != col {
                let factor = a[row][col];
                if factor != 0.0 {
                    for k in col..=n {
                        a[row][k] -= factor * a[col][k];
                    }
                }
            }
        }
    }
    Ok(a.into_iter().map(|row| row[n]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[(usize, f64)]) -> [f64; FEATURE_COUNT] {
        let mut r = [0.0; FEATURE_COUNT];
        for (i, v) in values {
            r[*i] = *v;
        }
        r
    }

    #[test]
    fn test_standardizer_constant_feature_keeps_unit_scale() {
        let rows = vec![row(&[(0, 1.0)]), row(&[(0, 3.0)])];
        let s = Standardizer::fit(&rows);
        assert_eq!(s.mean()[0], 2.0);
        assert_eq!(s.scale()[0], 1.0);
        assert_eq!(s.scale()[1], 1.0);
        assert_eq!(s.apply(&rows[0])[0], -1.0);
    }

    #[test]
    fn test_classifier_separates_simple_classes() {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..60 {
            let v = i as f64 / 60.0;
            rows.push(row(&[(2, v)]));
            targets.push(if v < 0.33 { 0 } else if v < 0.66 { 1 } else { 2 });
        }
        let params = FitParams {
            epochs: 500,
            learning_rate: 0.5,
            l2: 0.0,
        };
        let model = SoftmaxClassifier::fit(
            &rows,
            &targets,
            PlayCall::ALL.to_vec(),
            &params,
            &CancellationToken::new(),
        )
        .unwrap();

        let low = model.predict_proba(&row(&[(2, 0.05)]));
        let high = model.predict_proba(&row(&[(2, 0.95)]));
        assert!((low.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(low[0] > low[2]);
        assert!(high[2] > high[0]);
    }

    #[test]
    fn test_classifier_fit_honours_cancellation() {
        let rows = vec![row(&[(0, 1.0)]), row(&[(0, 2.0)])];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let params = FitParams {
            epochs: 10,
            learning_rate: 0.1,
            l2: 0.0,
        };
        let err = SoftmaxClassifier::fit(&rows, &[0, 1], PlayCall::ALL.to_vec(), &params, &cancel)
            .unwrap_err();
        assert!(matches!(err, DecisionServiceError::Cancelled));
    }

    #[test]
    fn test_regressor_recovers_linear_relation() {
        let rows: Vec<_> = (0..50)
            .map(|i| row(&[(1, i as f64), (3, (i % 7) as f64)]))
            .collect();
        let targets: Vec<f64> = rows.iter().map(|r| 2.0 * r[1] - 0.5 * r[3] + 1.0).collect();
        let model = LinearRegressor::fit(&rows, &targets, 1e-9).unwrap();
        let sample = row(&[(1, 10.0), (3, 4.0)]);
        assert!((model.predict(&sample) - 19.0).abs() < 1e-3);
        assert!(model.residual_std() < 1e-3);
    }

    #[test]
    fn test_calibration_softens_overconfident_logits() {
        // Bias favours label 0 by 3 logits, but it is right only half the time
        let model = SoftmaxClassifier::from_parts(
            PlayCall::ALL.to_vec(),
            vec![[0.0; FEATURE_COUNT]; 3],
            vec![3.0, 0.0, 0.0],
            Standardizer::from_parts([0.0; FEATURE_COUNT], [1.0; FEATURE_COUNT]).unwrap(),
        )
        .unwrap();
        let rows = vec![row(&[]); 8];
        let targets = [0, 0, 0, 0, 1, 1, 2, 2];

        let calibrated = model.clone().calibrate(&rows, &targets);
        // exact optimum: 3 / ln 2
        assert!((calibrated.temperature() - 3.0 / 2f64.ln()).abs() < 0.05);
        let p = calibrated.predict_proba(&row(&[]));
        assert!((p[0] - 0.5).abs() < 0.01);
        assert!(p[0] > p[1]);
        assert_eq!(model.temperature(), 1.0);
    }

    #[test]
    fn test_temperature_must_be_positive() {
        let s = Standardizer::fit(&[row(&[])]);
        let model = SoftmaxClassifier::from_parts(
            PlayCall::ALL.to_vec(),
            vec![[0.0; FEATURE_COUNT]; 3],
            vec![0.0; 3],
            s,
        )
        .unwrap();
        assert!(model.clone().with_temperature(0.0).is_err());
        assert!(model.clone().with_temperature(f64::NAN).is_err());
        assert_eq!(model.with_temperature(2.0).unwrap().temperature(), 2.0);
    }

    #[test]
    fn test_from_parts_rejects_shape_mismatch() {
        let s = Standardizer::fit(&[row(&[])]);
        let err = SoftmaxClassifier::from_parts(PlayCall::ALL.to_vec(), vec![[0.0; FEATURE_COUNT]], vec![0.0], s)
            .unwrap_err();
        assert!(matches!(err, DecisionServiceError::Artifact(_)));
    }
}
