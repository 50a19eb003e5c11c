//! Evaluation metrics and the quality verdict.

use serde::{Deserialize, Serialize};

use crate::game::PlayCall;

/// Number of equal-width confidence bins for calibration error
pub const CALIBRATION_BINS: usize = 10;
/// z-score of the two-sided 95% prediction interval
pub const INTERVAL_Z: f64 = 1.96;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    /// Multi-class Brier score (sum over options, averaged over examples)
    pub brier: f64,
    pub log_loss: f64,
    /// Expected calibration error over [`CALIBRATION_BINS`] bins
    pub calibration_error: f64,
    pub examples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    /// Share of validation targets inside the 95% interval
    pub interval_coverage: f64,
    pub examples: usize,
}

/// Metrics of whichever model family was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvaluationMetrics {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
}

impl EvaluationMetrics {
    /// Headline number: accuracy for classifiers, RMSE for regressors
    pub fn headline(&self) -> (&'static str, f64) {
        match self {
            EvaluationMetrics::Classification(m) => ("accuracy", m.accuracy),
            EvaluationMetrics::Regression(m) => ("rmse", m.rmse),
        }
    }
}

/// Outcome of checking metrics against a quality floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub passed: bool,
    /// Human-readable floor, e.g. `accuracy >= 0.55`
    pub floor: String,
    /// Numeric bound of the floor
    pub threshold: f64,
    /// Operator accepted the artifact despite a failed floor
    #[serde(default)]
    pub forced: bool,
}

impl QualityVerdict {
    pub fn new(passed: bool, floor: impl Into<String>, threshold: f64) -> Self {
        Self {
            passed,
            floor: floor.into(),
            threshold,
            forced: false,
        }
    }
}

/// Evaluate predicted probabilities (rows in `labels` order) against true label indices.
pub fn classification_metrics(
    probabilities: &[Vec<f64>],
    targets: &[usize],
    labels: &[PlayCall],
) -> ClassificationMetrics {
    let n = targets.len();
    if n == 0 {
        return ClassificationMetrics {
            accuracy: 0.0,
            macro_f1: 0.0,
            brier: 0.0,
            log_loss: 0.0,
            calibration_error: 0.0,
            examples: 0,
        };
    }
    let classes = labels.len();
    let mut correct = 0usize;
    let mut brier = 0.0;
    let mut log_loss = 0.0;
    let mut tp = vec![0usize; classes];
    let mut fp = vec![0usize; classes];
    let mut fn_ = vec![0usize; classes];
    let mut bin_count = [0usize; CALIBRATION_BINS];
    let mut bin_conf = [0.0f64; CALIBRATION_BINS];
    let mut bin_hits = [0usize; CALIBRATION_BINS];

    for (probs, &target) in probabilities.iter().zip(targets) {
        let predicted = argmax(probs);
        let hit = predicted == target;
        if hit {
            correct += 1;
            tp[target] += 1;
        } else {
            fp[predicted] += 1;
            fn_[target] += 1;
        }

        for (c, p) in probs.iter().enumerate() {
            let y = if c == target { 1.0 } else { 0.0 };
            brier += (p - y).powi(2);
        }
        log_loss -= probs[target].clamp(1e-15, 1.0).ln();

        let confidence = probs[predicted];
        let bin = ((confidence * CALIBRATION_BINS as f64) as usize).min(CALIBRATION_BINS - 1);
        bin_count[bin] += 1;
        bin_conf[bin] += confidence;
        if hit {
            bin_hits[bin] += 1;
        }
    }

    let nf = n as f64;
    let f1s: Vec<f64> = (0..classes)
        .map(|c| {
            let denom = 2 * tp[c] + fp[c] + fn_[c];
            if denom == 0 {
                0.0
            } else {
                2.0 * tp[c] as f64 / denom as f64
            }
        })
        .collect();
    let calibration_error = (0..CALIBRATION_BINS)
        .filter(|&b| bin_count[b] > 0)
        .map(|b| {
            let count = bin_count[b] as f64;
            (count / nf) * (bin_hits[b] as f64 / count - bin_conf[b] / count).abs()
        })
        .sum();

    ClassificationMetrics {
        accuracy: correct as f64 / nf,
        macro_f1: f1s.iter().sum::<f64>() / classes.max(1) as f64,
        brier: brier / nf,
        log_loss: log_loss / nf,
        calibration_error,
        examples: n,
    }
}

pub fn regression_metrics(predictions: &[f64], targets: &[f64], residual_std: f64) -> RegressionMetrics {
    let n = targets.len();
    if n == 0 {
        return RegressionMetrics {
            rmse: 0.0,
            mae: 0.0,
            interval_coverage: 0.0,
            examples: 0,
        };
    }
    let half_width = INTERVAL_Z * residual_std;
    let mut sse = 0.0;
    let mut sae = 0.0;
    let mut covered = 0usize;
    for (p, y) in predictions.iter().zip(targets) {
        let err = p - y;
        sse += err * err;
        sae += err.abs();
        if err.abs() <= half_width {
            covered += 1;
        }
    }
    let nf = n as f64;
    RegressionMetrics {
        rmse: (sse / nf).sqrt(),
        mae: sae / nf,
        interval_coverage: covered as f64 / nf,
        examples: n,
    }
}

/// Index of the largest value; ties go to the lower index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_classifier() {
        let probs = vec![vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]];
        let m = classification_metrics(&probs, &[0, 2], &PlayCall::ALL);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.brier, 0.0);
        assert!(m.log_loss < 1e-12);
        assert!(m.calibration_error < 1e-12);
        // GO never occurs, so its F1 is 0 and drags the macro average
        assert!((m.macro_f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_classifier_calibration() {
        let third = 1.0 / 3.0;
        let probs = vec![vec![third; 3]; 3];
        let m = classification_metrics(&probs, &[0, 1, 2], &PlayCall::ALL);
        assert!((m.accuracy - third).abs() < 1e-12);
        assert!((m.log_loss - 3f64.ln()).abs() < 1e-9);
        assert!(m.calibration_error < 1e-9);
    }

    #[test]
    fn test_regression_metrics() {
        let m = regression_metrics(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0], 1.0);
        assert!((m.mae - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.rmse - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((m.interval_coverage - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_argmax_prefers_first_on_tie() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
        assert_eq!(argmax(&[0.1, 0.2, 0.7]), 2);
    }

    #[test]
    fn test_metrics_serialize_with_type_tag() {
        let m = EvaluationMetrics::Regression(regression_metrics(&[1.0], &[1.0], 0.5));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["type"], "regression");
        assert_eq!(m.headline().0, "rmse");
    }
}
