//! L2-regularised logistic regression trained by full-batch gradient descent.

use crate::config::ModelingConfig;
use crate::error::{FreightError, Result};
use crate::modeling::metrics::TrainingMetrics;
use serde::{Deserialize, Serialize};

/// Fitted coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticRegression {
    /// Fit from zero initialisation, so identical inputs give identical coefficients.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[bool],
        config: &ModelingConfig,
    ) -> Result<(Self, TrainingMetrics)> {
        if x.len() != y.len() {
            return Err(FreightError::training(format!(
                "{} rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let width = x.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = x.iter().position(|row| row.len() != width) {
            return Err(FreightError::training(format!(
                "row {bad} has {} inputs, expected {width}",
                x[bad].len()
            )));
        }

        let n = x.len() as f64;
        let targets: Vec<f64> = y.iter().map(|&v| f64::from(u8::from(v))).collect();
        let mut model = Self {
            weights: vec![0.0; width],
            bias: 0.0,
        };
        let mut metrics = TrainingMetrics::default();
        let mut previous = f64::INFINITY;

        for epoch in 0..config.epochs {
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;
            for (row, target) in x.iter().zip(&targets) {
                let err = model.predict_proba(row) - target;
                for (g, xi) in grad_w.iter_mut().zip(row) {
                    *g += err * xi;
                }
                grad_b += err;
            }
            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                *w -= config.learning_rate * (g / n + config.l2 * *w);
            }
            model.bias -= config.learning_rate * grad_b / n;

            let loss = model.loss(x, y, config.l2);
            if !loss.is_finite() {
                return Err(FreightError::training(format!(
                    "loss diverged at epoch {epoch}"
                )));
            }
            metrics.record_epoch(loss);
            if (previous - loss).abs() < config.tolerance {
                metrics.converged = true;
                break;
            }
            previous = loss;
        }

        tracing::debug!(
            epochs = metrics.epochs_completed,
            loss = metrics.final_loss(),
            converged = metrics.converged,
            "Logistic regression fitted"
        );
        Ok((model, metrics))
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let z = self.bias
            + self
                .weights
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        sigmoid(z)
    }

    /// Mean log-loss plus the L2 penalty.
    pub fn loss(&self, x: &[Vec<f64>], y: &[bool], l2: f64) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let data = x
            .iter()
            .zip(y)
            .map(|(row, &target)| {
                let p = self.predict_proba(row).clamp(1e-15, 1.0 - 1e-15);
                if target { -p.ln() } else { -(1.0 - p).ln() }
            })
            .sum::<f64>()
            / x.len() as f64;
        let penalty = 0.5 * l2 * self.weights.iter().map(|w| w * w).sum::<f64>();
        data + penalty
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
