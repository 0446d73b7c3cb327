//! Training and classification metrics.

use crate::error::{FreightError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Probabilities are clipped to this distance from 0 and 1 before taking logs.
const EPS: f64 = 1e-15;

/// Loss history of one training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub converged: bool,
}

impl TrainingMetrics {
    pub fn record_epoch(&mut self, loss: f64) {
        self.loss_history.push(loss);
        self.epochs_completed += 1;
        if self.best_loss.is_none_or(|best| loss < best) {
            self.best_loss = Some(loss);
            self.best_epoch = Some(self.epochs_completed);
        }
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

/// Binary confusion counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// `[[tn, fp], [fn, tp]]`.
    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negatives, self.false_positives],
            [self.false_negatives, self.true_positives],
        ]
    }
}

/// Evaluation metrics for an acceptance classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// `None` when the labels contain a single class.
    pub average_precision: Option<f64>,
    pub auc_roc: Option<f64>,
    pub log_loss: f64,
    pub brier_score: f64,
    pub expected_calibration_error: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub support: usize,
    pub positive_rate: f64,
}

impl ClassificationMetrics {
    /// Score predicted probabilities against labels. A row is predicted positive when its
    /// probability exceeds `threshold`.
    pub fn compute(
        probabilities: &[f64],
        targets: &[bool],
        threshold: f64,
        calibration_bins: usize,
    ) -> Result<Self> {
        if probabilities.len() != targets.len() {
            return Err(FreightError::training(format!(
                "{} predictions for {} labels",
                probabilities.len(),
                targets.len()
            )));
        }
        if probabilities.is_empty() {
            return Err(FreightError::training("cannot evaluate on an empty table"));
        }
        if probabilities.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(FreightError::training("predicted probabilities must lie in [0, 1]"));
        }

        let mut cm = ConfusionMatrix::default();
        for (&p, &y) in probabilities.iter().zip(targets) {
            match (p > threshold, y) {
                (true, true) => cm.true_positives += 1,
                (true, false) => cm.false_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (false, true) => cm.false_negatives += 1,
            }
        }

        let n = targets.len() as f64;
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(cm.true_positives, cm.true_positives + cm.false_positives);
        let recall = ratio(cm.true_positives, cm.true_positives + cm.false_negatives);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        let log_loss = probabilities
            .iter()
            .zip(targets)
            .map(|(&p, &y)| {
                let p = p.clamp(EPS, 1.0 - EPS);
                if y { -p.ln() } else { -(1.0 - p).ln() }
            })
            .sum::<f64>()
            / n;
        let brier_score = probabilities
            .iter()
            .zip(targets)
            .map(|(&p, &y)| (p - f64::from(u8::from(y))).powi(2))
            .sum::<f64>()
            / n;

        let positives = targets.iter().filter(|y| **y).count();
        let single_class = positives == 0 || positives == targets.len();

        Ok(Self {
            accuracy: ratio(cm.true_positives + cm.true_negatives, cm.total()),
            precision,
            recall,
            f1_score,
            average_precision: (!single_class).then(|| average_precision(probabilities, targets)),
            auc_roc: (!single_class).then(|| auc_roc(probabilities, targets)),
            log_loss,
            brier_score,
            expected_calibration_error: expected_calibration_error(
                probabilities,
                targets,
                calibration_bins.max(1),
            ),
            confusion_matrix: cm,
            support: targets.len(),
            positive_rate: positives as f64 / n,
        })
    }
}

/// Indices sorted by descending score.
fn ranked(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order
}

/// Area under the precision-recall curve as a step function over distinct thresholds.
fn average_precision(scores: &[f64], targets: &[bool]) -> f64 {
    let order = ranked(scores);
    let positives = targets.iter().filter(|y| **y).count() as f64;
    let (mut tp, mut fp) = (0.0, 0.0);
    let mut last_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let score = scores[order[i]];
        // Ties share one threshold.
        while i < order.len() && scores[order[i]] == score {
            if targets[order[i]] {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        let recall = tp / positives;
        let precision = tp / (tp + fp);
        ap += (recall - last_recall) * precision;
        last_recall = recall;
    }
    ap
}

/// ROC AUC via the rank-sum statistic, with tied scores sharing their average rank.
fn auc_roc(scores: &[f64], targets: &[bool]) -> f64 {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = rank;
        }
        i = j + 1;
    }

    let positives = targets.iter().filter(|y| **y).count() as f64;
    let negatives = targets.len() as f64 - positives;
    let rank_sum: f64 = ranks
        .iter()
        .zip(targets)
        .filter(|(_, y)| **y)
        .map(|(r, _)| *r)
        .sum();
    (rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
}

/// Weighted gap between mean confidence and observed frequency over equal-width bins.
fn expected_calibration_error(scores: &[f64], targets: &[bool], bins: usize) -> f64 {
    let mut count = vec![0usize; bins];
    let mut confidence = vec![0.0; bins];
    let mut observed = vec![0.0; bins];
    for (&p, &y) in scores.iter().zip(targets) {
        let bin = ((p * bins as f64) as usize).min(bins - 1);
        count[bin] += 1;
        confidence[bin] += p;
        observed[bin] += f64::from(u8::from(y));
    }
    let n = scores.len() as f64;
    (0..bins)
        .filter(|&b| count[b] > 0)
        .map(|b| {
            let c = count[b] as f64;
            (c / n) * (confidence[b] / c - observed[b] / c).abs()
        })
        .sum()
}
