//! Training and evaluation of the acceptance classifier.

use crate::config::ModelingConfig;
use crate::error::{FreightError, Result};
use crate::features::{FeatureTable, FeatureVector};
use crate::modeling::artifact::ModelArtifact;
use crate::modeling::encoder::FeatureEncoder;
use crate::modeling::logistic::LogisticRegression;
use crate::modeling::metrics::{ClassificationMetrics, TrainingMetrics};
use serde::{Deserialize, Serialize};

/// Coefficient of one encoded input, on the standardised scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub input: String,
    pub coefficient: f64,
}

/// An encoder and classifier ready for inference.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    encoder: FeatureEncoder,
    model: LogisticRegression,
    threshold: f64,
    training: TrainingMetrics,
    train_rows: usize,
}

impl TrainedModel {
    pub(crate) fn new(
        encoder: FeatureEncoder,
        model: LogisticRegression,
        threshold: f64,
        training: TrainingMetrics,
        train_rows: usize,
    ) -> Self {
        Self {
            encoder,
            model,
            threshold,
            training,
            train_rows,
        }
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn model(&self) -> &LogisticRegression {
        &self.model
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn training(&self) -> &TrainingMetrics {
        &self.training
    }

    pub fn train_rows(&self) -> usize {
        self.train_rows
    }

    /// Encoded inputs paired with their coefficients, largest magnitude first.
    pub fn feature_importances(&self) -> Vec<FeatureImportance> {
        let mut importances: Vec<FeatureImportance> = self
            .encoder
            .input_names()
            .into_iter()
            .zip(&self.model.weights)
            .map(|(input, w)| FeatureImportance {
                input,
                coefficient: *w,
            })
            .collect();
        importances.sort_by(|a, b| {
            b.coefficient
                .abs()
                .total_cmp(&a.coefficient.abs())
                .then_with(|| a.input.cmp(&b.input))
        });
        importances
    }

    /// Acceptance probability for one feature vector.
    pub fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let x = self.encoder.transform_row(features)?;
        Ok(self.model.predict_proba(&x))
    }

    pub fn predict_batch(&self, table: &FeatureTable) -> Result<Vec<f64>> {
        let x = self.encoder.transform(table)?;
        Ok(x.iter().map(|row| self.model.predict_proba(row)).collect())
    }

    /// Whether the load is predicted to be accepted.
    pub fn classify(&self, features: &FeatureVector) -> Result<bool> {
        Ok(self.predict(features)? > self.threshold)
    }

    pub fn to_artifact(&self, evaluation: Option<ClassificationMetrics>) -> Result<ModelArtifact> {
        ModelArtifact::new(self, evaluation)
    }
}

/// Outcome of a train/evaluate split.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model: TrainedModel,
    /// `None` when no rows fall on or after the cutoff.
    pub evaluation: Option<ClassificationMetrics>,
    pub test_rows: usize,
}

pub struct ModelingPipeline {
    config: ModelingConfig,
}

impl ModelingPipeline {
    pub fn new(config: ModelingConfig) -> Result<Self> {
        validate(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ModelingConfig {
        &self.config
    }

    pub fn train(&self, table: &FeatureTable) -> Result<TrainedModel> {
        if table.is_empty() {
            return Err(FreightError::training("training table is empty"));
        }
        if table.len() < self.config.min_training_samples {
            return Err(FreightError::training(format!(
                "{} training rows, at least {} required",
                table.len(),
                self.config.min_training_samples
            )));
        }
        let y = table.target()?;
        let positives = y.iter().filter(|v| **v).count();
        if positives == 0 || positives == y.len() {
            return Err(FreightError::training(format!(
                "training labels contain a single class ({positives} of {} accepted)",
                y.len()
            )));
        }

        let encoder = FeatureEncoder::fit(table)?;
        let x = encoder.transform(table)?;
        let (model, training) = LogisticRegression::fit(&x, &y, &self.config)?;
        if !training.converged {
            tracing::warn!(
                epochs = training.epochs_completed,
                "Training stopped at the epoch limit before converging"
            );
        }
        tracing::info!(
            rows = table.len(),
            inputs = encoder.width(),
            loss = training.final_loss(),
            "Trained acceptance model"
        );
        Ok(TrainedModel::new(
            encoder,
            model,
            self.config.prediction_threshold,
            training,
            table.len(),
        ))
    }

    pub fn evaluate(
        &self,
        model: &TrainedModel,
        table: &FeatureTable,
    ) -> Result<ClassificationMetrics> {
        let y = table.target()?;
        let probabilities = model.predict_batch(table)?;
        let metrics = ClassificationMetrics::compute(
            &probabilities,
            &y,
            model.threshold(),
            self.config.calibration_bins,
        )?;
        if metrics.auc_roc.is_none() {
            tracing::warn!(rows = y.len(), "Evaluation labels contain a single class");
        }
        tracing::info!(
            rows = y.len(),
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            "Evaluated acceptance model"
        );
        Ok(metrics)
    }

    /// Train on rows picked up before the configured cutoff, evaluate on the rest.
    pub fn train_and_evaluate(&self, table: &FeatureTable) -> Result<TrainingReport> {
        let (train, test) = table.split_at(self.config.cutoff)?;
        let model = self.train(&train)?;
        let evaluation = if test.is_empty() {
            tracing::warn!(cutoff = %self.config.cutoff, "No rows on or after the cutoff to evaluate");
            None
        } else {
            Some(self.evaluate(&model, &test)?)
        };
        Ok(TrainingReport {
            model,
            evaluation,
            test_rows: test.len(),
        })
    }
}

fn validate(config: &ModelingConfig) -> Result<()> {
    if !(config.learning_rate.is_finite() && config.learning_rate > 0.0) {
        return Err(FreightError::config("learning_rate must be positive"));
    }
    if config.epochs == 0 {
        return Err(FreightError::config("epochs must be positive"));
    }
    if !(config.l2.is_finite() && config.l2 >= 0.0) {
        return Err(FreightError::config("l2 must be non-negative"));
    }
    if !(config.tolerance.is_finite() && config.tolerance >= 0.0) {
        return Err(FreightError::config("tolerance must be non-negative"));
    }
    if !(0.0..=1.0).contains(&config.prediction_threshold) {
        return Err(FreightError::config("prediction_threshold must lie in [0, 1]"));
    }
    if config.calibration_bins == 0 {
        return Err(FreightError::config("calibration_bins must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureValue, Outcome};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    /// Acceptance follows rate per mile; the second half of the days is held out.
    fn table(rows: usize) -> FeatureTable {
        let keys = (0..rows).map(|i| format!("load-{i}")).collect();
        let rates: Vec<f64> = (0..rows).map(|i| 1.0 + (i % 10) as f64 * 0.2).collect();
        let mut t = FeatureTable::new(keys);
        t.push_column(
            "rate_per_mile",
            rates.iter().map(|r| FeatureValue::Float(*r)).collect(),
        )
        .unwrap();
        t.push_column(
            "lane",
            (0..rows)
                .map(|i| FeatureValue::from(if i % 2 == 0 { "A-B" } else { "B-A" }))
                .collect(),
        )
        .unwrap();
        let outcomes = rates
            .iter()
            .enumerate()
            .map(|(i, r)| Outcome {
                pickup_date: day(1 + (i * 20 / rows) as u32),
                accepted: *r > 2.0,
            })
            .collect();
        t.with_outcomes(outcomes).unwrap()
    }

    fn config() -> ModelingConfig {
        ModelingConfig {
            cutoff: day(11),
            min_training_samples: 10,
            ..ModelingConfig::default()
        }
    }

    #[test]
    fn test_train_and_evaluate() {
        let pipeline = ModelingPipeline::new(config()).unwrap();
        let report = pipeline.train_and_evaluate(&table(60)).unwrap();
        assert_eq!(report.model.train_rows() + report.test_rows, 60);

        let metrics = report.evaluation.unwrap();
        assert!(metrics.accuracy > 0.8);
        assert!(metrics.auc_roc.unwrap() > 0.9);

        let mut high = FeatureVector::new();
        high.insert("rate_per_mile", 2.8);
        high.insert("lane", "A-B");
        let p = report.model.predict(&high).unwrap();
        assert!((0.0..=1.0).contains(&p));
        assert!(report.model.classify(&high).unwrap());
    }

    #[test]
    fn test_rate_is_the_strongest_input() {
        let pipeline = ModelingPipeline::new(config()).unwrap();
        let model = pipeline.train(&table(60)).unwrap();
        let importances = model.feature_importances();

        assert_eq!(importances.len(), model.encoder().width());
        assert_eq!(importances[0].input, "rate_per_mile");
        assert!(importances[0].coefficient > 0.0);
        assert!(
            importances
                .windows(2)
                .all(|w| w[0].coefficient.abs() >= w[1].coefficient.abs())
        );
        assert!(importances.iter().any(|i| i.input == "lane=A-B"));
    }

    #[test]
    fn test_training_errors() {
        let pipeline = ModelingPipeline::new(config()).unwrap();
        assert!(matches!(
            pipeline.train(&FeatureTable::new(Vec::new())),
            Err(FreightError::Training(_))
        ));
        assert!(matches!(
            pipeline.train(&table(5)),
            Err(FreightError::Training(_))
        ));

        let mut one_class = FeatureTable::new((0..12).map(|i| i.to_string()).collect());
        one_class
            .push_column("x", (0..12).map(|i| FeatureValue::Float(i as f64)).collect())
            .unwrap();
        let one_class = one_class
            .with_outcomes(
                (0..12)
                    .map(|_| Outcome {
                        pickup_date: day(1),
                        accepted: false,
                    })
                    .collect(),
            )
            .unwrap();
        assert!(matches!(
            pipeline.train(&one_class),
            Err(FreightError::Training(_))
        ));
    }

    #[test]
    fn test_unlabelled_table_cannot_train() {
        let pipeline = ModelingPipeline::new(config()).unwrap();
        let mut t = FeatureTable::new((0..12).map(|i| i.to_string()).collect());
        t.push_column("x", (0..12).map(|i| FeatureValue::Float(i as f64)).collect())
            .unwrap();
        assert!(matches!(pipeline.train(&t), Err(FreightError::Training(_))));
    }

    #[test]
    fn test_invalid_config() {
        let bad = ModelingConfig {
            learning_rate: 0.0,
            ..ModelingConfig::default()
        };
        assert!(matches!(
            ModelingPipeline::new(bad),
            Err(FreightError::Config(_))
        ));
        let bad = ModelingConfig {
            prediction_threshold: 1.5,
            ..ModelingConfig::default()
        };
        assert!(ModelingPipeline::new(bad).is_err());
    }

    #[test]
    fn test_training_is_deterministic() {
        let pipeline = ModelingPipeline::new(config()).unwrap();
        let a = pipeline.train(&table(40)).unwrap();
        let b = pipeline.train(&table(40)).unwrap();
        assert_eq!(a.model(), b.model());
        assert_eq!(a.encoder(), b.encoder());
    }
}
