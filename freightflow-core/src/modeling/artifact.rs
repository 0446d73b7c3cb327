//! Persisted model artifacts.

use crate::error::{FreightError, Result};
use crate::modeling::encoder::FeatureEncoder;
use crate::modeling::logistic::LogisticRegression;
use crate::modeling::metrics::{ClassificationMetrics, TrainingMetrics};
use crate::modeling::pipeline::{FeatureImportance, TrainedModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// A trained model with everything needed to score new loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub encoder: FeatureEncoder,
    pub model: LogisticRegression,
    pub prediction_threshold: f64,
    pub training: TrainingMetrics,
    pub evaluation: Option<ClassificationMetrics>,
    /// Derived from the coefficients; not covered by the hash.
    #[serde(default)]
    pub feature_importances: Vec<FeatureImportance>,
    pub train_rows: usize,
    /// SHA-256 over the encoder and coefficients.
    pub hash: String,
}

impl ModelArtifact {
    pub fn new(model: &TrainedModel, evaluation: Option<ClassificationMetrics>) -> Result<Self> {
        let hash = content_hash(model.encoder(), model.model())?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            feature_names: model
                .encoder()
                .features()
                .iter()
                .map(|f| f.name.clone())
                .collect(),
            encoder: model.encoder().clone(),
            model: model.model().clone(),
            prediction_threshold: model.threshold(),
            training: model.training().clone(),
            evaluation,
            feature_importances: model.feature_importances(),
            train_rows: model.train_rows(),
            hash,
        })
    }

    /// Write as pretty JSON through a `.tmp` sibling and a rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), id = %self.id, "Saved model artifact");
        Ok(())
    }

    /// Read an artifact and verify its content hash.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FreightError::not_found(format!(
                "model artifact {}; train a model first",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&text)?;
        let actual = content_hash(&artifact.encoder, &artifact.model)?;
        if actual != artifact.hash {
            return Err(FreightError::model(format!(
                "hash mismatch for {}: recorded {}, computed {actual}",
                path.display(),
                artifact.hash
            )));
        }
        Ok(artifact)
    }

    pub fn into_model(self) -> TrainedModel {
        TrainedModel::new(
            self.encoder,
            self.model,
            self.prediction_threshold,
            self.training,
            self.train_rows,
        )
    }
}

fn content_hash(encoder: &FeatureEncoder, model: &LogisticRegression) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(encoder)?);
    hasher.update(serde_json::to_vec(model)?);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureTable, FeatureValue};

    fn trained() -> TrainedModel {
        let mut table = FeatureTable::new(vec!["a".into(), "b".into()]);
        table
            .push_column("rate", vec![FeatureValue::Float(1.0), FeatureValue::Float(3.0)])
            .unwrap();
        let encoder = FeatureEncoder::fit(&table).unwrap();
        let model = LogisticRegression {
            weights: vec![1.5],
            bias: -0.2,
        };
        TrainedModel::new(encoder, model, 0.5, TrainingMetrics::default(), 2)
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("m.json");
        let artifact = trained().to_artifact(None).unwrap();
        artifact.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.hash, artifact.hash);
        assert_eq!(loaded.feature_names, vec!["rate".to_string()]);
        assert_eq!(loaded.feature_importances, trained().feature_importances());
        assert_eq!(loaded.feature_importances[0].coefficient, 1.5);
        assert_eq!(loaded.into_model().model(), trained().model());
    }

    #[test]
    fn test_tampered_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        let mut artifact = trained().to_artifact(None).unwrap();
        artifact.model.bias = 4.0;
        artifact.save(&path).unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(FreightError::Model(_))
        ));
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelArtifact::load(&dir.path().join("absent.json")),
            Err(FreightError::NotFound(_))
        ));
    }
}
