//! Acceptance modeling: encoding, logistic regression, metrics and artifacts.

pub mod artifact;
pub mod encoder;
pub mod logistic;
pub mod metrics;
pub mod pipeline;

pub use artifact::ModelArtifact;
pub use encoder::{EncodedFeature, Encoding, FeatureEncoder};
pub use logistic::LogisticRegression;
pub use metrics::{ClassificationMetrics, ConfusionMatrix, TrainingMetrics};
pub use pipeline::{FeatureImportance, ModelingPipeline, TrainedModel, TrainingReport};
