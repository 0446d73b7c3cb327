//! Feature engineering and the feature store.

pub mod definition;
pub mod lane_history;
pub mod online;
pub mod pipeline;
pub mod store;
pub mod table;
pub mod value;

pub use definition::{FeatureDefinition, FeatureKind};
pub use lane_history::{LaneHistory, LaneStats};
pub use online::OnlineFeatures;
pub use pipeline::FeaturePipeline;
pub use store::{FeatureRecord, FeatureStore};
pub use table::{FeatureTable, FeatureVector, Outcome};
pub use value::FeatureValue;
