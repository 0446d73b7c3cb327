//! # freightflow-core: load simulation, feature engineering and acceptance modeling
//!
//! A synthetic freight dataset flows through four stages:
//! 1. **Simulation** generates loads and carrier decisions from explicit seeds and
//!    persists each run to SQLite.
//! 2. **Dataflow** resolves named derivations in dependency order.
//! 3. **Features** computes lane and timing features over that dataflow and writes
//!    them to the feature store.
//! 4. **Modeling** trains and evaluates a logistic acceptance model and persists it
//!    as a hashed artifact.

// Foundation
pub mod config;
pub mod error;
pub mod market;

// Raw data
pub mod simulation;
pub mod storage;

// Feature engineering
pub mod dataflow;
pub mod features;

// Modeling
pub mod modeling;

// Re-exports
pub use config::{FreightConfig, load_config};
pub use error::{FreightError, Result};
pub use features::{FeaturePipeline, FeatureStore, FeatureTable, FeatureValue, FeatureVector};
pub use market::{Location, Market};
pub use modeling::{ModelArtifact, ModelingPipeline, TrainedModel};
pub use simulation::{
    CarrierDecision, CarrierSimulator, Load, LoadGenerator, SimulationCoordinator,
    SimulationRecord, SimulationRun,
};
pub use storage::SimulationStore;
