//! Online feature computation for a single new load.

use crate::error::{FreightError, Result};
use crate::features::pipeline::FeaturePipeline;
use crate::features::table::FeatureVector;
use crate::simulation::types::{Load, SimulationRecord};
use std::iter;

/// Computes features for unseen loads against a fixed history.
///
/// The new load goes through the same dataflow as the offline pipeline. Its outcome is
/// unknown; lagged features only look at earlier pickup days, so the placeholder never
/// reaches a value.
pub struct OnlineFeatures<'a> {
    pipeline: &'a FeaturePipeline,
    history: &'a [SimulationRecord],
}

impl<'a> OnlineFeatures<'a> {
    pub fn new(pipeline: &'a FeaturePipeline, history: &'a [SimulationRecord]) -> Self {
        Self { pipeline, history }
    }

    pub fn compute(&self, load: &Load) -> Result<FeatureVector> {
        let rows = self
            .history
            .iter()
            .map(|r| (&r.load, r.decision.accepted))
            .chain(iter::once((load, false)));
        let table = self.pipeline.compute_rows(rows)?;
        table
            .row(table.len().saturating_sub(1))
            .ok_or_else(|| FreightError::data(format!("no features computed for load {}", load.id)))
    }
}
