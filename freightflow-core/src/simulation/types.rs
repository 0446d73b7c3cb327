//! Simulation records: loads, carrier decisions and runs.

use crate::error::{FreightError, Result};
use crate::market::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A synthetic freight load offered to the carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub id: String,
    pub origin: Location,
    pub destination: Location,
    /// Road miles.
    pub distance: u32,
    /// Weight in pounds.
    pub weight: u32,
    /// Total offered dollars for the load.
    pub offered_rate: f64,
    pub pickup_time: DateTime<Utc>,
    pub posted_time: DateTime<Utc>,
}

impl Load {
    pub fn rate_per_mile(&self) -> f64 {
        if self.distance == 0 {
            0.0
        } else {
            self.offered_rate / f64::from(self.distance)
        }
    }

    /// `ORIGIN-DESTINATION` market codes.
    pub fn lane(&self) -> String {
        format!("{}-{}", self.origin.market, self.destination.market)
    }

    /// Check the attributes every downstream stage relies on.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(FreightError::data("load has an empty id"));
        }
        if self.distance == 0 {
            return Err(FreightError::data(format!("load {} has zero distance", self.id)));
        }
        if self.weight == 0 {
            return Err(FreightError::data(format!("load {} has zero weight", self.id)));
        }
        if !self.offered_rate.is_finite() || self.offered_rate < 0.0 {
            return Err(FreightError::data(format!(
                "load {} has invalid offered rate {}",
                self.id, self.offered_rate
            )));
        }
        if self.posted_time > self.pickup_time {
            return Err(FreightError::data(format!(
                "load {} was posted after its pickup time",
                self.id
            )));
        }
        Ok(())
    }
}

/// The carrier's answer to one load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierDecision {
    pub load_id: String,
    pub accepted: bool,
    pub decision_time: DateTime<Utc>,
}

/// A load joined with its decision, as persisted in the raw database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub run_id: String,
    pub load: Load,
    pub decision: CarrierDecision,
}

impl SimulationRecord {
    /// Join a load with its decision. The decision must reference the load.
    pub fn join(run_id: &str, load: Load, decision: CarrierDecision) -> Result<Self> {
        if decision.load_id != load.id {
            return Err(FreightError::data(format!(
                "decision for {} paired with load {}",
                decision.load_id, load.id
            )));
        }
        Ok(Self {
            run_id: run_id.to_string(),
            load,
            decision,
        })
    }
}

/// Metadata for one invocation of the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub run_id: String,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub load_count: usize,
    pub accepted_count: usize,
}

impl SimulationRun {
    pub fn acceptance_rate(&self) -> f64 {
        if self.load_count == 0 {
            0.0
        } else {
            self.accepted_count as f64 / self.load_count as f64
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::load;
    use super::*;
    use crate::market::Market;

    #[test]
    fn test_rate_per_mile_and_lane() {
        let l = load("a", Market::CaLax, Market::CaStk, 2.5);
        assert!((l.rate_per_mile() - 2.5).abs() < 1e-12);
        assert_eq!(l.lane(), "CA_LAX-CA_STK");
    }

    #[test]
    fn test_validate_rejects_missing_attributes() {
        let mut l = load("a", Market::CaLax, Market::CaStk, 2.5);
        assert!(l.validate().is_ok());
        l.distance = 0;
        assert!(matches!(l.validate(), Err(FreightError::Data(_))));

        let mut l = load("", Market::CaLax, Market::CaStk, 2.5);
        assert!(l.validate().is_err());
        l.id = "b".into();
        l.offered_rate = f64::NAN;
        assert!(l.validate().is_err());
    }

    #[test]
    fn test_join_requires_matching_ids() {
        let l = load("a", Market::CaLax, Market::CaStk, 2.5);
        let decision = CarrierDecision {
            load_id: "other".into(),
            accepted: true,
            decision_time: l.posted_time,
        };
        assert!(SimulationRecord::join("run", l, decision).is_err());
    }
}
