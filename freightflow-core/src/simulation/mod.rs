//! Load and carrier-decision simulation.

pub mod carrier;
pub mod coordinator;
pub mod load;
pub mod reproducibility;
pub mod types;

pub use carrier::{CarrierSimulator, DecisionRule, LanePreference, LaneRule};
pub use coordinator::SimulationCoordinator;
pub use load::LoadGenerator;
pub use reproducibility::SeedManager;
pub use types::{CarrierDecision, Load, SimulationRecord, SimulationRun};
