//! Persistent raw simulation output.

pub mod raw;

pub use raw::SimulationStore;
