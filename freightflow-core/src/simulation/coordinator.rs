//! Simulation coordinator: generate loads, decide them, persist the joined rows.

use crate::config::{CarrierConfig, SimulationConfig};
use crate::error::{FreightError, Result};
use crate::simulation::carrier::CarrierSimulator;
use crate::simulation::load::LoadGenerator;
use crate::simulation::reproducibility::SeedManager;
use crate::simulation::types::{CarrierDecision, Load, SimulationRecord, SimulationRun};
use crate::storage::SimulationStore;
use chrono::{DateTime, Utc};

const LOAD_GENERATOR: &str = "load_generator";
const CARRIER: &str = "carrier";

/// Drives one simulation run into a borrowed raw store.
pub struct SimulationCoordinator<'a> {
    simulation: SimulationConfig,
    carrier: CarrierConfig,
    store: &'a mut SimulationStore,
}

impl<'a> SimulationCoordinator<'a> {
    pub fn new(
        simulation: &SimulationConfig,
        carrier: &CarrierConfig,
        store: &'a mut SimulationStore,
    ) -> Self {
        Self {
            simulation: simulation.clone(),
            carrier: carrier.clone(),
            store,
        }
    }

    /// Generate `count` loads across the pickup window and persist them as one run.
    pub fn run(&mut self, count: usize) -> Result<SimulationRun> {
        let started_at = Utc::now();
        let (mut generator, mut simulator, run_id) = self.components()?;
        let loads = generator.generate(count)?;
        let decisions = simulator.decide_all(&loads)?;
        self.persist(run_id, started_at, loads, decisions)
    }

    /// Generate `loads_per_day` loads for every eligible pickup day and persist them as one run.
    pub fn run_calendar(&mut self) -> Result<SimulationRun> {
        let started_at = Utc::now();
        let (mut generator, mut simulator, run_id) = self.components()?;
        let days = generator.pickup_days().to_vec();
        let mut loads = Vec::with_capacity(days.len() * self.simulation.loads_per_day);
        for day in days {
            loads.extend(generator.generate_for_day(day, self.simulation.loads_per_day)?);
        }
        let decisions = simulator.decide_all(&loads)?;
        self.persist(run_id, started_at, loads, decisions)
    }

    fn components(&self) -> Result<(LoadGenerator, CarrierSimulator, String)> {
        let mut seeds = SeedManager::new(self.simulation.seed);
        let generator = LoadGenerator::new(&self.simulation, seeds.get_seed(LOAD_GENERATOR))?;
        let simulator = CarrierSimulator::new(
            self.carrier.rule.clone(),
            self.carrier.response_minutes,
            seeds.get_seed(CARRIER),
        )?;
        Ok((generator, simulator, uuid::Uuid::new_v4().to_string()))
    }

    fn persist(
        &mut self,
        run_id: String,
        started_at: DateTime<Utc>,
        loads: Vec<Load>,
        decisions: Vec<CarrierDecision>,
    ) -> Result<SimulationRun> {
        let records = pair(&run_id, loads, decisions)?;
        let run = SimulationRun {
            run_id,
            seed: self.simulation.seed,
            started_at,
            load_count: records.len(),
            accepted_count: records.iter().filter(|r| r.decision.accepted).count(),
        };
        self.store.persist_run(&run, &records)?;

        tracing::info!(
            run_id = %run.run_id,
            seed = run.seed,
            loads = run.load_count,
            accepted = run.accepted_count,
            acceptance_rate = run.acceptance_rate(),
            "Simulation run complete"
        );
        Ok(run)
    }
}

/// Join loads with decisions by position.
pub fn pair(
    run_id: &str,
    loads: Vec<Load>,
    decisions: Vec<CarrierDecision>,
) -> Result<Vec<SimulationRecord>> {
    if loads.len() != decisions.len() {
        return Err(FreightError::data(format!(
            "{} loads but {} decisions",
            loads.len(),
            decisions.len()
        )));
    }
    loads
        .into_iter()
        .zip(decisions)
        .map(|(load, decision)| SimulationRecord::join(run_id, load, decision))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RangeConfig;
    use crate::simulation::carrier::DecisionRule;
    use chrono::NaiveDate;

    fn threshold_carrier() -> CarrierConfig {
        CarrierConfig {
            rule: DecisionRule::Threshold {
                min_rate_per_mile: 2.0,
                above_probability: 1.0,
                below_probability: 0.1,
            },
            ..CarrierConfig::default()
        }
    }

    #[test]
    fn test_run_persists_every_load() {
        let mut store = SimulationStore::open_in_memory().unwrap();
        let config = SimulationConfig::default();
        let run = SimulationCoordinator::new(&config, &threshold_carrier(), &mut store)
            .run(40)
            .unwrap();
        assert_eq!(run.load_count, 40);
        assert_eq!(store.records(Some(&run.run_id)).unwrap().len(), 40);
        assert_eq!(store.latest_run().unwrap().unwrap().run_id, run.run_id);
    }

    #[test]
    fn test_started_at_is_stamped_when_run_begins() {
        let mut store = SimulationStore::open_in_memory().unwrap();
        let before = Utc::now();
        let config = SimulationConfig::default();
        let run = SimulationCoordinator::new(&config, &threshold_carrier(), &mut store)
            .run(200)
            .unwrap();
        let after = Utc::now();
        assert!(run.started_at >= before && run.started_at <= after);
        assert_eq!(store.latest_run().unwrap().unwrap().started_at, run.started_at);
    }

    #[test]
    fn test_same_seed_same_records() {
        let config = SimulationConfig::default();
        let mut a = SimulationStore::open_in_memory().unwrap();
        let mut b = SimulationStore::open_in_memory().unwrap();
        let run_a = SimulationCoordinator::new(&config, &threshold_carrier(), &mut a)
            .run(30)
            .unwrap();
        let run_b = SimulationCoordinator::new(&config, &threshold_carrier(), &mut b)
            .run(30)
            .unwrap();
        assert_eq!(run_a.accepted_count, run_b.accepted_count);

        let strip = |store: &SimulationStore, id: &str| -> Vec<(Load, bool)> {
            store
                .records(Some(id))
                .unwrap()
                .into_iter()
                .map(|r| (r.load, r.decision.accepted))
                .collect()
        };
        assert_eq!(strip(&a, &run_a.run_id), strip(&b, &run_b.run_id));
    }

    #[test]
    fn test_calendar_run_covers_each_day() {
        let mut config = SimulationConfig::default();
        config.window_start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        config.window_end = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        config.loads_per_day = 3;
        config.rate_per_mile = RangeConfig::new(1.0, 3.0);

        let mut store = SimulationStore::open_in_memory().unwrap();
        let run = SimulationCoordinator::new(&config, &CarrierConfig::default(), &mut store)
            .run_calendar()
            .unwrap();
        // Five weekdays in that week.
        assert_eq!(run.load_count, 15);
    }

    #[test]
    fn test_pair_length_mismatch() {
        let err = pair("r", Vec::new(), vec![CarrierDecision {
            load_id: "x".into(),
            accepted: true,
            decision_time: Utc::now(),
        }])
        .unwrap_err();
        assert!(matches!(err, FreightError::Data(_)));
    }

    #[test]
    fn test_invalid_config_aborts_before_persisting() {
        let mut config = SimulationConfig::default();
        config.weight_lbs = RangeConfig::new(5.0, 1.0);
        let mut store = SimulationStore::open_in_memory().unwrap();
        let result = SimulationCoordinator::new(&config, &threshold_carrier(), &mut store).run(10);
        assert!(matches!(result, Err(FreightError::Config(_))));
        assert_eq!(store.load_count().unwrap(), 0);
    }
}
