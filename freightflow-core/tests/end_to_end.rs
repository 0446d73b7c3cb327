//! Simulation through prediction against on-disk databases.

use freightflow_core::config::{
    CarrierConfig, FeatureConfig, ModelingConfig, RangeConfig, SimulationConfig,
};
use freightflow_core::features::OnlineFeatures;
use freightflow_core::simulation::DecisionRule;
use freightflow_core::{
    FeaturePipeline, FeatureStore, Load, ModelArtifact, ModelingPipeline, SimulationCoordinator,
    SimulationStore,
};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_millis(5_000);

fn scenario() -> (SimulationConfig, CarrierConfig) {
    let simulation = SimulationConfig {
        seed: 42,
        rate_per_mile: RangeConfig::new(1.0, 3.0),
        ..SimulationConfig::default()
    };
    let carrier = CarrierConfig {
        rule: DecisionRule::Threshold {
            min_rate_per_mile: 2.0,
            above_probability: 1.0,
            below_probability: 0.1,
        },
        ..CarrierConfig::default()
    };
    (simulation, carrier)
}

fn modeling() -> ModelingConfig {
    ModelingConfig {
        min_training_samples: 20,
        ..ModelingConfig::default()
    }
}

#[test]
fn test_hundred_load_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let (simulation, carrier) = scenario();

    let mut raw = SimulationStore::open(&dir.path().join("raw.db"), TIMEOUT).unwrap();
    let run = SimulationCoordinator::new(&simulation, &carrier, &mut raw)
        .run(100)
        .unwrap();
    assert_eq!(run.load_count, 100);
    let rate = run.acceptance_rate();
    assert!((0.40..=0.60).contains(&rate), "acceptance rate {rate}");

    let records = raw.records(Some(&run.run_id)).unwrap();
    assert_eq!(records.len(), 100);
    for record in &records {
        assert_eq!(record.decision.load_id, record.load.id);
        assert!(record.decision.decision_time >= record.load.posted_time);
        assert!(record.decision.decision_time <= record.load.pickup_time);
    }

    let pipeline = FeaturePipeline::new(&FeatureConfig::default()).unwrap();
    let mut store = FeatureStore::open(&dir.path().join("features.db"), TIMEOUT).unwrap();
    let table = pipeline.run(&records, &mut store).unwrap();
    let features = pipeline.enabled().len();
    assert_eq!(store.len().unwrap(), 100 * features);
    for record in &records {
        for name in pipeline.enabled() {
            assert!(
                store.get(&record.load.id, name).unwrap().is_some(),
                "{} lacks {name}",
                record.load.id
            );
        }
    }

    let modeling = ModelingPipeline::new(modeling()).unwrap();
    let report = modeling.train_and_evaluate(&table).unwrap();
    assert_eq!(report.model.train_rows() + report.test_rows, 100);
    for row in table.rows() {
        let p = report.model.predict(&row).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    let path = dir.path().join("models").join("model.json");
    report
        .model
        .to_artifact(report.evaluation.clone())
        .unwrap()
        .save(&path)
        .unwrap();
    let restored = ModelArtifact::load(&path).unwrap().into_model();

    let mut new_load: Load = records[0].load.clone();
    new_load.id = "new-load".to_string();
    let online = OnlineFeatures::new(&pipeline, &records).compute(&new_load).unwrap();
    let p = restored.predict(&online).unwrap();
    assert!((0.0..=1.0).contains(&p));
}

#[test]
fn test_pipeline_is_idempotent_under_fixed_seed() {
    let (simulation, carrier) = scenario();
    let pipeline = FeaturePipeline::new(&FeatureConfig::default()).unwrap();

    let mut raw = SimulationStore::open_in_memory().unwrap();
    let first = SimulationCoordinator::new(&simulation, &carrier, &mut raw)
        .run(100)
        .unwrap();
    let second = SimulationCoordinator::new(&simulation, &carrier, &mut raw)
        .run(100)
        .unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.accepted_count, second.accepted_count);

    let a = raw.records(Some(&first.run_id)).unwrap();
    let b = raw.records(Some(&second.run_id)).unwrap();
    let loads = |records: &[freightflow_core::SimulationRecord]| -> Vec<Load> {
        records.iter().map(|r| r.load.clone()).collect()
    };
    assert_eq!(loads(&a), loads(&b));

    let mut store = FeatureStore::open_in_memory().unwrap();
    let table_a = pipeline.run(&a, &mut store).unwrap();
    let len = store.len().unwrap();
    let table_b = pipeline.run(&b, &mut store).unwrap();
    assert_eq!(store.len().unwrap(), len);
    assert_eq!(table_a, table_b);

    let modeling = ModelingPipeline::new(modeling()).unwrap();
    let model_a = modeling.train_and_evaluate(&table_a).unwrap().model;
    let model_b = modeling.train_and_evaluate(&table_b).unwrap().model;
    assert_eq!(model_a.model(), model_b.model());
}

#[test]
fn test_features_resolve_from_store_for_modeling() {
    let (simulation, carrier) = scenario();
    let mut raw = SimulationStore::open_in_memory().unwrap();
    let run = SimulationCoordinator::new(&simulation, &carrier, &mut raw)
        .run(60)
        .unwrap();
    let records = raw.records(Some(&run.run_id)).unwrap();

    let pipeline = FeaturePipeline::new(&FeatureConfig::default()).unwrap();
    let mut store = FeatureStore::open_in_memory().unwrap();
    let computed = pipeline.run(&records, &mut store).unwrap();

    let names: Vec<&str> = pipeline.enabled().iter().map(String::as_str).collect();
    let read = store
        .read_table(computed.keys(), &names)
        .unwrap()
        .attach_outcomes(&records)
        .unwrap();
    assert_eq!(read.len(), computed.len());
    for name in &names {
        assert_eq!(read.column(name), computed.column(name));
    }
    assert_eq!(read.target().unwrap(), computed.target().unwrap());
}
