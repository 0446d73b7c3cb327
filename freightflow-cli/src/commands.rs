//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::{Context, anyhow};
use chrono::{Duration, NaiveDate};
use freightflow_core::config::{FreightConfig, StorageConfig, workspace_config_path};
use freightflow_core::features::OnlineFeatures;
use freightflow_core::modeling::{ClassificationMetrics, FeatureImportance};
use freightflow_core::{
    FeaturePipeline, FeatureStore, FreightError, Load, Location, Market, ModelArtifact,
    ModelingPipeline, SimulationCoordinator, SimulationRecord, SimulationRun, SimulationStore,
};
use std::path::{Path, PathBuf};

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Simulate {
            count,
            seed,
            calendar,
            force,
        } => handle_simulate(workspace, count, seed, calendar, force),
        Commands::Summary => handle_summary(workspace),
        Commands::Features { run_id, list } => {
            if list {
                print_definitions();
                Ok(())
            } else {
                handle_features(workspace, run_id.as_deref())
            }
        }
        Commands::Train { cutoff, model_path } => handle_train(workspace, cutoff, model_path),
        Commands::Predict {
            origin,
            destination,
            rate_per_mile,
            weight,
            pickup,
            hour,
        } => handle_predict(
            workspace,
            PredictRequest {
                origin,
                destination,
                rate_per_mile,
                weight,
                pickup,
                hour,
            },
        ),
        Commands::Pipeline { count, seed } => handle_pipeline(workspace, count, seed),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load_config(workspace: &Path) -> anyhow::Result<FreightConfig> {
    freightflow_core::load_config(Some(workspace), None)
        .map_err(|e| anyhow!("Failed to load config: {}", e))
}

fn storage(config: &FreightConfig, workspace: &Path) -> StorageConfig {
    config.storage.resolved(workspace)
}

fn busy_timeout(storage: &StorageConfig) -> std::time::Duration {
    std::time::Duration::from_millis(storage.busy_timeout_ms)
}

fn open_raw(storage: &StorageConfig) -> anyhow::Result<SimulationStore> {
    SimulationStore::open(&storage.raw_db_path, busy_timeout(storage)).with_context(|| {
        format!(
            "Failed to open raw database {}",
            storage.raw_db_path.display()
        )
    })
}

fn open_features(storage: &StorageConfig) -> anyhow::Result<FeatureStore> {
    FeatureStore::open(&storage.feature_store_path, busy_timeout(storage)).with_context(|| {
        format!(
            "Failed to open feature store {}",
            storage.feature_store_path.display()
        )
    })
}

fn model_path(config: &FreightConfig, workspace: &Path, explicit: Option<PathBuf>) -> PathBuf {
    let path = explicit.unwrap_or_else(|| config.modeling.model_path.clone());
    if path.is_absolute() {
        path
    } else {
        workspace.join(path)
    }
}

/// Records of `run_id`, or of the latest run.
fn run_records(
    raw: &SimulationStore,
    run_id: Option<&str>,
) -> anyhow::Result<(SimulationRun, Vec<SimulationRecord>)> {
    let run = match run_id {
        Some(id) => raw
            .runs()?
            .into_iter()
            .find(|r| r.run_id == id)
            .ok_or_else(|| anyhow!("No simulation run {id}"))?,
        None => raw
            .latest_run()?
            .ok_or_else(|| anyhow!("No simulation runs yet; run `freightflow simulate` first"))?,
    };
    let records = raw.records(Some(&run.run_id))?;
    Ok((run, records))
}

fn simulate(
    config: &FreightConfig,
    raw: &mut SimulationStore,
    count: Option<usize>,
    calendar: bool,
) -> anyhow::Result<SimulationRun> {
    let mut coordinator = SimulationCoordinator::new(&config.simulation, &config.carrier, raw);
    let run = if calendar {
        coordinator.run_calendar()?
    } else {
        coordinator.run(count.unwrap_or(config.simulation.load_count))?
    };
    Ok(run)
}

fn handle_simulate(
    workspace: &Path,
    count: Option<usize>,
    seed: Option<u64>,
    calendar: bool,
    force: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(workspace)?;
    if let Some(seed) = seed {
        config.simulation.seed = seed;
    }
    let storage = storage(&config, workspace);

    if storage.raw_db_path.exists() {
        if force {
            std::fs::remove_file(&storage.raw_db_path).with_context(|| {
                format!("Failed to remove {}", storage.raw_db_path.display())
            })?;
            if storage.feature_store_path.exists() {
                // Seeded runs reuse load ids, so old features would resolve for the new run.
                let cleared = open_features(&storage)?.truncate()?;
                tracing::info!(records = cleared, "Cleared feature store");
            }
        } else {
            let raw = open_raw(&storage)?;
            if raw.load_count()? > 0 {
                println!(
                    "Raw database {} already holds simulated loads (use --force to regenerate).",
                    storage.raw_db_path.display()
                );
                return print_runs(&raw);
            }
        }
    }

    let mut raw = open_raw(&storage)?;
    let run = simulate(&config, &mut raw, count, calendar)?;
    print_run(&run);
    Ok(())
}

fn handle_summary(workspace: &Path) -> anyhow::Result<()> {
    let config = load_config(workspace)?;
    let storage = storage(&config, workspace);
    if !storage.raw_db_path.exists() {
        println!("No raw database at {}.", storage.raw_db_path.display());
        return Ok(());
    }
    print_runs(&open_raw(&storage)?)
}

fn handle_features(workspace: &Path, run_id: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(workspace)?;
    let storage = storage(&config, workspace);
    let raw = open_raw(&storage)?;
    let (run, records) = run_records(&raw, run_id)?;

    let pipeline = FeaturePipeline::new(&config.features)?;
    let mut store = open_features(&storage)?;
    let table = pipeline.run(&records, &mut store)?;
    println!(
        "Computed {} features for {} loads of run {} into {}",
        pipeline.enabled().len(),
        table.len(),
        run.run_id,
        storage.feature_store_path.display()
    );
    Ok(())
}

fn handle_train(
    workspace: &Path,
    cutoff: Option<NaiveDate>,
    explicit_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = load_config(workspace)?;
    if let Some(cutoff) = cutoff {
        config.modeling.cutoff = cutoff;
    }
    let storage = storage(&config, workspace);
    let raw = open_raw(&storage)?;
    let (_, records) = run_records(&raw, None)?;

    let pipeline = FeaturePipeline::new(&config.features)?;
    let store = open_features(&storage)?;
    let keys: Vec<String> = records.iter().map(|r| r.load.id.clone()).collect();
    let names: Vec<&str> = pipeline.enabled().iter().map(String::as_str).collect();
    let table = match store.read_table(&keys, &names) {
        Err(FreightError::NotFound(what)) => {
            return Err(anyhow!(
                "Feature store lacks {what}; run `freightflow features` first"
            ));
        }
        other => other?.attach_outcomes(&records)?,
    };

    let path = model_path(&config, workspace, explicit_path);
    train(&config, &table, &path)
}

fn train(
    config: &FreightConfig,
    table: &freightflow_core::FeatureTable,
    path: &Path,
) -> anyhow::Result<()> {
    let modeling = ModelingPipeline::new(config.modeling.clone())?;
    let report = modeling.train_and_evaluate(table)?;
    let training = report.model.training();
    println!(
        "Trained on {} rows before {} ({} epochs, final loss {:.4}{})",
        report.model.train_rows(),
        config.modeling.cutoff,
        training.epochs_completed,
        training.final_loss().unwrap_or(f64::NAN),
        if training.converged { ", converged" } else { "" }
    );
    match &report.evaluation {
        Some(metrics) => {
            println!("Evaluated on {} rows:", report.test_rows);
            print_metrics(metrics);
        }
        None => println!("No rows on or after the cutoff; evaluation skipped."),
    }
    print_importances(&report.model.feature_importances());

    report
        .model
        .to_artifact(report.evaluation.clone())?
        .save(path)
        .with_context(|| format!("Failed to save model to {}", path.display()))?;
    println!("Saved model to {}", path.display());
    Ok(())
}

struct PredictRequest {
    origin: Market,
    destination: Market,
    rate_per_mile: f64,
    weight: u32,
    pickup: NaiveDate,
    hour: u32,
}

/// Hours between posting and pickup assumed for a scored load.
const PREDICT_LEAD_HOURS: i64 = 24;

fn handle_predict(workspace: &Path, request: PredictRequest) -> anyhow::Result<()> {
    let config = load_config(workspace)?;
    let load = request_load(&config, &request)?;

    let path = model_path(&config, workspace, None);
    let model = ModelArtifact::load(&path)?.into_model();

    let storage = storage(&config, workspace);
    let history = if storage.raw_db_path.exists() {
        let raw = open_raw(&storage)?;
        match raw.latest_run()? {
            Some(run) => raw.records(Some(&run.run_id))?,
            None => Vec::new(),
        }
    } else {
        tracing::warn!("No raw database; lane history features use cold-start values");
        Vec::new()
    };

    let pipeline = FeaturePipeline::new(&config.features)?;
    let features = OnlineFeatures::new(&pipeline, &history).compute(&load)?;
    let probability = model.predict(&features)?;

    println!(
        "{} -> {} on {} at {:02}:00, {} mi, ${:.2} ({:.2}/mi), {} lb",
        load.origin.market,
        load.destination.market,
        request.pickup,
        request.hour,
        load.distance,
        load.offered_rate,
        load.rate_per_mile(),
        load.weight
    );
    println!(
        "Acceptance probability: {:.3} ({})",
        probability,
        if probability > model.threshold() {
            "likely accepted"
        } else {
            "likely rejected"
        }
    );
    Ok(())
}

/// Build the load a prediction request describes, at market centers.
fn request_load(config: &FreightConfig, request: &PredictRequest) -> anyhow::Result<Load> {
    if !(request.rate_per_mile.is_finite() && request.rate_per_mile >= 0.0) {
        return Err(anyhow!("rate per mile must be a non-negative number"));
    }
    let origin = Location::at_center(request.origin);
    let destination = Location::at_center(request.destination);
    let distance =
        ((origin.miles_to(&destination) * config.simulation.circuity_factor) as u32).max(1);
    let pickup_time = request
        .pickup
        .and_hms_opt(request.hour, 0, 0)
        .ok_or_else(|| anyhow!("Invalid pickup hour {}", request.hour))?
        .and_utc();

    let load = Load {
        id: uuid::Uuid::new_v4().to_string(),
        origin,
        destination,
        distance,
        weight: request.weight,
        offered_rate: (f64::from(distance) * request.rate_per_mile * 100.0).round() / 100.0,
        pickup_time,
        posted_time: pickup_time - Duration::hours(PREDICT_LEAD_HOURS),
    };
    load.validate()?;
    Ok(load)
}

fn handle_pipeline(workspace: &Path, count: Option<usize>, seed: Option<u64>) -> anyhow::Result<()> {
    let mut config = load_config(workspace)?;
    if let Some(seed) = seed {
        config.simulation.seed = seed;
    }
    let storage = storage(&config, workspace);

    println!("== Simulation ==");
    let mut raw = open_raw(&storage)?;
    let run = simulate(&config, &mut raw, count, false)?;
    print_run(&run);
    let records = raw.records(Some(&run.run_id))?;

    println!("\n== Features ==");
    let pipeline = FeaturePipeline::new(&config.features)?;
    let mut store = open_features(&storage)?;
    let table = pipeline.run(&records, &mut store)?;
    println!(
        "{} loads x {} features written to {}",
        table.len(),
        pipeline.enabled().len(),
        storage.feature_store_path.display()
    );

    println!("\n== Model ==");
    let path = model_path(&config, workspace, None);
    train(&config, &table, &path)
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let default_config = FreightConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(workspace)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

fn print_run(run: &SimulationRun) {
    println!(
        "Run {} (seed {}): {} loads, {} accepted ({:.1}%)",
        run.run_id,
        run.seed,
        run.load_count,
        run.accepted_count,
        run.acceptance_rate() * 100.0
    );
}

fn print_runs(raw: &SimulationStore) -> anyhow::Result<()> {
    let runs = raw.runs()?;
    if runs.is_empty() {
        println!("No simulation runs.");
        return Ok(());
    }
    println!("Simulation runs ({}):", runs.len());
    for run in &runs {
        println!(
            "  {}  {}  seed {:<6} {:>7} loads  {:>5.1}% accepted",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.run_id,
            run.seed,
            run.load_count,
            run.acceptance_rate() * 100.0
        );
    }
    Ok(())
}

fn print_metrics(metrics: &ClassificationMetrics) {
    let optional = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"));
    println!("  accuracy   {:.3}", metrics.accuracy);
    println!("  precision  {:.3}", metrics.precision);
    println!("  recall     {:.3}", metrics.recall);
    println!("  f1         {:.3}", metrics.f1_score);
    println!("  avg prec   {}", optional(metrics.average_precision));
    println!("  roc auc    {}", optional(metrics.auc_roc));
    println!("  log loss   {:.4}", metrics.log_loss);
    println!("  brier      {:.4}", metrics.brier_score);
    println!("  ece        {:.4}", metrics.expected_calibration_error);
    let [[tn, fp], [fn_, tp]] = metrics.confusion_matrix.as_rows();
    println!("  confusion  tn {tn}  fp {fp}  fn {fn_}  tp {tp}");
}

/// Inputs shown by `train` and `pipeline`.
const TOP_IMPORTANCES: usize = 10;

fn print_importances(importances: &[FeatureImportance]) {
    println!("Strongest inputs:");
    for importance in importances.iter().take(TOP_IMPORTANCES) {
        println!("  {:<36} {:>+8.4}", importance.input, importance.coefficient);
    }
}

fn print_definitions() {
    println!("Declared features:");
    for def in FeaturePipeline::definitions() {
        println!(
            "  {:<28} {:<6} <- {}",
            def.name,
            def.kind,
            def.inputs.join(", ")
        );
        println!("      {}", def.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace).unwrap();

        let config_path = workspace.join(".freightflow").join("config.toml");
        assert!(config_path.exists());

        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: FreightConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.simulation.seed, 42);
    }

    #[test]
    fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let config_path = workspace_config_path(workspace);

        handle_command(
            Commands::Config {
                action: ConfigAction::Init,
            },
            workspace,
        )
        .unwrap();
        std::fs::write(&config_path, "[simulation]\nseed = 9\n").unwrap();
        handle_command(
            Commands::Config {
                action: ConfigAction::Init,
            },
            workspace,
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&config_path).unwrap(),
            "[simulation]\nseed = 9\n"
        );
    }

    #[test]
    fn test_simulate_features_train_predict() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        handle_command(
            Commands::Simulate {
                count: Some(300),
                seed: Some(7),
                calendar: false,
                force: false,
            },
            workspace,
        )
        .unwrap();
        let storage = StorageConfig::default().resolved(workspace);
        assert!(storage.raw_db_path.exists());

        // Training before features exist points at the missing step.
        let err = handle_command(
            Commands::Train {
                cutoff: None,
                model_path: None,
            },
            workspace,
        )
        .unwrap_err();
        assert!(err.to_string().contains("freightflow features"));

        handle_command(
            Commands::Features {
                run_id: None,
                list: false,
            },
            workspace,
        )
        .unwrap();
        handle_command(
            Commands::Train {
                cutoff: None,
                model_path: None,
            },
            workspace,
        )
        .unwrap();
        assert!(workspace.join("models").join("acceptance_model.json").exists());

        handle_command(
            Commands::Predict {
                origin: Market::TxDal,
                destination: Market::TxHou,
                rate_per_mile: 2.2,
                weight: 30_000,
                pickup: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
                hour: 9,
            },
            workspace,
        )
        .unwrap();
    }

    #[test]
    fn test_simulate_without_force_keeps_existing_run() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let simulate = |force| Commands::Simulate {
            count: Some(20),
            seed: None,
            calendar: false,
            force,
        };

        handle_command(simulate(false), workspace).unwrap();
        handle_command(simulate(false), workspace).unwrap();
        let storage = StorageConfig::default().resolved(workspace);
        let raw = SimulationStore::open(&storage.raw_db_path, busy_timeout(&storage)).unwrap();
        assert_eq!(raw.runs().unwrap().len(), 1);
        drop(raw);

        handle_command(simulate(true), workspace).unwrap();
        let raw = SimulationStore::open(&storage.raw_db_path, busy_timeout(&storage)).unwrap();
        assert_eq!(raw.runs().unwrap().len(), 1);
        assert_eq!(raw.load_count().unwrap(), 20);
    }

    #[test]
    fn test_force_discards_features_of_replaced_run() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let simulate = |count, force| Commands::Simulate {
            count: Some(count),
            seed: Some(42),
            calendar: false,
            force,
        };
        let features = || Commands::Features {
            run_id: None,
            list: false,
        };
        let train = || Commands::Train {
            cutoff: None,
            model_path: None,
        };

        handle_command(simulate(300, false), workspace).unwrap();
        handle_command(features(), workspace).unwrap();
        handle_command(simulate(200, true), workspace).unwrap();

        let storage = StorageConfig::default().resolved(workspace);
        let store = FeatureStore::open(&storage.feature_store_path, busy_timeout(&storage)).unwrap();
        assert_eq!(store.len().unwrap(), 0);
        drop(store);

        let err = handle_command(train(), workspace).unwrap_err();
        assert!(err.to_string().contains("freightflow features"));

        handle_command(features(), workspace).unwrap();
        handle_command(train(), workspace).unwrap();
        let artifact =
            ModelArtifact::load(&workspace.join("models").join("acceptance_model.json")).unwrap();
        assert!(artifact.train_rows < 200);
        assert!(!artifact.feature_importances.is_empty());
    }

    #[test]
    fn test_predict_without_model_fails() {
        let dir = TempDir::new().unwrap();
        let err = handle_command(
            Commands::Predict {
                origin: Market::GaAtl,
                destination: Market::IlChi,
                rate_per_mile: 2.0,
                weight: 30_000,
                pickup: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
                hour: 10,
            },
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("train a model first"));
    }

    #[test]
    fn test_request_load_geometry() {
        let config = FreightConfig::default();
        let request = PredictRequest {
            origin: Market::CaLax,
            destination: Market::CaStk,
            rate_per_mile: 2.0,
            weight: 30_000,
            pickup: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            hour: 10,
        };
        let load = request_load(&config, &request).unwrap();
        assert!((320..380).contains(&load.distance), "got {}", load.distance);
        assert!((load.rate_per_mile() - 2.0).abs() < 0.01);
        assert_eq!(load.pickup_time - load.posted_time, Duration::hours(24));

        let bad_hour = PredictRequest { hour: 30, ..request };
        assert!(request_load(&config, &bad_hour).is_err());
    }
}
