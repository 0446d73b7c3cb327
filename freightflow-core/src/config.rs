//! Configuration system for freightflow.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> workspace config ->
//! environment -> explicit overrides. Every component receives its section by reference at
//! construction; nothing reads configuration from ambient state.

use crate::error::{FreightError, Result};
use crate::market::Market;
use crate::simulation::carrier::DecisionRule;
use chrono::NaiveDate;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreightConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub carrier: CarrierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub modeling: ModelingConfig,
}

/// Inclusive numeric range used for generator distributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeConfig {
    pub min: f64,
    pub max: f64,
}

impl RangeConfig {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Reject empty, inverted or non-finite ranges, and negative bounds.
    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(FreightError::config(format!("{name}: bounds must be finite")));
        }
        if self.min < 0.0 {
            return Err(FreightError::config(format!(
                "{name}: lower bound {} is negative",
                self.min
            )));
        }
        if self.min > self.max {
            return Err(FreightError::config(format!(
                "{name}: empty range [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Load generator and coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Run seed; component seeds are derived from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Number of loads for a count-based run.
    #[serde(default = "default_load_count")]
    pub load_count: usize,
    /// Loads generated per day for a calendar run.
    #[serde(default = "default_loads_per_day")]
    pub loads_per_day: usize,
    /// Markets loads are drawn between. At least two are required.
    #[serde(default = "default_markets")]
    pub markets: Vec<Market>,
    #[serde(default = "default_rate_per_mile")]
    pub rate_per_mile: RangeConfig,
    #[serde(default = "default_weight_lbs")]
    pub weight_lbs: RangeConfig,
    #[serde(default = "default_distance_miles")]
    pub distance_miles: RangeConfig,
    /// Hours between posting a load and its pickup.
    #[serde(default = "default_posted_lead_hours")]
    pub posted_lead_hours: RangeConfig,
    #[serde(default = "default_window_start")]
    pub window_start: NaiveDate,
    #[serde(default = "default_window_end")]
    pub window_end: NaiveDate,
    #[serde(default = "default_true")]
    pub weekdays_only: bool,
    /// First pickup hour of the day (inclusive).
    #[serde(default = "default_pickup_hour_start")]
    pub pickup_hour_start: u32,
    /// Last pickup hour of the day (exclusive).
    #[serde(default = "default_pickup_hour_end")]
    pub pickup_hour_end: u32,
    /// Maximum random offset of a location from its market center.
    #[serde(default = "default_location_jitter")]
    pub location_jitter_miles: f64,
    /// Road miles per great-circle mile.
    #[serde(default = "default_circuity_factor")]
    pub circuity_factor: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            load_count: default_load_count(),
            loads_per_day: default_loads_per_day(),
            markets: default_markets(),
            rate_per_mile: default_rate_per_mile(),
            weight_lbs: default_weight_lbs(),
            distance_miles: default_distance_miles(),
            posted_lead_hours: default_posted_lead_hours(),
            window_start: default_window_start(),
            window_end: default_window_end(),
            weekdays_only: true,
            pickup_hour_start: default_pickup_hour_start(),
            pickup_hour_end: default_pickup_hour_end(),
            location_jitter_miles: default_location_jitter(),
            circuity_factor: default_circuity_factor(),
        }
    }
}

fn default_seed() -> u64 {
    42
}

fn default_load_count() -> usize {
    1000
}

fn default_loads_per_day() -> usize {
    500
}

fn default_markets() -> Vec<Market> {
    Market::ALL.to_vec()
}

fn default_rate_per_mile() -> RangeConfig {
    RangeConfig::new(0.5, 3.0)
}

fn default_weight_lbs() -> RangeConfig {
    RangeConfig::new(25_000.0, 45_000.0)
}

fn default_distance_miles() -> RangeConfig {
    RangeConfig::new(1.0, 5_000.0)
}

fn default_posted_lead_hours() -> RangeConfig {
    RangeConfig::new(2.0, 72.0)
}

fn default_window_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 1).unwrap_or_default()
}

fn default_window_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 31).unwrap_or_default()
}

fn default_pickup_hour_start() -> u32 {
    6
}

fn default_pickup_hour_end() -> u32 {
    18
}

fn default_location_jitter() -> f64 {
    30.0
}

fn default_circuity_factor() -> f64 {
    1.17
}

fn default_true() -> bool {
    true
}

/// Carrier decision simulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierConfig {
    #[serde(default)]
    pub rule: DecisionRule,
    /// Upper bound on minutes between posting and the carrier's answer.
    #[serde(default = "default_response_minutes")]
    pub response_minutes: u32,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            rule: DecisionRule::default(),
            response_minutes: default_response_minutes(),
        }
    }
}

fn default_response_minutes() -> u32 {
    240
}

/// Local database locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Raw simulation output (loads joined with decisions).
    #[serde(default = "default_raw_db_path")]
    pub raw_db_path: PathBuf,
    #[serde(default = "default_feature_store_path")]
    pub feature_store_path: PathBuf,
    /// SQLite busy timeout for single-writer access.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_db_path: default_raw_db_path(),
            feature_store_path: default_feature_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Resolve relative paths against a workspace directory.
    pub fn resolved(&self, workspace: &Path) -> Self {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                workspace.join(p)
            }
        };
        Self {
            raw_db_path: resolve(&self.raw_db_path),
            feature_store_path: resolve(&self.feature_store_path),
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

fn default_raw_db_path() -> PathBuf {
    PathBuf::from("load_simulation_results.db")
}

fn default_feature_store_path() -> PathBuf {
    PathBuf::from("feature_store.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Feature engineering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Features to compute. Empty means every declared feature.
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Reference range used by `normalized_rate`.
    #[serde(default = "default_rate_per_mile")]
    pub rate_reference: RangeConfig,
    /// Smoothing factor for `lane_acceptance_ewma`, in (0, 1].
    #[serde(default = "default_ewma_alpha")]
    pub lane_ewma_alpha: f64,
    /// Loads above this weight are flagged `is_heavy`.
    #[serde(default = "default_heavy_weight")]
    pub heavy_weight_lbs: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            rate_reference: default_rate_per_mile(),
            lane_ewma_alpha: default_ewma_alpha(),
            heavy_weight_lbs: default_heavy_weight(),
        }
    }
}

fn default_ewma_alpha() -> f64 {
    0.3
}

fn default_heavy_weight() -> f64 {
    35_000.0
}

/// Modeling pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelingConfig {
    /// Rows picked up before this date train the model; the rest evaluate it.
    #[serde(default = "default_cutoff")]
    pub cutoff: NaiveDate,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_l2")]
    pub l2: f64,
    /// Stop once the loss improves by less than this between epochs.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_prediction_threshold")]
    pub prediction_threshold: f64,
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,
    #[serde(default = "default_calibration_bins")]
    pub calibration_bins: usize,
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
}

impl Default for ModelingConfig {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
            l2: default_l2(),
            tolerance: default_tolerance(),
            prediction_threshold: default_prediction_threshold(),
            min_training_samples: default_min_training_samples(),
            calibration_bins: default_calibration_bins(),
            model_path: default_model_path(),
        }
    }
}

fn default_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 1).unwrap_or_default()
}

fn default_learning_rate() -> f64 {
    0.5
}

fn default_epochs() -> usize {
    500
}

fn default_l2() -> f64 {
    1e-3
}

fn default_tolerance() -> f64 {
    1e-7
}

fn default_prediction_threshold() -> f64 {
    0.5
}

fn default_min_training_samples() -> usize {
    20
}

fn default_calibration_bins() -> usize {
    10
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/acceptance_model.json")
}

const WORKSPACE_DIR: &str = ".freightflow";
const CONFIG_FILE: &str = "config.toml";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "freightflow", "freightflow")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `FREIGHTFLOW_`)
/// 3. Workspace-local config (`.freightflow/config.toml`)
/// 4. User config (`~/.config/freightflow/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&FreightConfig>,
) -> Result<FreightConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(FreightConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join(CONFIG_FILE);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // FREIGHTFLOW_SIMULATION__SEED, FREIGHTFLOW_MODELING__EPOCHS, etc.
    figment = figment.merge(Env::prefixed("FREIGHTFLOW_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_DIR).join(CONFIG_FILE)
}

/// Directory for rolling log files, falling back to the current directory.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."))
}
