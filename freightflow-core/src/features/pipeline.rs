//! Feature engineering pipeline: raw simulation rows in, feature records out.

use crate::config::{FeatureConfig, RangeConfig};
use crate::dataflow::{Column, Dataflow, Driver, NodeFn};
use crate::error::{FreightError, Result};
use crate::features::definition::{FeatureDefinition, FeatureKind};
use crate::features::lane_history::LaneHistory;
use crate::features::store::{FeatureRecord, FeatureStore};
use crate::features::table::{FeatureTable, Outcome};
use crate::simulation::types::{Load, SimulationRecord};
use chrono::{Datelike, NaiveDate, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Raw columns supplied to the dataflow, one entry per load.
pub const RAW_INPUTS: [&str; 9] = [
    "load_id",
    "pickup_time",
    "posted_time",
    "origin_market",
    "destination_market",
    "miles",
    "offered_rate",
    "weight",
    "accepted",
];

/// Intermediate node shared by the lagged lane features.
const LANE_HISTORY: &str = "lane_history";
const LANE_HISTORY_INPUTS: [&str; 3] = ["lane", "pickup_time", "accepted"];

struct Declared {
    name: &'static str,
    kind: FeatureKind,
    inputs: &'static [&'static str],
    description: &'static str,
}

const FEATURES: [Declared; 13] = [
    Declared {
        name: "rate_per_mile",
        kind: FeatureKind::Float,
        inputs: &["offered_rate", "miles"],
        description: "Offered dollars per mile",
    },
    Declared {
        name: "normalized_rate",
        kind: FeatureKind::Float,
        inputs: &["rate_per_mile"],
        description: "Rate per mile min-max scaled against the reference rate range",
    },
    Declared {
        name: "pickup_day_of_week",
        kind: FeatureKind::Int,
        inputs: &["pickup_time"],
        description: "Pickup weekday, Monday = 0",
    },
    Declared {
        name: "pickup_hour",
        kind: FeatureKind::Int,
        inputs: &["pickup_time"],
        description: "Pickup hour of day (UTC)",
    },
    Declared {
        name: "time_of_day_bucket",
        kind: FeatureKind::Text,
        inputs: &["pickup_hour"],
        description: "night, morning, afternoon or evening",
    },
    Declared {
        name: "is_weekend",
        kind: FeatureKind::Bool,
        inputs: &["pickup_day_of_week"],
        description: "Pickup falls on Saturday or Sunday",
    },
    Declared {
        name: "pickup_month",
        kind: FeatureKind::Int,
        inputs: &["pickup_time"],
        description: "Pickup calendar month",
    },
    Declared {
        name: "lead_time_hours",
        kind: FeatureKind::Float,
        inputs: &["pickup_time", "posted_time"],
        description: "Hours between posting and pickup",
    },
    Declared {
        name: "is_heavy",
        kind: FeatureKind::Bool,
        inputs: &["weight"],
        description: "Weight above the heavy-load threshold",
    },
    Declared {
        name: "lane",
        kind: FeatureKind::Text,
        inputs: &["origin_market", "destination_market"],
        description: "Origin and destination market codes",
    },
    Declared {
        name: "lane_acceptance_rate_lagged",
        kind: FeatureKind::Float,
        inputs: &[LANE_HISTORY],
        description: "Smoothed lane acceptance over earlier pickup days",
    },
    Declared {
        name: "lane_volume_lagged",
        kind: FeatureKind::Int,
        inputs: &[LANE_HISTORY],
        description: "Loads seen on the lane on earlier pickup days",
    },
    Declared {
        name: "lane_acceptance_ewma",
        kind: FeatureKind::Float,
        inputs: &[LANE_HISTORY],
        description: "EWMA of daily lane acceptance over earlier pickup days",
    },
];

/// Computes the declared features over raw simulation rows.
pub struct FeaturePipeline {
    flow: Dataflow<Column>,
    enabled: Vec<String>,
}

impl FeaturePipeline {
    pub fn new(config: &FeatureConfig) -> Result<Self> {
        config.rate_reference.validate("rate_reference")?;
        if !(config.lane_ewma_alpha > 0.0 && config.lane_ewma_alpha <= 1.0) {
            return Err(FreightError::config(format!(
                "lane_ewma_alpha must be in (0, 1], got {}",
                config.lane_ewma_alpha
            )));
        }
        if !(config.heavy_weight_lbs.is_finite() && config.heavy_weight_lbs >= 0.0) {
            return Err(FreightError::config("heavy_weight_lbs must be non-negative"));
        }

        let enabled: Vec<String> = if config.enabled.is_empty() {
            FEATURES.iter().map(|f| f.name.to_string()).collect()
        } else {
            for name in &config.enabled {
                if !FEATURES.iter().any(|f| f.name == name.as_str()) {
                    return Err(FreightError::config(format!("unknown feature {name}")));
                }
            }
            config.enabled.clone()
        };

        let mut flow: Dataflow<Column> = Dataflow::new();
        for feature in &FEATURES {
            let func = node_fn(feature.name, config)?;
            flow.add(feature.name, feature.inputs, move |args| func(args))?;
        }
        let alpha = config.lane_ewma_alpha;
        flow.add(LANE_HISTORY, &LANE_HISTORY_INPUTS, move |a| lane_history(a, alpha))?;
        Ok(Self { flow, enabled })
    }

    /// Every feature the pipeline can compute.
    pub fn definitions() -> Vec<FeatureDefinition> {
        FEATURES
            .iter()
            .map(|f| FeatureDefinition::new(f.name, f.kind, f.inputs, f.description))
            .collect()
    }

    /// Features this pipeline writes, in output order.
    pub fn enabled(&self) -> &[String] {
        &self.enabled
    }

    pub fn dataflow(&self) -> &Dataflow<Column> {
        &self.flow
    }

    /// Compute features without persisting them.
    pub fn compute(&self, records: &[SimulationRecord]) -> Result<FeatureTable> {
        let table = self.compute_rows(records.iter().map(|r| (&r.load, r.decision.accepted)))?;
        let outcomes = records
            .iter()
            .map(|r| Outcome {
                pickup_date: r.load.pickup_time.date_naive(),
                accepted: r.decision.accepted,
            })
            .collect();
        table.with_outcomes(outcomes)
    }

    /// Compute features and write one record per load per enabled feature.
    pub fn run(
        &self,
        records: &[SimulationRecord],
        store: &mut FeatureStore,
    ) -> Result<FeatureTable> {
        if records.is_empty() {
            tracing::warn!("Feature pipeline received no simulation records");
        }
        let table = self.compute(records)?;

        let computed_at = Utc::now();
        let mut out = Vec::with_capacity(table.len() * self.enabled.len());
        for name in &self.enabled {
            let values = table
                .column(name)
                .ok_or_else(|| FreightError::dataflow(format!("feature {name} was not computed")))?;
            for (key, value) in table.keys().iter().zip(values) {
                out.push(FeatureRecord {
                    key: key.clone(),
                    feature_name: name.clone(),
                    value: value.clone(),
                    computed_at,
                });
            }
        }
        let written = store.put_many(&out)?;

        tracing::info!(
            loads = table.len(),
            features = self.enabled.len(),
            records = written,
            "Feature pipeline complete"
        );
        Ok(table)
    }

    /// Run the dataflow over `(load, accepted)` rows. The result carries no outcomes.
    pub(crate) fn compute_rows<'r, I>(&self, rows: I) -> Result<FeatureTable>
    where
        I: IntoIterator<Item = (&'r Load, bool)>,
    {
        let rows: Vec<(&Load, bool)> = rows.into_iter().collect();
        for (load, _) in &rows {
            load.validate()?;
        }
        let inputs = raw_inputs(&rows);
        let outputs: Vec<&str> = self.enabled.iter().map(String::as_str).collect();
        let columns = Driver::new(&self.flow).execute(&outputs, inputs)?;

        let mut table = FeatureTable::new(rows.iter().map(|(l, _)| l.id.clone()).collect());
        for (name, column) in columns {
            let values = (0..column.len())
                .filter_map(|i| column.value(i))
                .collect();
            table.push_column(&name, values)?;
        }
        Ok(table)
    }
}

fn raw_inputs(rows: &[(&Load, bool)]) -> HashMap<String, Column> {
    let texts =
        |f: &dyn Fn(&Load) -> String| Column::Text(rows.iter().map(|(l, _)| f(*l)).collect());
    HashMap::from([
        ("load_id".to_string(), texts(&|l: &Load| l.id.clone())),
        (
            "pickup_time".to_string(),
            Column::Time(rows.iter().map(|(l, _)| l.pickup_time).collect()),
        ),
        (
            "posted_time".to_string(),
            Column::Time(rows.iter().map(|(l, _)| l.posted_time).collect()),
        ),
        (
            "origin_market".to_string(),
            texts(&|l: &Load| l.origin.market.code().to_string()),
        ),
        (
            "destination_market".to_string(),
            texts(&|l: &Load| l.destination.market.code().to_string()),
        ),
        (
            "miles".to_string(),
            Column::Int(rows.iter().map(|(l, _)| i64::from(l.distance)).collect()),
        ),
        (
            "offered_rate".to_string(),
            Column::Float(rows.iter().map(|(l, _)| l.offered_rate).collect()),
        ),
        (
            "weight".to_string(),
            Column::Int(rows.iter().map(|(l, _)| i64::from(l.weight)).collect()),
        ),
        (
            "accepted".to_string(),
            Column::Bool(rows.iter().map(|(_, a)| *a).collect()),
        ),
    ])
}

fn node_fn(name: &str, config: &FeatureConfig) -> Result<NodeFn<Column>> {
    let f: NodeFn<Column> = match name {
        "rate_per_mile" => Arc::new(rate_per_mile),
        "normalized_rate" => {
            let reference = config.rate_reference;
            Arc::new(move |a: &[&Column]| normalized_rate(a, reference))
        }
        "pickup_day_of_week" => Arc::new(|a: &[&Column]| {
            map_times(a[0], |t| {
                Column::Int(
                    t.iter()
                        .map(|t| i64::from(t.weekday().num_days_from_monday()))
                        .collect(),
                )
            })
        }),
        "pickup_hour" => Arc::new(|a: &[&Column]| {
            map_times(a[0], |t| Column::Int(t.iter().map(|t| i64::from(t.hour())).collect()))
        }),
        "pickup_month" => Arc::new(|a: &[&Column]| {
            map_times(a[0], |t| Column::Int(t.iter().map(|t| i64::from(t.month())).collect()))
        }),
        "time_of_day_bucket" => Arc::new(|a: &[&Column]| {
            Ok(Column::Text(
                a[0].ints()?.iter().map(|h| time_of_day_bucket(*h).to_string()).collect(),
            ))
        }),
        "is_weekend" => Arc::new(|a: &[&Column]| {
            Ok(Column::Bool(a[0].ints()?.iter().map(|d| *d >= 5).collect()))
        }),
        "lead_time_hours" => Arc::new(lead_time_hours),
        "is_heavy" => {
            let threshold = config.heavy_weight_lbs;
            Arc::new(move |a: &[&Column]| {
                Ok(Column::Bool(
                    a[0].ints()?.iter().map(|w| *w as f64 > threshold).collect(),
                ))
            })
        }
        "lane" => Arc::new(|a: &[&Column]| {
            let origins = a[0].texts()?;
            let destinations = a[1].texts()?;
            Ok(Column::Text(
                origins
                    .iter()
                    .zip(destinations)
                    .map(|(o, d)| format!("{o}-{d}"))
                    .collect(),
            ))
        }),
        "lane_acceptance_rate_lagged" => Arc::new(|a: &[&Column]| {
            Ok(Column::Float(a[0].lane_stats()?.iter().map(|s| s.acceptance_rate).collect()))
        }),
        "lane_volume_lagged" => Arc::new(|a: &[&Column]| {
            Ok(Column::Int(a[0].lane_stats()?.iter().map(|s| s.volume).collect()))
        }),
        "lane_acceptance_ewma" => Arc::new(|a: &[&Column]| {
            Ok(Column::Float(a[0].lane_stats()?.iter().map(|s| s.ewma).collect()))
        }),
        other => return Err(FreightError::dataflow(format!("no function for feature {other}"))),
    };
    Ok(f)
}

fn rate_per_mile(a: &[&Column]) -> Result<Column> {
    let rates = a[0].floats()?;
    let miles = a[1].ints()?;
    rates
        .iter()
        .zip(miles)
        .map(|(rate, m)| {
            if *m <= 0 {
                Err(FreightError::data(format!("non-positive distance {m}")))
            } else {
                Ok(rate / *m as f64)
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(Column::Float)
}

fn normalized_rate(a: &[&Column], reference: RangeConfig) -> Result<Column> {
    let span = reference.max - reference.min;
    let rates = a[0].floats()?;
    Ok(Column::Float(
        rates
            .iter()
            .map(|r| if span > 0.0 { (r - reference.min) / span } else { 0.0 })
            .collect(),
    ))
}

fn map_times(
    column: &Column,
    f: impl Fn(&[chrono::DateTime<Utc>]) -> Column,
) -> Result<Column> {
    Ok(f(column.times()?))
}

fn time_of_day_bucket(hour: i64) -> &'static str {
    match hour {
        6..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "night",
    }
}

fn lead_time_hours(a: &[&Column]) -> Result<Column> {
    let pickups = a[0].times()?;
    let posted = a[1].times()?;
    Ok(Column::Float(
        pickups
            .iter()
            .zip(posted)
            .map(|(p, q)| (*p - *q).num_seconds() as f64 / 3600.0)
            .collect(),
    ))
}

/// Build the lane history once and look up every row's pre-pickup statistics.
fn lane_history(a: &[&Column], alpha: f64) -> Result<Column> {
    let lanes = a[0].texts()?;
    let days: Vec<NaiveDate> = a[1].times()?.iter().map(|t| t.date_naive()).collect();
    let accepted = a[2].bools()?;
    let history = LaneHistory::build(lanes, &days, accepted, alpha)?;
    Ok(Column::Lane(
        lanes
            .iter()
            .zip(&days)
            .map(|(lane, day)| history.before(lane, *day))
            .collect(),
    ))
}
