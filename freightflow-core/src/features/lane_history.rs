//! Lagged lane statistics: what was known about a lane before a load's pickup day.
//!
//! Only days strictly before the pickup day contribute, so a row never sees its own
//! outcome or any outcome from the same day.

use crate::error::{FreightError, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// Acceptance rate reported for a lane with no history.
pub const COLD_START_RATE: f64 = 0.5;

/// Lane statistics as of the start of a day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneStats {
    /// Laplace-smoothed acceptance rate: `(accepted + 1) / (loads + 2)`.
    pub acceptance_rate: f64,
    /// Loads seen on the lane.
    pub volume: i64,
    /// Exponentially weighted mean of daily acceptance rates.
    pub ewma: f64,
}

impl LaneStats {
    const COLD: LaneStats = LaneStats {
        acceptance_rate: COLD_START_RATE,
        volume: 0,
        ewma: COLD_START_RATE,
    };
}

#[derive(Debug, Clone, Copy)]
struct DayTotal {
    day: NaiveDate,
    /// Totals through the end of `day`.
    loads: i64,
    accepted: i64,
    ewma: f64,
}

/// Per-lane running totals indexed by day.
#[derive(Debug, Clone, Default)]
pub struct LaneHistory {
    lanes: HashMap<String, Vec<DayTotal>>,
}

impl LaneHistory {
    /// Build from row-aligned lane, pickup day and outcome slices.
    pub fn build(
        lanes: &[String],
        days: &[NaiveDate],
        accepted: &[bool],
        alpha: f64,
    ) -> Result<Self> {
        if lanes.len() != days.len() || lanes.len() != accepted.len() {
            return Err(FreightError::data(format!(
                "lane history inputs differ in length: {} lanes, {} days, {} outcomes",
                lanes.len(),
                days.len(),
                accepted.len()
            )));
        }
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(FreightError::config(format!(
                "lane EWMA alpha must be in (0, 1], got {alpha}"
            )));
        }

        let mut daily: HashMap<&str, BTreeMap<NaiveDate, (i64, i64)>> = HashMap::new();
        for ((lane, day), ok) in lanes.iter().zip(days).zip(accepted) {
            let entry = daily
                .entry(lane.as_str())
                .or_default()
                .entry(*day)
                .or_insert((0, 0));
            entry.0 += 1;
            entry.1 += i64::from(*ok);
        }

        let lanes = daily
            .into_iter()
            .map(|(lane, by_day)| {
                let mut totals = Vec::with_capacity(by_day.len());
                let (mut loads, mut acc) = (0i64, 0i64);
                let mut ewma: Option<f64> = None;
                for (day, (n, a)) in by_day {
                    loads += n;
                    acc += a;
                    let rate = a as f64 / n as f64;
                    let next = match ewma {
                        None => rate,
                        Some(prev) => alpha * rate + (1.0 - alpha) * prev,
                    };
                    ewma = Some(next);
                    totals.push(DayTotal {
                        day,
                        loads,
                        accepted: acc,
                        ewma: next,
                    });
                }
                (lane.to_string(), totals)
            })
            .collect();
        Ok(Self { lanes })
    }

    /// Statistics for `lane` using only days before `day`.
    pub fn before(&self, lane: &str, day: NaiveDate) -> LaneStats {
        let Some(totals) = self.lanes.get(lane) else {
            return LaneStats::COLD;
        };
        let seen = totals.partition_point(|t| t.day < day);
        if seen == 0 {
            return LaneStats::COLD;
        }
        let last = totals[seen - 1];
        LaneStats {
            acceptance_rate: (last.accepted + 1) as f64 / (last.loads + 2) as f64,
            volume: last.loads,
            ewma: last.ewma,
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}
