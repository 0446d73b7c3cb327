//! Carrier decision simulator.
//!
//! Every decision is a pure function of the load's attributes plus one random draw.
//! No state is carried from one load to the next.

use crate::error::{FreightError, Result};
use crate::market::Market;
use crate::simulation::types::{CarrierDecision, Load};
use chrono::{Datelike, Duration, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How the acceptance probability of a load is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionRule {
    /// Accept with `above_probability` when the rate per mile reaches the threshold,
    /// otherwise with `below_probability`.
    Threshold {
        min_rate_per_mile: f64,
        above_probability: f64,
        below_probability: f64,
    },
    /// Sigmoid of the rate per mile, perturbed by uniform noise of at most `noise`.
    Logistic {
        midpoint: f64,
        steepness: f64,
        noise: f64,
    },
    /// Lane, season, weight and rate preferences of a single carrier.
    LanePreference(LanePreference),
}

impl Default for DecisionRule {
    fn default() -> Self {
        Self::LanePreference(LanePreference::default())
    }
}

impl DecisionRule {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Threshold {
                min_rate_per_mile,
                above_probability,
                below_probability,
            } => {
                if !min_rate_per_mile.is_finite() {
                    return Err(FreightError::config("threshold must be finite"));
                }
                check_probability("above_probability", *above_probability)?;
                check_probability("below_probability", *below_probability)
            }
            Self::Logistic {
                midpoint,
                steepness,
                noise,
            } => {
                if !midpoint.is_finite() || !steepness.is_finite() {
                    return Err(FreightError::config(
                        "logistic midpoint and steepness must be finite",
                    ));
                }
                if !(noise.is_finite() && *noise >= 0.0) {
                    return Err(FreightError::config("logistic noise must be non-negative"));
                }
                Ok(())
            }
            Self::LanePreference(pref) => pref.validate(),
        }
    }
}

fn check_probability(name: &str, p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(FreightError::config(format!("{name} must lie in [0, 1], got {p}")))
    }
}

/// A lane-specific acceptance probability with optional seasonal windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneRule {
    pub origin: Market,
    pub destination: Market,
    /// Also applies to destination -> origin.
    #[serde(default)]
    pub bidirectional: bool,
    pub probability: f64,
    /// When non-empty, the lane is only served in these months.
    #[serde(default)]
    pub only_months: Vec<u32>,
    #[serde(default)]
    pub excluded_months: Vec<u32>,
    /// `(year, month)` pairs with no service.
    #[serde(default)]
    pub excluded_year_months: Vec<(i32, u32)>,
}

impl LaneRule {
    fn matches(&self, origin: Market, destination: Market) -> bool {
        (self.origin == origin && self.destination == destination)
            || (self.bidirectional && self.origin == destination && self.destination == origin)
    }

    fn serves(&self, year: i32, month: u32) -> bool {
        if !self.only_months.is_empty() && !self.only_months.contains(&month) {
            return false;
        }
        !self.excluded_months.contains(&month) && !self.excluded_year_months.contains(&(year, month))
    }
}

/// Carrier preferences: a low base probability lifted on preferred lanes, then scaled by
/// weight and rate factors. Weekend pickups bypass all of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanePreference {
    pub weekend_probability: f64,
    pub base_probability: f64,
    pub heavy_weight_lbs: u32,
    pub heavy_factor: f64,
    pub low_rate_per_mile: f64,
    pub low_rate_factor: f64,
    pub high_rate_per_mile: f64,
    pub high_rate_factor: f64,
    pub lanes: Vec<LaneRule>,
}

impl Default for LanePreference {
    fn default() -> Self {
        let lane = |origin, destination, bidirectional, probability| LaneRule {
            origin,
            destination,
            bidirectional,
            probability,
            only_months: Vec::new(),
            excluded_months: Vec::new(),
            excluded_year_months: Vec::new(),
        };
        Self {
            weekend_probability: 0.05,
            base_probability: 0.001,
            heavy_weight_lbs: 35_000,
            heavy_factor: 0.7,
            low_rate_per_mile: 1.0,
            low_rate_factor: 0.7,
            high_rate_per_mile: 2.5,
            high_rate_factor: 1.3,
            lanes: vec![
                lane(Market::CaLax, Market::CaStk, true, 0.85),
                lane(Market::TxDal, Market::TxHou, false, 0.9),
                lane(Market::TxHou, Market::TxDal, false, 0.2),
                LaneRule {
                    excluded_year_months: vec![(2025, 2)],
                    ..lane(Market::NjEli, Market::IlChi, true, 0.5)
                },
                LaneRule {
                    excluded_months: vec![4, 5],
                    ..lane(Market::GaAtl, Market::IlChi, true, 0.8)
                },
                LaneRule {
                    only_months: vec![4, 5],
                    ..lane(Market::FlLak, Market::IlChi, true, 0.85)
                },
            ],
        }
    }
}

impl LanePreference {
    fn validate(&self) -> Result<()> {
        check_probability("weekend_probability", self.weekend_probability)?;
        check_probability("base_probability", self.base_probability)?;
        for lane in &self.lanes {
            check_probability("lane probability", lane.probability)?;
        }
        for factor in [self.heavy_factor, self.low_rate_factor, self.high_rate_factor] {
            if !(factor.is_finite() && factor >= 0.0) {
                return Err(FreightError::config("preference factors must be non-negative"));
            }
        }
        Ok(())
    }

    fn probability(&self, load: &Load) -> f64 {
        let pickup = load.pickup_time.date_naive();
        if matches!(pickup.weekday(), Weekday::Sat | Weekday::Sun) {
            return self.weekend_probability;
        }

        let mut base = self.base_probability;
        if let Some(rule) = self
            .lanes
            .iter()
            .find(|r| r.matches(load.origin.market, load.destination.market))
        {
            if !rule.serves(pickup.year(), pickup.month()) {
                return 0.0;
            }
            base = rule.probability;
        }

        let weight_factor = if load.weight > self.heavy_weight_lbs {
            self.heavy_factor
        } else {
            1.0
        };
        let rpm = load.rate_per_mile();
        let rate_factor = if rpm < self.low_rate_per_mile {
            self.low_rate_factor
        } else if rpm > self.high_rate_per_mile {
            self.high_rate_factor
        } else {
            1.0
        };

        (base * weight_factor * rate_factor).clamp(0.0, 1.0)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Produces one decision per load from a decision rule and a seeded RNG.
pub struct CarrierSimulator {
    rule: DecisionRule,
    response_minutes: u32,
    rng: StdRng,
}

impl CarrierSimulator {
    pub fn new(rule: DecisionRule, response_minutes: u32, seed: u64) -> Result<Self> {
        rule.validate()?;
        Ok(Self {
            rule,
            response_minutes,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn rule(&self) -> &DecisionRule {
        &self.rule
    }

    /// Noise-free acceptance probability of a load under the configured rule.
    pub fn acceptance_probability(&self, load: &Load) -> Result<f64> {
        load.validate()?;
        let p = match &self.rule {
            DecisionRule::Threshold {
                min_rate_per_mile,
                above_probability,
                below_probability,
            } => {
                if load.rate_per_mile() >= *min_rate_per_mile {
                    *above_probability
                } else {
                    *below_probability
                }
            }
            DecisionRule::Logistic {
                midpoint,
                steepness,
                ..
            } => sigmoid(steepness * (load.rate_per_mile() - midpoint)),
            DecisionRule::LanePreference(pref) => pref.probability(load),
        };
        Ok(p)
    }

    pub fn decide(&mut self, load: &Load) -> Result<CarrierDecision> {
        let mut p = self.acceptance_probability(load)?;
        if let DecisionRule::Logistic { noise, .. } = self.rule
            && noise > 0.0
        {
            p = (p + self.rng.gen_range(-noise..=noise)).clamp(0.0, 1.0);
        }
        let accepted = self.rng.gen_bool(p);

        let delay = Duration::seconds(
            self.rng
                .gen_range(0..=i64::from(self.response_minutes) * 60),
        );
        let decision_time = (load.posted_time + delay).min(load.pickup_time);

        Ok(CarrierDecision {
            load_id: load.id.clone(),
            accepted,
            decision_time,
        })
    }

    /// Decide every load, in order. Fails on the first malformed load.
    pub fn decide_all(&mut self, loads: &[Load]) -> Result<Vec<CarrierDecision>> {
        loads.iter().map(|load| self.decide(load)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::fixtures::load;
    use chrono::{TimeZone, Utc};

    fn threshold() -> DecisionRule {
        DecisionRule::Threshold {
            min_rate_per_mile: 2.0,
            above_probability: 1.0,
            below_probability: 0.1,
        }
    }

    #[test]
    fn test_threshold_probability() {
        let sim = CarrierSimulator::new(threshold(), 60, 1).unwrap();
        let cheap = load("a", Market::IlChi, Market::InInd, 1.5);
        let rich = load("b", Market::IlChi, Market::InInd, 2.0);
        assert_eq!(sim.acceptance_probability(&cheap).unwrap(), 0.1);
        assert_eq!(sim.acceptance_probability(&rich).unwrap(), 1.0);
    }

    #[test]
    fn test_one_decision_per_load_in_order() {
        let mut sim = CarrierSimulator::new(threshold(), 60, 1).unwrap();
        let loads: Vec<_> = (0..20)
            .map(|i| load(&format!("l{i}"), Market::IlChi, Market::InInd, 1.0 + i as f64 * 0.1))
            .collect();
        let decisions = sim.decide_all(&loads).unwrap();
        assert_eq!(decisions.len(), loads.len());
        for (l, d) in loads.iter().zip(&decisions) {
            assert_eq!(d.load_id, l.id);
            assert!(d.decision_time >= l.posted_time && d.decision_time <= l.pickup_time);
            if l.rate_per_mile() >= 2.0 {
                assert!(d.accepted);
            }
        }
    }

    #[test]
    fn test_malformed_load_is_data_error() {
        let mut sim = CarrierSimulator::new(threshold(), 60, 1).unwrap();
        let mut bad = load("a", Market::IlChi, Market::InInd, 2.0);
        bad.weight = 0;
        assert!(matches!(sim.decide(&bad), Err(FreightError::Data(_))));
    }

    #[test]
    fn test_invalid_rule_is_config_error() {
        let rule = DecisionRule::Threshold {
            min_rate_per_mile: 2.0,
            above_probability: 1.5,
            below_probability: 0.1,
        };
        assert!(matches!(
            CarrierSimulator::new(rule, 60, 1),
            Err(FreightError::Config(_))
        ));
    }

    #[test]
    fn test_logistic_is_monotonic_in_rate() {
        let rule = DecisionRule::Logistic {
            midpoint: 2.0,
            steepness: 4.0,
            noise: 0.05,
        };
        let sim = CarrierSimulator::new(rule, 60, 1).unwrap();
        let low = sim
            .acceptance_probability(&load("a", Market::IlChi, Market::InInd, 1.0))
            .unwrap();
        let mid = sim
            .acceptance_probability(&load("b", Market::IlChi, Market::InInd, 2.0))
            .unwrap();
        let high = sim
            .acceptance_probability(&load("c", Market::IlChi, Market::InInd, 3.0))
            .unwrap();
        assert!(low < mid && mid < high);
        assert!((mid - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_lane_preference_rules() {
        let sim = CarrierSimulator::new(DecisionRule::default(), 60, 1).unwrap();

        // Preferred lane, mid-range rate, light load.
        let lax_stk = load("a", Market::CaStk, Market::CaLax, 2.0);
        assert!((sim.acceptance_probability(&lax_stk).unwrap() - 0.85).abs() < 1e-12);

        // Unlisted lane falls back to the base probability, scaled by the high-rate factor.
        let other = load("b", Market::MnMin, Market::WiMil, 2.8);
        assert!((sim.acceptance_probability(&other).unwrap() - 0.0013).abs() < 1e-12);

        // February 2025 blackout on ELI-CHI.
        let mut eli = load("c", Market::NjEli, Market::IlChi, 2.0);
        eli.pickup_time = Utc.with_ymd_and_hms(2025, 2, 11, 9, 0, 0).unwrap();
        eli.posted_time = eli.pickup_time - Duration::hours(5);
        assert_eq!(sim.acceptance_probability(&eli).unwrap(), 0.0);

        // Weekend pickups ignore lane preferences.
        let mut weekend = load("d", Market::CaLax, Market::CaStk, 2.0);
        weekend.pickup_time = Utc.with_ymd_and_hms(2025, 3, 8, 9, 0, 0).unwrap();
        weekend.posted_time = weekend.pickup_time - Duration::hours(5);
        assert_eq!(sim.acceptance_probability(&weekend).unwrap(), 0.05);

        // Heavy and expensive on DAL->HOU is capped at certainty.
        let mut heavy = load("e", Market::TxDal, Market::TxHou, 2.6);
        heavy.weight = 40_000;
        let p = sim.acceptance_probability(&heavy).unwrap();
        assert!((p - 0.9 * 0.7 * 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_produce_season_switch() {
        let sim = CarrierSimulator::new(DecisionRule::default(), 60, 1).unwrap();
        let mut lak = load("a", Market::FlLak, Market::IlChi, 2.0);
        // March: LAK-CHI is out of season.
        assert_eq!(sim.acceptance_probability(&lak).unwrap(), 0.0);
        lak.pickup_time = Utc.with_ymd_and_hms(2025, 4, 8, 9, 0, 0).unwrap();
        lak.posted_time = lak.pickup_time - Duration::hours(5);
        assert!((sim.acceptance_probability(&lak).unwrap() - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_rule_deserializes_from_toml() {
        let rule: DecisionRule = toml::from_str(
            "type = \"threshold\"\nmin_rate_per_mile = 2.0\nabove_probability = 1.0\nbelow_probability = 0.1\n",
        )
        .unwrap();
        assert_eq!(rule, threshold());
    }
}
