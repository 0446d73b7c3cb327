//! Load generator: independent random draws of freight loads.

use crate::config::SimulationConfig;
use crate::error::{FreightError, Result};
use crate::market::{Location, Market};
use crate::simulation::types::Load;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Destination redraws allowed before a distance range is declared unreachable.
const MAX_DISTANCE_ATTEMPTS: usize = 64;

/// Longest allowed gap between posting a load and its pickup.
const MAX_POSTED_LEAD_HOURS: f64 = 24.0 * 366.0;

/// Generates loads from the configured distributions using a seeded RNG.
pub struct LoadGenerator {
    config: SimulationConfig,
    pickup_days: Vec<NaiveDate>,
    weight_bounds: (u32, u32),
    rng: StdRng,
}

impl LoadGenerator {
    /// Validate the distribution parameters and seed the generator.
    pub fn new(config: &SimulationConfig, seed: u64) -> Result<Self> {
        validate(config)?;
        let pickup_days = pickup_days(config);
        if pickup_days.is_empty() {
            return Err(FreightError::config(format!(
                "pickup window {}..={} contains no eligible days",
                config.window_start, config.window_end
            )));
        }
        let weight_bounds = (
            config.weight_lbs.min.ceil() as u32,
            config.weight_lbs.max.floor() as u32,
        );
        if weight_bounds.0 == 0 || weight_bounds.0 > weight_bounds.1 {
            return Err(FreightError::config(format!(
                "weight_lbs [{}, {}] holds no positive whole pound",
                config.weight_lbs.min, config.weight_lbs.max
            )));
        }
        Ok(Self {
            config: config.clone(),
            pickup_days,
            weight_bounds,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Days a pickup may fall on, in calendar order.
    pub fn pickup_days(&self) -> &[NaiveDate] {
        &self.pickup_days
    }

    /// Generate `count` loads with pickup dates drawn across the window.
    pub fn generate(&mut self, count: usize) -> Result<Vec<Load>> {
        ensure_positive(count)?;
        let mut loads = Vec::with_capacity(count);
        for _ in 0..count {
            let day = *self
                .pickup_days
                .choose(&mut self.rng)
                .ok_or_else(|| FreightError::config("no pickup days"))?;
            loads.push(self.generate_one(day)?);
        }
        Ok(loads)
    }

    /// Generate `count` loads picked up on `day`.
    pub fn generate_for_day(&mut self, day: NaiveDate, count: usize) -> Result<Vec<Load>> {
        ensure_positive(count)?;
        (0..count).map(|_| self.generate_one(day)).collect()
    }

    fn generate_one(&mut self, day: NaiveDate) -> Result<Load> {
        let (origin, destination, distance) = self.draw_lane()?;

        let rate_per_mile = self
            .rng
            .gen_range(self.config.rate_per_mile.min..=self.config.rate_per_mile.max);
        let offered_rate = round_cents(f64::from(distance) * rate_per_mile);
        let weight = self
            .rng
            .gen_range(self.weight_bounds.0..=self.weight_bounds.1);

        let pickup_time = self.draw_pickup_time(day)?;
        let lead_hours = self
            .rng
            .gen_range(self.config.posted_lead_hours.min..=self.config.posted_lead_hours.max);
        let posted_time = Duration::try_seconds((lead_hours * 3600.0) as i64)
            .and_then(|lead| pickup_time.checked_sub_signed(lead))
            .ok_or_else(|| {
                FreightError::config(format!("posted lead of {lead_hours} hours is out of range"))
            })?;

        Ok(Load {
            id: self.draw_id(),
            origin,
            destination,
            distance,
            weight,
            offered_rate,
            pickup_time,
            posted_time,
        })
    }

    fn draw_lane(&mut self) -> Result<(Location, Location, u32)> {
        let markets = &self.config.markets;
        let origin_market = *markets
            .choose(&mut self.rng)
            .ok_or_else(|| FreightError::config("no markets configured"))?;
        let candidates: Vec<Market> = markets
            .iter()
            .copied()
            .filter(|m| *m != origin_market)
            .collect();
        let jitter = self.config.location_jitter_miles;

        for _ in 0..MAX_DISTANCE_ATTEMPTS {
            let destination_market = *candidates
                .choose(&mut self.rng)
                .ok_or_else(|| FreightError::config("markets need at least two entries"))?;
            let origin = Location::jittered(origin_market, jitter, &mut self.rng);
            let destination = Location::jittered(destination_market, jitter, &mut self.rng);
            let miles = ((origin.miles_to(&destination) * self.config.circuity_factor) as u32).max(1);
            if self.config.distance_miles.contains(f64::from(miles)) {
                return Ok((origin, destination, miles));
            }
        }

        Err(FreightError::config(format!(
            "distance_miles [{}, {}] is unreachable from {origin_market}",
            self.config.distance_miles.min, self.config.distance_miles.max
        )))
    }

    fn draw_pickup_time(&mut self, day: NaiveDate) -> Result<DateTime<Utc>> {
        let hour = self
            .rng
            .gen_range(self.config.pickup_hour_start..self.config.pickup_hour_end);
        let minute = self.rng.gen_range(0..60);
        day.and_hms_opt(hour, minute, 0)
            .map(|t| t.and_utc())
            .ok_or_else(|| FreightError::config(format!("invalid pickup hour {hour}")))
    }

    fn draw_id(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill(&mut bytes);
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string()
    }
}

fn ensure_positive(count: usize) -> Result<()> {
    if count == 0 {
        return Err(FreightError::config("load count must be positive"));
    }
    Ok(())
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

fn pickup_days(config: &SimulationConfig) -> Vec<NaiveDate> {
    config
        .window_start
        .iter_days()
        .take_while(|d| *d <= config.window_end)
        .filter(|d| !config.weekdays_only || !is_weekend(*d))
        .collect()
}

fn validate(config: &SimulationConfig) -> Result<()> {
    config.rate_per_mile.validate("rate_per_mile")?;
    config.weight_lbs.validate("weight_lbs")?;
    config.distance_miles.validate("distance_miles")?;
    config.posted_lead_hours.validate("posted_lead_hours")?;
    if config.posted_lead_hours.max > MAX_POSTED_LEAD_HOURS {
        return Err(FreightError::config(format!(
            "posted_lead_hours: upper bound {} exceeds {MAX_POSTED_LEAD_HOURS} hours",
            config.posted_lead_hours.max
        )));
    }

    let mut distinct = config.markets.clone();
    distinct.sort();
    distinct.dedup();
    if distinct.len() < 2 {
        return Err(FreightError::config(
            "markets need at least two distinct entries",
        ));
    }
    if config.window_start > config.window_end {
        return Err(FreightError::config(format!(
            "empty pickup window {}..={}",
            config.window_start, config.window_end
        )));
    }
    if config.pickup_hour_start >= config.pickup_hour_end || config.pickup_hour_end > 24 {
        return Err(FreightError::config(format!(
            "pickup hours {}..{} must be a non-empty span within the day",
            config.pickup_hour_start, config.pickup_hour_end
        )));
    }
    if !(config.circuity_factor.is_finite() && config.circuity_factor > 0.0) {
        return Err(FreightError::config("circuity_factor must be positive"));
    }
    if !(config.location_jitter_miles.is_finite() && config.location_jitter_miles >= 0.0) {
        return Err(FreightError::config(
            "location_jitter_miles must be non-negative",
        ));
    }
    Ok(())
}
