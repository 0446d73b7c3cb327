//! Freight markets (KMAs), locations and great-circle geometry.

use crate::error::{FreightError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// A key market area loads originate from or deliver to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    CaStk,
    CaLax,
    AzPho,
    TxDal,
    TxHou,
    NjEli,
    IlChi,
    InInd,
    MnMin,
    WiMil,
    FlLak,
    GaAtl,
}

impl Market {
    pub const ALL: [Market; 12] = [
        Market::CaStk,
        Market::CaLax,
        Market::AzPho,
        Market::TxDal,
        Market::TxHou,
        Market::NjEli,
        Market::IlChi,
        Market::InInd,
        Market::MnMin,
        Market::WiMil,
        Market::FlLak,
        Market::GaAtl,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::CaStk => "CA_STK",
            Self::CaLax => "CA_LAX",
            Self::AzPho => "AZ_PHO",
            Self::TxDal => "TX_DAL",
            Self::TxHou => "TX_HOU",
            Self::NjEli => "NJ_ELI",
            Self::IlChi => "IL_CHI",
            Self::InInd => "IN_IND",
            Self::MnMin => "MN_MIN",
            Self::WiMil => "WI_MIL",
            Self::FlLak => "FL_LAK",
            Self::GaAtl => "GA_ATL",
        }
    }

    /// Default (latitude, longitude) of the market center.
    pub fn coordinates(&self) -> (f64, f64) {
        match self {
            Self::CaStk => (37.9577, -121.2908),
            Self::CaLax => (34.0522, -118.2437),
            Self::AzPho => (33.4484, -112.0740),
            Self::TxDal => (32.7767, -96.7970),
            Self::TxHou => (29.7604, -95.3698),
            Self::NjEli => (40.6639, -74.2107),
            Self::IlChi => (41.8781, -87.6298),
            Self::InInd => (39.7684, -86.1581),
            Self::MnMin => (44.9778, -93.2650),
            Self::WiMil => (43.0389, -87.9065),
            Self::FlLak => (28.0395, -81.9498),
            Self::GaAtl => (33.7490, -84.3880),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Market {
    type Err = FreightError;

    fn from_str(s: &str) -> Result<Self> {
        Market::ALL
            .iter()
            .copied()
            .find(|m| m.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FreightError::data(format!("Unknown market: {s}")))
    }
}

/// A point inside a market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub market: Market,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Location at the market's default coordinates.
    pub fn at_center(market: Market) -> Self {
        let (latitude, longitude) = market.coordinates();
        Self {
            market,
            latitude,
            longitude,
        }
    }

    /// Location displaced from the market center by a random bearing and a random
    /// distance of at most `max_miles`.
    pub fn jittered<R: Rng + ?Sized>(market: Market, max_miles: f64, rng: &mut R) -> Self {
        let (lat, lon) = market.coordinates();
        let (latitude, longitude) = displace(lat, lon, max_miles, rng);
        Self {
            market,
            latitude,
            longitude,
        }
    }

    pub fn miles_to(&self, other: &Location) -> f64 {
        haversine_miles(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Great-circle distance in miles between two points given in decimal degrees.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

fn displace<R: Rng + ?Sized>(lat: f64, lon: f64, max_miles: f64, rng: &mut R) -> (f64, f64) {
    if max_miles <= 0.0 {
        return (lat, lon);
    }
    let angular = rng.gen_range(0.0..=max_miles / EARTH_RADIUS_MILES);
    let bearing = rng.gen_range(0.0..2.0 * PI);
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();

    let new_lat = (lat_rad.sin() * angular.cos()
        + lat_rad.cos() * angular.sin() * bearing.cos())
    .asin();
    let new_lon = lon_rad
        + (bearing.sin() * angular.sin() * lat_rad.cos())
            .atan2(angular.cos() - lat_rad.sin() * new_lat.sin());

    (new_lat.to_degrees(), new_lon.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_haversine_known_distance() {
        // Los Angeles to Stockton is roughly 300 miles as the crow flies.
        let lax = Location::at_center(Market::CaLax);
        let stk = Location::at_center(Market::CaStk);
        let d = lax.miles_to(&stk);
        assert!((280.0..320.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        assert!(haversine_miles(41.0, -87.0, 41.0, -87.0).abs() < 1e-9);
    }

    #[test]
    fn test_jitter_stays_within_radius() {
        let mut rng = StdRng::seed_from_u64(7);
        let center = Location::at_center(Market::IlChi);
        for _ in 0..200 {
            let loc = Location::jittered(Market::IlChi, 30.0, &mut rng);
            assert!(center.miles_to(&loc) <= 30.0 + 1e-6);
        }
    }

    #[test]
    fn test_market_codes_parse() {
        for market in Market::ALL {
            assert_eq!(market.code().parse::<Market>().unwrap(), market);
        }
        assert!("XX_YYY".parse::<Market>().is_err());
    }

    #[test]
    fn test_market_serializes_as_code() {
        let json = serde_json::to_string(&Market::TxDal).unwrap();
        assert_eq!(json, "\"TX_DAL\"");
    }
}
