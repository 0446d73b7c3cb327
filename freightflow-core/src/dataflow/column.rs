//! Typed columns flowing between dataflow nodes.

use crate::error::{FreightError, Result};
use crate::features::lane_history::LaneStats;
use crate::features::value::FeatureValue;
use chrono::{DateTime, Utc};

/// One column of values, one entry per load.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
    Time(Vec<DateTime<Utc>>),
    /// Intermediate lagged lane statistics; never stored.
    Lane(Vec<LaneStats>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Time(v) => v.len(),
            Self::Lane(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Time(_) => "time",
            Self::Lane(_) => "lane_stats",
        }
    }

    pub fn floats(&self) -> Result<&[f64]> {
        match self {
            Self::Float(v) => Ok(v),
            other => Err(mismatch("float", other)),
        }
    }

    pub fn ints(&self) -> Result<&[i64]> {
        match self {
            Self::Int(v) => Ok(v),
            other => Err(mismatch("int", other)),
        }
    }

    pub fn bools(&self) -> Result<&[bool]> {
        match self {
            Self::Bool(v) => Ok(v),
            other => Err(mismatch("bool", other)),
        }
    }

    pub fn texts(&self) -> Result<&[String]> {
        match self {
            Self::Text(v) => Ok(v),
            other => Err(mismatch("text", other)),
        }
    }

    pub fn times(&self) -> Result<&[DateTime<Utc>]> {
        match self {
            Self::Time(v) => Ok(v),
            other => Err(mismatch("time", other)),
        }
    }

    pub fn lane_stats(&self) -> Result<&[LaneStats]> {
        match self {
            Self::Lane(v) => Ok(v),
            other => Err(mismatch("lane_stats", other)),
        }
    }

    /// Value at `row` as a storable feature value. Timestamps become RFC 3339 text.
    pub fn value(&self, row: usize) -> Option<FeatureValue> {
        match self {
            Self::Float(v) => v.get(row).map(|x| FeatureValue::Float(*x)),
            Self::Int(v) => v.get(row).map(|x| FeatureValue::Int(*x)),
            Self::Bool(v) => v.get(row).map(|x| FeatureValue::Bool(*x)),
            Self::Text(v) => v.get(row).map(|x| FeatureValue::Text(x.clone())),
            Self::Time(v) => v.get(row).map(|x| FeatureValue::Text(x.to_rfc3339())),
            Self::Lane(_) => None,
        }
    }
}

fn mismatch(expected: &str, found: &Column) -> FreightError {
    FreightError::dataflow(format!(
        "expected a {expected} column, found {}",
        found.kind()
    ))
}
