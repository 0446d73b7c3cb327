//! Row-aligned feature tables handed from the feature store to the modeling stage.

use crate::error::{FreightError, Result};
use crate::features::value::FeatureValue;
use crate::simulation::types::SimulationRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Named feature values for one load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(BTreeMap<String, FeatureValue>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, FeatureValue)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, FeatureValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Label and partitioning data for one row, taken from the raw simulation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub pickup_date: NaiveDate,
    pub accepted: bool,
}

/// Feature columns keyed by load id, optionally with outcomes for supervised use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    keys: Vec<String>,
    columns: BTreeMap<String, Vec<FeatureValue>>,
    outcomes: Option<Vec<Outcome>>,
}

impl FeatureTable {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            columns: BTreeMap::new(),
            outcomes: None,
        }
    }

    /// Add a feature column. It must have one value per key.
    pub fn push_column(&mut self, name: &str, values: Vec<FeatureValue>) -> Result<()> {
        if values.len() != self.keys.len() {
            return Err(FreightError::data(format!(
                "feature {name} has {} values for {} rows",
                values.len(),
                self.keys.len()
            )));
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    pub fn with_outcomes(mut self, outcomes: Vec<Outcome>) -> Result<Self> {
        if outcomes.len() != self.keys.len() {
            return Err(FreightError::data(format!(
                "{} outcomes for {} rows",
                outcomes.len(),
                self.keys.len()
            )));
        }
        self.outcomes = Some(outcomes);
        Ok(self)
    }

    /// Attach outcomes by looking each key up in the raw records.
    pub fn attach_outcomes(self, records: &[SimulationRecord]) -> Result<Self> {
        let by_id: HashMap<&str, &SimulationRecord> =
            records.iter().map(|r| (r.load.id.as_str(), r)).collect();
        let outcomes = self
            .keys
            .iter()
            .map(|key| {
                by_id
                    .get(key.as_str())
                    .map(|r| Outcome {
                        pickup_date: r.load.pickup_time.date_naive(),
                        accepted: r.decision.accepted,
                    })
                    .ok_or_else(|| FreightError::not_found(format!("raw record for load {key}")))
            })
            .collect::<Result<Vec<_>>>()?;
        self.with_outcomes(outcomes)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[FeatureValue]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn outcomes(&self) -> Option<&[Outcome]> {
        self.outcomes.as_deref()
    }

    /// Acceptance labels. Fails when the table carries no outcomes.
    pub fn target(&self) -> Result<Vec<bool>> {
        self.outcomes
            .as_ref()
            .map(|o| o.iter().map(|o| o.accepted).collect())
            .ok_or_else(|| FreightError::training("feature table has no acceptance labels"))
    }

    pub fn row(&self, index: usize) -> Option<FeatureVector> {
        if index >= self.keys.len() {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|(name, values)| (name.clone(), values[index].clone()))
                .collect(),
        )
    }

    pub fn rows(&self) -> impl Iterator<Item = FeatureVector> + '_ {
        (0..self.len()).filter_map(|i| self.row(i))
    }

    /// Split into rows picked up before `cutoff` and rows on or after it.
    pub fn split_at(&self, cutoff: NaiveDate) -> Result<(FeatureTable, FeatureTable)> {
        let outcomes = self
            .outcomes
            .as_ref()
            .ok_or_else(|| FreightError::data("cannot split a table without pickup dates"))?;
        let (before, after): (Vec<usize>, Vec<usize>) =
            (0..self.len()).partition(|&i| outcomes[i].pickup_date < cutoff);
        Ok((self.select(&before), self.select(&after)))
    }

    fn select(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable {
            keys: indices.iter().map(|&i| self.keys[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| {
                    (
                        name.clone(),
                        indices.iter().map(|&i| values[i].clone()).collect(),
                    )
                })
                .collect(),
            outcomes: self
                .outcomes
                .as_ref()
                .map(|o| indices.iter().map(|&i| o[i]).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> FeatureTable {
        let mut t = FeatureTable::new(vec!["a".into(), "b".into(), "c".into()]);
        t.push_column(
            "rate_per_mile",
            vec![1.0.into(), 2.0.into(), 3.0.into()],
        )
        .unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2025, 4, d).unwrap();
        t.with_outcomes(vec![
            Outcome { pickup_date: day(28), accepted: false },
            Outcome { pickup_date: day(30), accepted: true },
            Outcome { pickup_date: day(29), accepted: true },
        ])
        .unwrap()
    }

    #[test]
    fn test_split_by_pickup_date() {
        let (train, test) = table()
            .split_at(NaiveDate::from_ymd_opt(2025, 4, 30).unwrap())
            .unwrap();
        assert_eq!(train.keys(), &["a".to_string(), "c".to_string()]);
        assert_eq!(test.keys(), &["b".to_string()]);
        assert_eq!(train.target().unwrap(), vec![false, true]);
        assert_eq!(
            test.column("rate_per_mile").unwrap(),
            &[FeatureValue::Float(2.0)]
        );
    }

    #[test]
    fn test_rows_and_length_checks() {
        let mut t = table();
        let row = t.row(1).unwrap();
        assert_eq!(row.get("rate_per_mile"), Some(&FeatureValue::Float(2.0)));
        assert!(t.row(3).is_none());
        assert!(t.push_column("short", vec![1.0.into()]).is_err());
    }

    #[test]
    fn test_unlabelled_table() {
        let t = FeatureTable::new(vec!["a".into()]);
        assert!(matches!(t.target(), Err(FreightError::Training(_))));
        assert!(t.split_at(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()).is_err());
    }
}
