//! Feature encoding: typed feature values to a dense numeric design matrix.

use crate::error::{FreightError, Result};
use crate::features::{FeatureTable, FeatureValue, FeatureVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How one feature column maps onto model inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Encoding {
    /// Standardised number.
    Numeric { mean: f64, std: f64 },
    /// Boolean as 0 or 1.
    Flag,
    /// One input per category seen in training. Unseen categories encode as all zeros.
    OneHot { categories: Vec<String> },
}

impl Encoding {
    fn width(&self) -> usize {
        match self {
            Self::Numeric { .. } | Self::Flag => 1,
            Self::OneHot { categories } => categories.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedFeature {
    pub name: String,
    pub encoding: Encoding,
}

/// Encoder fitted on a training table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    features: Vec<EncodedFeature>,
}

impl FeatureEncoder {
    pub fn fit(table: &FeatureTable) -> Result<Self> {
        if table.is_empty() {
            return Err(FreightError::training("cannot fit an encoder on an empty table"));
        }
        let mut features = Vec::new();
        for name in table.feature_names() {
            let values = table
                .column(name)
                .ok_or_else(|| FreightError::data(format!("missing column {name}")))?;
            features.push(EncodedFeature {
                name: name.to_string(),
                encoding: fit_column(name, values)?,
            });
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[EncodedFeature] {
        &self.features
    }

    /// Number of numeric model inputs.
    pub fn width(&self) -> usize {
        self.features.iter().map(|f| f.encoding.width()).sum()
    }

    /// Names of the encoded inputs, e.g. `lane=CA_LAX-CA_STK`.
    pub fn input_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width());
        for feature in &self.features {
            match &feature.encoding {
                Encoding::OneHot { categories } => {
                    names.extend(categories.iter().map(|c| format!("{}={c}", feature.name)));
                }
                _ => names.push(feature.name.clone()),
            }
        }
        names
    }

    pub fn transform_row(&self, row: &FeatureVector) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.width());
        for feature in &self.features {
            let value = row.get(&feature.name).ok_or_else(|| {
                FreightError::data(format!("feature vector lacks {}", feature.name))
            })?;
            match &feature.encoding {
                Encoding::Numeric { mean, std } => {
                    let x = numeric(&feature.name, value)?;
                    out.push((x - mean) / std);
                }
                Encoding::Flag => {
                    let flag = value
                        .as_bool()
                        .ok_or_else(|| type_error(&feature.name, "bool", value))?;
                    out.push(if flag { 1.0 } else { 0.0 });
                }
                Encoding::OneHot { categories } => {
                    let text = value
                        .as_text()
                        .ok_or_else(|| type_error(&feature.name, "text", value))?;
                    out.extend(categories.iter().map(|c| if c == text { 1.0 } else { 0.0 }));
                }
            }
        }
        Ok(out)
    }

    pub fn transform(&self, table: &FeatureTable) -> Result<Vec<Vec<f64>>> {
        table.rows().map(|row| self.transform_row(&row)).collect()
    }
}

fn fit_column(name: &str, values: &[FeatureValue]) -> Result<Encoding> {
    let first = values
        .first()
        .ok_or_else(|| FreightError::training(format!("column {name} is empty")))?;
    match first {
        FeatureValue::Float(_) | FeatureValue::Int(_) => {
            let xs = values
                .iter()
                .map(|v| numeric(name, v))
                .collect::<Result<Vec<_>>>()?;
            let n = xs.len() as f64;
            let mean = xs.iter().sum::<f64>() / n;
            let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
            Ok(Encoding::Numeric { mean, std })
        }
        FeatureValue::Bool(_) => {
            if let Some(bad) = values.iter().find(|v| v.as_bool().is_none()) {
                return Err(type_error(name, "bool", bad));
            }
            Ok(Encoding::Flag)
        }
        FeatureValue::Text(_) => {
            let categories = values
                .iter()
                .map(|v| {
                    v.as_text()
                        .map(str::to_string)
                        .ok_or_else(|| type_error(name, "text", v))
                })
                .collect::<Result<BTreeSet<_>>>()?;
            Ok(Encoding::OneHot {
                categories: categories.into_iter().collect(),
            })
        }
    }
}

fn numeric(name: &str, value: &FeatureValue) -> Result<f64> {
    match value {
        FeatureValue::Float(v) => Ok(*v),
        FeatureValue::Int(v) => Ok(*v as f64),
        other => Err(type_error(name, "number", other)),
    }
}

fn type_error(name: &str, expected: &str, found: &FeatureValue) -> FreightError {
    FreightError::data(format!(
        "feature {name} should be {expected}, found {}",
        found.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> FeatureTable {
        let mut t = FeatureTable::new(vec!["a".into(), "b".into(), "c".into()]);
        t.push_column(
            "rate",
            vec![FeatureValue::Float(1.0), FeatureValue::Float(2.0), FeatureValue::Float(3.0)],
        )
        .unwrap();
        t.push_column(
            "heavy",
            vec![FeatureValue::Bool(true), FeatureValue::Bool(false), FeatureValue::Bool(true)],
        )
        .unwrap();
        t.push_column("lane", vec!["X-Y".into(), "A-B".into(), "X-Y".into()])
            .unwrap();
        t
    }

    #[test]
    fn test_fit_and_transform() {
        let encoder = FeatureEncoder::fit(&table()).unwrap();
        assert_eq!(encoder.width(), 4);
        assert_eq!(
            encoder.input_names(),
            vec!["heavy", "lane=A-B", "lane=X-Y", "rate"]
        );
        let rows = encoder.transform(&table()).unwrap();
        assert_eq!(rows[1][0..3].to_vec(), vec![0.0, 1.0, 0.0]);
        // Standardised: mean 2, population std sqrt(2/3).
        assert!(rows[1][3].abs() < 1e-12);
        assert!((rows[2][3] - 1.0 / (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_unseen_category_and_missing_feature() {
        let encoder = FeatureEncoder::fit(&table()).unwrap();
        let mut row = FeatureVector::new();
        row.insert("rate", 2.0);
        row.insert("heavy", false);
        row.insert("lane", "Q-R");
        assert_eq!(encoder.transform_row(&row).unwrap(), vec![0.0, 0.0, 0.0, 0.0]);

        let mut partial = FeatureVector::new();
        partial.insert("rate", 2.0);
        assert!(matches!(
            encoder.transform_row(&partial),
            Err(FreightError::Data(_))
        ));
    }

    #[test]
    fn test_constant_column_and_type_mismatch() {
        let mut t = FeatureTable::new(vec!["a".into(), "b".into()]);
        t.push_column("c", vec![FeatureValue::Int(4), FeatureValue::Int(4)]).unwrap();
        let encoder = FeatureEncoder::fit(&t).unwrap();
        assert_eq!(encoder.transform(&t).unwrap(), vec![vec![0.0], vec![0.0]]);

        let mut row = FeatureVector::new();
        row.insert("c", "text");
        assert!(encoder.transform_row(&row).is_err());

        let mut mixed = FeatureTable::new(vec!["a".into(), "b".into()]);
        mixed
            .push_column("m", vec![FeatureValue::Float(1.0), FeatureValue::Bool(true)])
            .unwrap();
        assert!(FeatureEncoder::fit(&mixed).is_err());
    }
}
