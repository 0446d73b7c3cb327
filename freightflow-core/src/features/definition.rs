//! Feature definitions: the declared outputs of the feature dataflow.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Float,
    Int,
    Bool,
    Text,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Text => "text",
        })
    }
}

/// A declared feature and the dataflow inputs it is computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    pub name: String,
    pub kind: FeatureKind,
    pub inputs: Vec<String>,
    pub description: String,
}

impl FeatureDefinition {
    pub fn new(name: &str, kind: FeatureKind, inputs: &[&str], description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            description: description.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_matches_serde_name() {
        assert_eq!(FeatureKind::Float.to_string(), "float");
        assert_eq!(
            serde_json::to_string(&FeatureKind::Text).unwrap(),
            "\"text\""
        );
        assert_eq!(format!("{:<5}|", FeatureKind::Int), "int  |");
    }
}
