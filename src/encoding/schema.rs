//! Frozen feature schema and categorical encoding map

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered, authoritative list of encoded feature names for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl From<Vec<String>> for FeatureSchema {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }
}

/// Categorical columns discovered on the first block, replayed on every later block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncodingMap {
    columns: Vec<String>,
}

impl CategoricalEncodingMap {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Name of the indicator column for `level` of `column`
pub(crate) fn indicator_name(column: &str, level: &str) -> String {
    format!("{}_{}", column, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_positions() {
        let schema = FeatureSchema::new(vec!["a".into(), "b_x".into(), "b_y".into()]);
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.position("b_y"), Some(2));
        assert!(!schema.contains("b_z"));
    }
}
