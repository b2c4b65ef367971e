//! Validated parameter values

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Raw values as submitted by a caller, before defaulting and validation
pub type RawValues = BTreeMap<String, Value>;

/// The defaulted, validated values for one deployment attempt.
///
/// Only [`crate::params::validate`] produces a `ValueSet`, so holding one
/// proves the values passed the schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValueSet {
    values: BTreeMap<String, Value>,
}

impl ValueSet {
    pub(crate) fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The values as a JSON object, the root scope for rendering
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
