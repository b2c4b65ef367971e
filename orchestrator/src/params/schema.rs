//! Parameter schema types

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::params::validator::check_value;

/// Declared type of a parameter, with the rules that apply to that type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default)]
        integer: bool,
    },
    Boolean,
    Enum {
        options: Vec<Value>,
    },
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    Object,
}

impl ParamKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::String { .. } => "string",
            ParamKind::Number { .. } => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Enum { .. } => "enum",
            ParamKind::Array { .. } => "array",
            ParamKind::Object => "object",
        }
    }
}

/// What a dependency rule controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyEffect {
    /// The parameter is only shown (and only required) while the condition holds
    Show,
    /// The parameter becomes required while the condition holds
    Require,
}

/// A condition over another parameter's value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRule {
    /// The parameter the condition reads
    pub on: String,

    /// Holds when `on` equals this value; when absent, holds when `on` is truthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,

    pub effect: DependencyEffect,
}

impl DependencyRule {
    pub fn holds(&self, values: &BTreeMap<String, Value>) -> bool {
        let current = values.get(&self.on);
        match &self.equals {
            Some(expected) => current == Some(expected),
            None => current.map(is_truthy).unwrap_or(false),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,

    #[serde(flatten)]
    pub kind: ParamKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Display grouping, ignored by validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependencyRule>,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            required: false,
            description: None,
            group: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn depends_on(mut self, rule: DependencyRule) -> Self {
        self.depends_on.push(rule);
        self
    }

    pub(crate) fn show_rules(&self) -> impl Iterator<Item = &DependencyRule> {
        self.depends_on
            .iter()
            .filter(|r| r.effect == DependencyEffect::Show)
    }

    pub(crate) fn require_rules(&self) -> impl Iterator<Item = &DependencyRule> {
        self.depends_on
            .iter()
            .filter(|r| r.effect == DependencyEffect::Require)
    }
}

/// Ordered parameter declarations of a template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSchema {
    parameters: Vec<ParameterDef>,
}

/// Defects in a schema definition itself
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("parameter '{0}' is declared more than once")]
    Duplicate(String),

    #[error("parameter '{name}' depends on undeclared parameter '{on}'")]
    UnknownDependency { name: String, on: String },

    #[error("parameter '{name}' has an invalid pattern: {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("default of parameter '{name}' is invalid: {reason}")]
    InvalidDefault { name: String, reason: String },
}

impl ParameterSchema {
    pub fn new(parameters: Vec<ParameterDef>) -> Self {
        Self { parameters }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDef> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Check the schema is internally consistent
    pub fn check(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(SchemaError::Duplicate(param.name.clone()));
            }
        }

        for param in &self.parameters {
            for rule in &param.depends_on {
                if rule.on == param.name || self.get(&rule.on).is_none() {
                    return Err(SchemaError::UnknownDependency {
                        name: param.name.clone(),
                        on: rule.on.clone(),
                    });
                }
            }

            if let ParamKind::String {
                pattern: Some(pattern),
                ..
            } = &param.kind
            {
                regex::Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                    name: param.name.clone(),
                    reason: e.to_string(),
                })?;
            }

            if let Some(default) = &param.default {
                let mut problems = Vec::new();
                check_value(param, default, &mut problems);
                if let Some(problem) = problems.first() {
                    return Err(SchemaError::InvalidDefault {
                        name: param.name.clone(),
                        reason: problem.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Truthiness shared by dependency conditions and template conditionals
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
