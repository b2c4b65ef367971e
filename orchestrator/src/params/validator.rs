//! Value set validation against a parameter schema

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::params::schema::{ParamKind, ParameterDef, ParameterSchema};
use crate::params::value_set::{RawValues, ValueSet};
use crate::utils::format_number;

/// A constraint a value failed to satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "limit", rename_all = "snake_case")]
pub enum Rule {
    Min(f64),
    Max(f64),
    Integer,
    MinLength(usize),
    MaxLength(usize),
    Pattern(String),
    OneOf(Vec<Value>),
    MinItems(usize),
    MaxItems(usize),
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Min(n) => write!(f, "min={}", format_number(*n)),
            Rule::Max(n) => write!(f, "max={}", format_number(*n)),
            Rule::Integer => write!(f, "integer"),
            Rule::MinLength(n) => write!(f, "min_length={n}"),
            Rule::MaxLength(n) => write!(f, "max_length={n}"),
            Rule::Pattern(p) => write!(f, "pattern={p}"),
            Rule::OneOf(options) => {
                let options: Vec<String> = options.iter().map(Value::to_string).collect();
                write!(f, "one_of=[{}]", options.join(", "))
            }
            Rule::MinItems(n) => write!(f, "min_items={n}"),
            Rule::MaxItems(n) => write!(f, "max_items={n}"),
        }
    }
}

/// One problem with a submitted value set
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("missing required parameter '{name}'")]
    MissingRequired { name: String },

    #[error("parameter '{name}' expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("parameter '{name}' violates {rule}")]
    ConstraintViolation { name: String, rule: Rule },

    #[error("parameter '{name}' is required by the current value of '{depends_on}'")]
    DependencyUnsatisfied { name: String, depends_on: String },

    #[error("unknown parameter '{name}'")]
    UnknownParameter { name: String },
}

impl ValidationError {
    /// The parameter the problem is about
    pub fn parameter(&self) -> &str {
        match self {
            ValidationError::MissingRequired { name }
            | ValidationError::TypeMismatch { name, .. }
            | ValidationError::ConstraintViolation { name, .. }
            | ValidationError::DependencyUnsatisfied { name, .. }
            | ValidationError::UnknownParameter { name } => name,
        }
    }
}

/// Every problem found in one validation pass
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{} validation error(s): {}", self.0.len(), messages.join("; "))
    }
}

impl ValidationErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }
}

/// Validate raw values against a schema.
///
/// All problems are collected; nothing short-circuits. Explicit `null`
/// counts as absent.
pub fn validate(schema: &ParameterSchema, raw: &RawValues) -> Result<ValueSet, ValidationErrors> {
    let mut errors = Vec::new();

    let supplied = |name: &str| raw.get(name).filter(|v| !v.is_null());

    // Defaults
    let mut resolved: BTreeMap<String, Value> = BTreeMap::new();
    for param in schema.iter() {
        if let Some(value) = supplied(&param.name).or(param.default.as_ref()) {
            resolved.insert(param.name.clone(), value.clone());
        }
    }

    // Required parameters without a show condition
    for param in schema.iter() {
        let conditional = param.show_rules().next().is_some();
        if param.required && !conditional && !resolved.contains_key(&param.name) {
            errors.push(ValidationError::MissingRequired {
                name: param.name.clone(),
            });
        }
    }

    // Types and constraints of supplied values
    for param in schema.iter() {
        if let Some(value) = supplied(&param.name) {
            check_value(param, value, &mut errors);
        }
    }

    // Dependency rules, at most one record per parameter
    for param in schema.iter() {
        if resolved.contains_key(&param.name) {
            continue;
        }
        if let Some(on) = unsatisfied_dependency(param, &resolved) {
            errors.push(ValidationError::DependencyUnsatisfied {
                name: param.name.clone(),
                depends_on: on.to_string(),
            });
        }
    }

    // Unknown names
    for name in raw.keys() {
        if schema.get(name).is_none() {
            errors.push(ValidationError::UnknownParameter { name: name.clone() });
        }
    }

    if errors.is_empty() {
        debug!("Validated {} parameter(s)", resolved.len());
        Ok(ValueSet::new(resolved))
    } else {
        debug!("Validation found {} problem(s)", errors.len());
        Err(ValidationErrors(errors))
    }
}

fn unsatisfied_dependency<'a>(
    param: &'a ParameterDef,
    resolved: &BTreeMap<String, Value>,
) -> Option<&'a str> {
    let mut show_rules = param.show_rules().peekable();
    if param.required && show_rules.peek().is_some() {
        let shown: Vec<_> = show_rules.collect();
        if shown.iter().all(|rule| rule.holds(resolved)) {
            return shown.first().map(|rule| rule.on.as_str());
        }
    }

    param
        .require_rules()
        .find(|rule| rule.holds(resolved))
        .map(|rule| rule.on.as_str())
}

/// Type-check one value and apply the rules of its declared kind
pub(crate) fn check_value(param: &ParameterDef, value: &Value, errors: &mut Vec<ValidationError>) {
    let name = &param.name;
    let mismatch = |errors: &mut Vec<ValidationError>| {
        errors.push(ValidationError::TypeMismatch {
            name: name.clone(),
            expected: param.kind.type_name().to_string(),
            actual: json_type_name(value).to_string(),
        })
    };
    let violation = |errors: &mut Vec<ValidationError>, rule: Rule| {
        errors.push(ValidationError::ConstraintViolation {
            name: name.clone(),
            rule,
        })
    };

    match &param.kind {
        ParamKind::String {
            pattern,
            min_length,
            max_length,
        } => {
            let Some(s) = value.as_str() else {
                return mismatch(errors);
            };
            let length = s.chars().count();
            if let Some(min) = min_length {
                if length < *min {
                    violation(errors, Rule::MinLength(*min));
                }
            }
            if let Some(max) = max_length {
                if length > *max {
                    violation(errors, Rule::MaxLength(*max));
                }
            }
            if let Some(pattern) = pattern {
                let matches = Regex::new(pattern)
                    .map(|re| re.is_match(s))
                    .unwrap_or(false);
                if !matches {
                    violation(errors, Rule::Pattern(pattern.clone()));
                }
            }
        }
        ParamKind::Number { min, max, integer } => {
            let Some(n) = value.as_f64() else {
                return mismatch(errors);
            };
            if *integer && n.fract() != 0.0 {
                violation(errors, Rule::Integer);
            }
            if let Some(min) = min {
                if n < *min {
                    violation(errors, Rule::Min(*min));
                }
            }
            if let Some(max) = max {
                if n > *max {
                    violation(errors, Rule::Max(*max));
                }
            }
        }
        ParamKind::Boolean => {
            if !value.is_boolean() {
                mismatch(errors);
            }
        }
        ParamKind::Enum { options } => {
            if !(value.is_string() || value.is_number() || value.is_boolean()) {
                return mismatch(errors);
            }
            if !options.contains(value) {
                violation(errors, Rule::OneOf(options.clone()));
            }
        }
        ParamKind::Array {
            min_items,
            max_items,
        } => {
            let Some(items) = value.as_array() else {
                return mismatch(errors);
            };
            if let Some(min) = min_items {
                if items.len() < *min {
                    violation(errors, Rule::MinItems(*min));
                }
            }
            if let Some(max) = max_items {
                if items.len() > *max {
                    violation(errors, Rule::MaxItems(*max));
                }
            }
        }
        ParamKind::Object => {
            if !value.is_object() {
                mismatch(errors);
            }
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
