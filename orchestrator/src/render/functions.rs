//! Built-in template functions

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::params::schema::is_truthy;
use crate::render::RenderError;
use crate::utils::{format_number, sha256_hash};

const FUNCTIONS: &[&str] = &[
    "default",
    "required",
    "base64Encode",
    "b64enc",
    "base64Decode",
    "b64dec",
    "toJSON",
    "toJson",
    "toYAML",
    "toYaml",
    "upper",
    "lower",
    "quote",
    "trim",
    "indent",
    "nindent",
    "sha256",
    "sha256sum",
    "not",
    "eq",
    "ne",
    "and",
    "or",
];

pub(crate) fn is_function(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

/// A function argument, possibly a reference that resolved to nothing
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Value(Value),
    Missing(String),
}

impl Arg {
    fn is_empty(&self) -> bool {
        match self {
            Arg::Missing(_) => true,
            Arg::Value(value) => is_empty(value),
        }
    }
}

/// Absent, null, empty string, empty list and empty map are empty.
/// `false` and `0` are values.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// The text a value renders as
pub fn canonical(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if n.is_f64() => n.as_f64().map(format_number).unwrap_or_default(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub(crate) fn call(name: &str, args: Vec<Arg>, lenient: bool) -> Result<Value, RenderError> {
    match name {
        "default" => {
            let [fallback, value] = take::<2>(name, args)?;
            if value.is_empty() {
                resolve(fallback, lenient)
            } else {
                resolve(value, lenient)
            }
        }
        "required" => {
            let [message, value] = take::<2>(name, args)?;
            if value.is_empty() {
                Err(RenderError::Required {
                    message: canonical(&resolve(message, lenient)?),
                })
            } else {
                resolve(value, lenient)
            }
        }
        _ => {
            let values = args
                .into_iter()
                .map(|arg| resolve(arg, lenient))
                .collect::<Result<Vec<_>, _>>()?;
            pure(name, values)
        }
    }
}

fn resolve(arg: Arg, lenient: bool) -> Result<Value, RenderError> {
    match arg {
        Arg::Value(value) => Ok(value),
        Arg::Missing(_) if lenient => Ok(Value::Null),
        Arg::Missing(name) => Err(RenderError::UndefinedReference { name }),
    }
}

fn take<const N: usize>(name: &str, args: Vec<Arg>) -> Result<[Arg; N], RenderError> {
    let count = args.len();
    args.try_into().map_err(|_| arity(name, N, count))
}

fn arity(name: &str, expected: usize, got: usize) -> RenderError {
    failed(name, format!("expected {expected} argument(s), got {got}"))
}

fn failed(name: &str, reason: impl Into<String>) -> RenderError {
    RenderError::FunctionFailed {
        function: name.to_string(),
        reason: reason.into(),
    }
}

fn single(name: &str, values: Vec<Value>) -> Result<Value, RenderError> {
    let count = values.len();
    let [value]: [Value; 1] = values.try_into().map_err(|_| arity(name, 1, count))?;
    Ok(value)
}

fn pair(name: &str, values: Vec<Value>) -> Result<(Value, Value), RenderError> {
    let count = values.len();
    let [a, b]: [Value; 2] = values.try_into().map_err(|_| arity(name, 2, count))?;
    Ok((a, b))
}

fn pure(name: &str, values: Vec<Value>) -> Result<Value, RenderError> {
    let text = |values: Vec<Value>| single(name, values).map(|v| canonical(&v));

    let result = match name {
        "base64Encode" | "b64enc" => Value::String(STANDARD.encode(text(values)?)),
        "base64Decode" | "b64dec" => {
            let bytes = STANDARD
                .decode(text(values)?.trim())
                .map_err(|e| failed(name, e.to_string()))?;
            Value::String(String::from_utf8(bytes).map_err(|e| failed(name, e.to_string()))?)
        }
        "toJSON" | "toJson" => Value::String(single(name, values)?.to_string()),
        "toYAML" | "toYaml" => {
            let yaml = serde_yaml::to_string(&single(name, values)?)
                .map_err(|e| failed(name, e.to_string()))?;
            Value::String(yaml.trim_end_matches('\n').to_string())
        }
        "upper" => Value::String(text(values)?.to_uppercase()),
        "lower" => Value::String(text(values)?.to_lowercase()),
        "trim" => Value::String(text(values)?.trim().to_string()),
        "quote" => Value::String(Value::String(text(values)?).to_string()),
        "sha256" | "sha256sum" => Value::String(sha256_hash(text(values)?.as_bytes())),
        "indent" | "nindent" => {
            let (width, value) = pair(name, values)?;
            let width = width
                .as_u64()
                .ok_or_else(|| failed(name, format!("width must be a non-negative integer, got {width}")))?;
            let pad = " ".repeat(width as usize);
            let indented = format!("{pad}{}", canonical(&value).replace('\n', &format!("\n{pad}")));
            if name == "nindent" {
                Value::String(format!("\n{indented}"))
            } else {
                Value::String(indented)
            }
        }
        "not" => Value::Bool(!is_truthy(&single(name, values)?)),
        "eq" => {
            let (a, b) = pair(name, values)?;
            Value::Bool(values_equal(&a, &b))
        }
        "ne" => {
            let (a, b) = pair(name, values)?;
            Value::Bool(!values_equal(&a, &b))
        }
        "and" | "or" => {
            if values.is_empty() {
                return Err(arity(name, 1, 0));
            }
            let truth = if name == "and" {
                values.iter().all(is_truthy)
            } else {
                values.iter().any(is_truthy)
            };
            Value::Bool(truth)
        }
        other => return Err(RenderError::UnknownFunction { name: other.to_string() }),
    };
    Ok(result)
}

/// Numbers compare by value, so `1` equals `1.0`
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
