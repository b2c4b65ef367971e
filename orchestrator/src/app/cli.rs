//! Command line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use crate::errors::OrchestratorError;
use crate::filesys::File;
use crate::logs::LogLevel;
use crate::params::{ParamKind, ParameterSchema, RawValues};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Render templates and deploy them to local Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "kindops", version = VERSION)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file; defaults to settings.json under KINDOPS_HOME
    #[arg(long, global = true, env = "KINDOPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Template registry directory
    #[arg(long, global = true)]
    pub templates: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check parameter values against a template's schema
    Validate {
        template: String,

        #[command(flatten)]
        values: ValueArgs,
    },

    /// Print the rendered manifest without deploying
    Render {
        template: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Subject name; the template id when omitted
        #[arg(long)]
        subject: Option<String>,

        #[command(flatten)]
        values: ValueArgs,
    },

    /// Deploy a template and follow the task until it finishes
    Deploy {
        template: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Subject name; the template id when omitted
        #[arg(long)]
        subject: Option<String>,

        #[command(flatten)]
        values: ValueArgs,
    },

    /// Show readiness of a deployed subject
    Status {
        template: String,
        subject: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Remove a deployed subject
    Delete {
        template: String,
        subject: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// List available templates
    Templates,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Cluster name, turned into a kube context with the configured prefix
    #[arg(long)]
    pub cluster: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ValueArgs {
    /// Parameter value as key=value; repeatable
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_set)]
    pub set: Vec<(String, String)>,

    /// YAML or JSON file with parameter values
    #[arg(long = "values", value_name = "FILE")]
    pub values_file: Option<PathBuf>,
}

impl ValueArgs {
    /// Values from the file, overridden by `--set` pairs.
    ///
    /// A `--set` value is kept verbatim when the schema declares the
    /// parameter a string, so `version=1.10` does not turn into `1.1`.
    pub async fn raw_values(&self, schema: &ParameterSchema) -> Result<RawValues, OrchestratorError> {
        let mut values = match &self.values_file {
            Some(path) => File::new(path).read_yaml::<RawValues>().await?,
            None => RawValues::new(),
        };
        for (key, raw) in &self.set {
            let value = match schema.get(key).map(|def| &def.kind) {
                Some(ParamKind::String { .. }) => Value::String(raw.clone()),
                Some(ParamKind::Enum { options }) if options.iter().any(|o| o.as_str() == Some(raw)) => {
                    Value::String(raw.clone())
                }
                _ => scalar(raw),
            };
            values.insert(key.clone(), value);
        }
        Ok(values)
    }
}

/// Split `key=value`; the value stays raw text until the schema is known
pub fn parse_set(arg: &str) -> Result<(String, String), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{arg}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{arg}'"));
    }
    Ok((key.to_string(), raw.to_string()))
}

/// Read text as a YAML scalar so numbers and booleans keep their type.
/// Anything else stays a string.
pub fn scalar(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}
