//! Template rendering
//!
//! Templates use a small Go-template dialect: `{{ .name }}` references,
//! `|` pipelines through built-in functions, `if`/`else if`/`else` and
//! `range` blocks, `{{-`/`-}}` whitespace trimming and `{{/* */}}`
//! comments. There is no template inclusion and no user-defined function.

mod eval;
mod functions;
mod lexer;
pub mod manifest;
mod parser;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::params::ValueSet;

pub use functions::{canonical, is_empty};
pub use manifest::{BackendHint, RenderTarget, RenderedManifest};

/// Template author defects found while parsing or rendering
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderError {
    #[error("undefined reference '{name}'")]
    UndefinedReference { name: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("{message}")]
    Required { message: String },

    #[error("function '{function}' failed: {reason}")]
    FunctionFailed { function: String, reason: String },

    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("'{name}' is not a list or map")]
    NotIterable { name: String },

    #[error("rendered document {document} is malformed: {reason}")]
    MalformedOutput { document: usize, reason: String },
}

/// A parsed template body, ready to render any number of times
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateBody {
    nodes: Vec<parser::Node>,
}

impl TemplateBody {
    /// Parse a body, rejecting syntax errors and unknown functions
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let nodes = parser::parse(lexer::segments(source)?)?;
        Ok(Self { nodes })
    }

    /// Substitute `values` into the body, producing text
    pub fn execute(&self, values: &ValueSet, target: &RenderTarget) -> Result<String, RenderError> {
        let vars = BTreeMap::from([
            ("namespace".to_string(), Value::String(target.namespace.clone())),
            ("subject".to_string(), Value::String(target.subject.clone())),
        ]);
        eval::execute(&self.nodes, values.to_value(), vars)
    }

    /// Substitute `values` and check the result is well-formed for the backend
    pub fn render(&self, values: &ValueSet, target: &RenderTarget) -> Result<RenderedManifest, RenderError> {
        let rendered = self.execute(values, target)?;
        let manifest = RenderedManifest::from_rendered(rendered, target)?;
        debug!(
            "Rendered {} document(s) for {} in {}",
            manifest.documents().len(),
            target.subject,
            target.namespace
        );
        Ok(manifest)
    }
}

/// Parse and render a template body in one step
pub fn render(
    body: &str,
    values: &ValueSet,
    target: &RenderTarget,
) -> Result<RenderedManifest, RenderError> {
    TemplateBody::parse(body)?.render(values, target)
}
