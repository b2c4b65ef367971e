//! Template definitions

use serde::{Deserialize, Serialize};

use crate::deploy::StrategyKind;
use crate::params::ParameterSchema;
use crate::registry::RegistryError;
use crate::render::TemplateBody;
use crate::utils::sha256_hash;

/// Contents of a template's `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: ParameterSchema,

    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
}

fn default_strategy() -> StrategyKind {
    StrategyKind::RawManifest
}

/// A checked, parsed template. Immutable once built.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub schema: ParameterSchema,
    pub strategy: StrategyKind,
    body: TemplateBody,
    source: String,
    digest: String,
}

impl Template {
    /// Build a template, checking the schema and parsing the body
    pub fn new(
        id: impl Into<String>,
        metadata: TemplateMetadata,
        source: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let id = id.into();
        let source = source.into();

        metadata
            .parameters
            .check()
            .map_err(|source| RegistryError::Schema {
                id: id.clone(),
                source,
            })?;
        let body = TemplateBody::parse(&source).map_err(|source| RegistryError::Body {
            id: id.clone(),
            source,
        })?;

        Ok(Self {
            name: metadata.name.unwrap_or_else(|| id.clone()),
            description: metadata.description,
            schema: metadata.parameters,
            strategy: metadata.strategy,
            digest: sha256_hash(source.as_bytes()),
            id,
            body,
            source,
        })
    }

    pub fn body(&self) -> &TemplateBody {
        &self.body
    }

    /// The body as written
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}
