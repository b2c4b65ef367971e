//! Template registry

pub mod cache;
pub mod dir;
pub mod memory;
pub mod template;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::filesys::FileSysError;
use crate::params::SchemaError;
use crate::render::RenderError;

pub use cache::TemplateCache;
pub use dir::DirTemplateRegistry;
pub use memory::MemoryTemplateRegistry;
pub use template::{Template, TemplateMetadata};

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("invalid template id '{0}'")]
    InvalidId(String),

    #[error("template '{id}' has an invalid parameter schema: {source}")]
    Schema {
        id: String,
        #[source]
        source: SchemaError,
    },

    #[error("template '{id}' has an invalid body: {source}")]
    Body {
        id: String,
        #[source]
        source: RenderError,
    },

    #[error(transparent)]
    FileSys(#[from] FileSysError),
}

/// Read-only source of templates
#[async_trait]
pub trait TemplateRegistry: Send + Sync {
    /// Load a template by id
    async fn load_template(&self, id: &str) -> Result<Arc<Template>, RegistryError>;

    /// Ids of every template the registry can load, sorted
    async fn template_ids(&self) -> Result<Vec<String>, RegistryError>;
}

/// Template ids are single path components of `[A-Za-z0-9_.-]`
pub(crate) fn check_id(id: &str) -> Result<(), RegistryError> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidId(id.to_string()))
    }
}
