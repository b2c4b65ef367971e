//! In-memory template registry

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::registry::template::Template;
use crate::registry::{RegistryError, TemplateRegistry};

/// Registry backed by a map of already-built templates
#[derive(Default)]
pub struct MemoryTemplateRegistry {
    templates: RwLock<BTreeMap<String, Arc<Template>>>,
}

impl MemoryTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template
    pub fn insert(&self, template: Template) {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
        templates.insert(template.id.clone(), Arc::new(template));
    }

    pub fn with_template(self, template: Template) -> Self {
        self.insert(template);
        self
    }
}

#[async_trait]
impl TemplateRegistry for MemoryTemplateRegistry {
    async fn load_template(&self, id: &str) -> Result<Arc<Template>, RegistryError> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        templates
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn template_ids(&self) -> Result<Vec<String>, RegistryError> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        Ok(templates.keys().cloned().collect())
    }
}
