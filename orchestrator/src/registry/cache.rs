//! Template cache

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::registry::template::Template;

/// Template cache entry
#[derive(Debug, Clone)]
pub struct TemplateCacheEntry {
    pub template: Arc<Template>,
    pub digest: String,
    sequence: u64,
}

/// In-memory template cache, keyed by template id and checked by digest
pub struct TemplateCache {
    entries: RwLock<HashMap<String, TemplateCacheEntry>>,
    capacity: usize,
    sequence: AtomicU64,
}

impl TemplateCache {
    /// Create a new template cache
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            sequence: AtomicU64::new(0),
        }
    }

    /// Get a template from cache
    pub fn get(&self, id: &str) -> Option<TemplateCacheEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(id).cloned()
    }

    /// Get a template when its cached digest still matches
    pub fn get_fresh(&self, id: &str, digest: &str) -> Option<Arc<Template>> {
        self.get(id)
            .filter(|entry| entry.digest == digest)
            .map(|entry| entry.template)
    }

    /// Insert a template into cache, evicting the oldest entry when full
    pub fn insert(&self, template: Arc<Template>, digest: String) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if entries.len() >= self.capacity && !entries.contains_key(&template.id) {
            if let Some(oldest_id) = entries
                .iter()
                .min_by_key(|(_, e)| e.sequence)
                .map(|(id, _)| id.clone())
            {
                entries.remove(&oldest_id);
            }
        }

        let entry = TemplateCacheEntry {
            template: template.clone(),
            digest,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        entries.insert(template.id.clone(), entry);
    }

    /// Remove a template from cache
    pub fn remove(&self, id: &str) -> Option<TemplateCacheEntry> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(id)
    }

    /// Get cache size
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
