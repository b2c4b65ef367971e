//! Directory-backed template registry
//!
//! Layout, one directory per template:
//!
//! ```text
//! <root>/<id>/metadata.json
//! <root>/<id>/kubernetes/*.yaml   raw-manifest body, files joined in name order
//! <root>/<id>/values.yaml         chart values overlay
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::deploy::StrategyKind;
use crate::filesys::{Dir, File, FileSysError};
use crate::registry::cache::TemplateCache;
use crate::registry::template::{Template, TemplateMetadata};
use crate::registry::{check_id, RegistryError, TemplateRegistry};
use crate::utils::sha256_hash;

const METADATA_FILE: &str = "metadata.json";
const MANIFESTS_DIR: &str = "kubernetes";
const VALUES_FILE: &str = "values.yaml";
const DEFAULT_CACHE_CAPACITY: usize = 64;

pub struct DirTemplateRegistry {
    root: Dir,
    cache: TemplateCache,
}

impl DirTemplateRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_capacity(root, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(root: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            root: Dir::new(root),
            cache: TemplateCache::new(capacity),
        }
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    async fn read_body(&self, dir: &Dir, strategy: &StrategyKind) -> Result<String, RegistryError> {
        match strategy {
            StrategyKind::Chart { .. } => {
                let values = dir.file(VALUES_FILE);
                if values.exists().await {
                    Ok(values.read_string().await?)
                } else {
                    Ok(String::new())
                }
            }
            StrategyKind::RawManifest => {
                let manifests = dir.subdir(MANIFESTS_DIR);
                let mut documents = Vec::new();
                for path in manifests.list_files().await? {
                    let is_yaml = matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml")
                    );
                    if !is_yaml {
                        continue;
                    }
                    let mut text = File::new(path).read_string().await?;
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                    documents.push(text);
                }
                Ok(documents.join("---\n"))
            }
        }
    }
}

#[async_trait]
impl TemplateRegistry for DirTemplateRegistry {
    async fn load_template(&self, id: &str) -> Result<Arc<Template>, RegistryError> {
        check_id(id)?;

        let dir = self.root.subdir(id);
        let metadata_file = dir.file(METADATA_FILE);
        if !metadata_file.exists().await {
            if self.cache.remove(id).is_some() {
                debug!(template = id, "template removed, dropped from cache");
            }
            return Err(RegistryError::NotFound(id.to_string()));
        }

        let metadata_text = metadata_file.read_string().await?;
        let metadata: TemplateMetadata =
            serde_json::from_str(&metadata_text).map_err(|source| FileSysError::Json {
                path: metadata_file.path().to_path_buf(),
                source,
            })?;
        let source = self.read_body(&dir, &metadata.strategy).await?;

        let digest = sha256_hash(format!("{metadata_text}\n{source}").as_bytes());
        if let Some(template) = self.cache.get_fresh(id, &digest) {
            debug!(template = id, "template cache hit");
            return Ok(template);
        }

        let template = Arc::new(Template::new(id, metadata, source)?);
        self.cache.insert(template.clone(), digest);
        debug!(template = id, digest = template.digest(), "loaded template");
        Ok(template)
    }

    async fn template_ids(&self) -> Result<Vec<String>, RegistryError> {
        if !self.root.exists().await {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for path in self.root.list_dirs().await? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if check_id(name).is_ok() && self.root.subdir(name).file(METADATA_FILE).exists().await {
                ids.push(name.to_string());
            }
        }
        Ok(ids)
    }
}
