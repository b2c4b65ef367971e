//! Rendered output and its structural checks

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::render::RenderError;
use crate::utils::sha256_hash;

/// Which kind of backend the rendered output is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendHint {
    /// One or more resource documents applied as-is
    RawManifest,
    /// A single values document overlaid on a packaged chart
    Chart,
}

/// Where a render is headed. `namespace` and `subject` are visible to the
/// template as `$namespace` and `$subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub backend: BackendHint,
    pub namespace: String,
    pub subject: String,
}

impl RenderTarget {
    pub fn new(
        backend: BackendHint,
        namespace: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            subject: subject.into(),
        }
    }
}

/// Backend-ready output of one render.
///
/// Built only by the renderer; there are no mutating methods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedManifest {
    documents: Vec<YamlValue>,
    rendered: String,
    backend: BackendHint,
    namespace: String,
    subject: String,
}

impl RenderedManifest {
    pub(crate) fn from_rendered(rendered: String, target: &RenderTarget) -> Result<Self, RenderError> {
        let mut documents = parse_documents(&rendered)?;

        match target.backend {
            BackendHint::RawManifest => {
                if documents.is_empty() {
                    return Err(malformed(1, "no manifest documents"));
                }
                for (index, doc) in documents.iter().enumerate() {
                    check_resource(index + 1, doc)?;
                }
            }
            BackendHint::Chart => {
                if documents.len() > 1 {
                    return Err(malformed(2, "chart values must be a single document"));
                }
                if documents.is_empty() {
                    documents.push(YamlValue::Mapping(Mapping::new()));
                }
                if !documents[0].is_mapping() {
                    return Err(malformed(1, "chart values must be a mapping"));
                }
            }
        }

        Ok(Self {
            documents,
            rendered,
            backend: target.backend,
            namespace: target.namespace.clone(),
            subject: target.subject.clone(),
        })
    }

    pub fn documents(&self) -> &[YamlValue] {
        &self.documents
    }

    /// The rendered text, streamed to the backend tool on stdin
    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    pub fn backend(&self) -> BackendHint {
        self.backend
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn digest(&self) -> String {
        sha256_hash(self.rendered.as_bytes())
    }

    /// `Kind/name` of every resource document
    pub fn resources(&self) -> Vec<String> {
        self.documents
            .iter()
            .filter_map(|doc| {
                let kind = doc.get("kind")?.as_str()?;
                let name = doc
                    .get("metadata")
                    .and_then(|m| m.get("name"))
                    .and_then(YamlValue::as_str)
                    .unwrap_or("<unnamed>");
                Some(format!("{kind}/{name}"))
            })
            .collect()
    }
}

fn parse_documents(rendered: &str) -> Result<Vec<YamlValue>, RenderError> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(rendered).enumerate() {
        let value = YamlValue::deserialize(document)
            .map_err(|e| malformed(index + 1, e.to_string()))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

fn check_resource(document: usize, doc: &YamlValue) -> Result<(), RenderError> {
    if !doc.is_mapping() {
        return Err(malformed(document, "document is not a mapping"));
    }
    for field in ["apiVersion", "kind"] {
        let present = doc
            .get(field)
            .and_then(YamlValue::as_str)
            .is_some_and(|s| !s.is_empty());
        if !present {
            return Err(malformed(document, format!("missing {field}")));
        }
    }
    Ok(())
}

fn malformed(document: usize, reason: impl Into<String>) -> RenderError {
    RenderError::MalformedOutput {
        document,
        reason: reason.into(),
    }
}
