//! Raw manifest strategy: kubectl apply/get/delete

use async_trait::async_trait;
use tracing::{debug, info};

use crate::deploy::backend::{is_not_found, object_names, summarize_pods, Backend, Tool};
use crate::deploy::strategy::{ensure_backend, DeployError, DeploymentStrategy, StatusReport};
use crate::render::{BackendHint, RenderedManifest};

/// Resource kinds removed on delete
const DELETE_KINDS: &str = "all,configmap,secret,ingress";

/// Applies rendered documents with `kubectl apply`. Resources are expected
/// to carry the `app=<subject>` label, which status and delete select on.
pub struct RawManifestStrategy {
    backend: Backend,
}

impl RawManifestStrategy {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<(), DeployError> {
        let lookup = self
            .backend
            .command(Tool::Kubectl, ["get", "namespace", namespace]);
        if self.backend.run_unchecked(lookup).await?.success() {
            return Ok(());
        }

        info!("Creating namespace {}", namespace);
        let create = self
            .backend
            .command(Tool::Kubectl, ["create", "namespace", namespace]);
        match self.backend.run(create).await {
            Err(DeployError::Backend(failed)) if failed.stderr.contains("AlreadyExists") => {
                debug!("Namespace {} already exists", namespace);
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }
}

#[async_trait]
impl DeploymentStrategy for RawManifestStrategy {
    async fn deploy(&self, manifest: &RenderedManifest, namespace: &str) -> Result<(), DeployError> {
        ensure_backend(manifest, BackendHint::RawManifest)?;
        self.ensure_namespace(namespace).await?;

        info!(
            "Applying {} document(s) for {} in {}",
            manifest.documents().len(),
            manifest.subject(),
            namespace
        );
        let apply = self
            .backend
            .command(Tool::Kubectl, ["apply", "-n", namespace, "-f", "-"])
            .stdin(manifest.rendered())
            .timeout(self.backend.options().deploy_timeout);
        self.backend.run(apply).await?;
        Ok(())
    }

    async fn check_status(&self, subject: &str, namespace: &str) -> Result<StatusReport, DeployError> {
        let selector = format!("app={subject}");

        let pods = self.backend.command(
            Tool::Kubectl,
            ["get", "pods", "-n", namespace, "-l", selector.as_str(), "-o", "json"],
        );
        let command = pods.fingerprint();
        let summary = summarize_pods(&command, &self.backend.run(pods).await?.stdout)?;

        let services = self.backend.command(
            Tool::Kubectl,
            ["get", "services", "-n", namespace, "-l", selector.as_str(), "-o", "json"],
        );
        let command = services.fingerprint();
        let services = object_names(&command, &self.backend.run(services).await?.stdout)?;

        let raw_state = if summary.total == 0 {
            "absent".to_string()
        } else {
            summary.phases.join(",")
        };

        Ok(StatusReport {
            ready_pods: summary.ready,
            total_pods: summary.total,
            services,
            raw_state,
            live: summary.total > 0 && summary.ready == summary.total,
        })
    }

    async fn delete(&self, subject: &str, namespace: &str) -> Result<(), DeployError> {
        info!("Deleting resources of {} in {}", subject, namespace);
        let selector = format!("app={subject}");
        let delete = self.backend.command(
            Tool::Kubectl,
            [
                "delete",
                DELETE_KINDS,
                "-n",
                namespace,
                "-l",
                selector.as_str(),
                "--ignore-not-found",
            ],
        );
        match self.backend.run(delete).await {
            Err(DeployError::Backend(failed)) if is_not_found(&failed.stderr) => {
                debug!("Nothing to delete for {} in {}", subject, namespace);
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    fn name(&self) -> &str {
        "raw_manifest"
    }
}
