//! Chart strategy: helm upgrade --install / status / uninstall

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::deploy::backend::{is_not_found, object_names, summarize_pods, Backend, Tool};
use crate::deploy::strategy::{ensure_backend, DeployError, DeploymentStrategy, StatusReport};
use crate::render::{BackendHint, RenderedManifest};

/// Release status helm reports for a healthy install
const DEPLOYED: &str = "deployed";

/// Extra time given to helm beyond its own `--timeout`
const HELM_GRACE: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
struct ReleaseStatus {
    #[serde(default)]
    info: ReleaseInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    status: String,
}

/// Installs a packaged chart, using the subject as the release name and
/// the rendered values as the overlay
pub struct ChartStrategy {
    backend: Backend,
    chart: String,
    version: Option<String>,
    repo: Option<String>,
}

impl ChartStrategy {
    pub fn new(
        backend: Backend,
        chart: String,
        version: Option<String>,
        repo: Option<String>,
    ) -> Self {
        Self {
            backend,
            chart,
            version,
            repo,
        }
    }

    async fn release_status(&self, subject: &str, namespace: &str) -> Result<String, DeployError> {
        let status = self.backend.command(
            Tool::Helm,
            ["status", subject, "-n", namespace, "-o", "json"],
        );
        let command = status.fingerprint();
        let result = match self.backend.run(status).await {
            Err(DeployError::Backend(failed)) if is_not_found(&failed.stderr) => {
                return Ok("absent".to_string())
            }
            other => other?,
        };
        let release: ReleaseStatus =
            serde_json::from_str(&result.stdout).map_err(|e| DeployError::Output {
                command,
                reason: e.to_string(),
            })?;
        Ok(release.info.status)
    }
}

#[async_trait]
impl DeploymentStrategy for ChartStrategy {
    async fn deploy(&self, manifest: &RenderedManifest, namespace: &str) -> Result<(), DeployError> {
        ensure_backend(manifest, BackendHint::Chart)?;

        let deploy_timeout = self.backend.options().deploy_timeout;
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            manifest.subject().to_string(),
            self.chart.clone(),
            "-n".to_string(),
            namespace.to_string(),
            "--create-namespace".to_string(),
            "-f".to_string(),
            "-".to_string(),
        ];
        if let Some(version) = &self.version {
            args.extend(["--version".to_string(), version.clone()]);
        }
        if let Some(repo) = &self.repo {
            args.extend(["--repo".to_string(), repo.clone()]);
        }
        args.extend([
            "--wait".to_string(),
            "--timeout".to_string(),
            format!("{}s", deploy_timeout.as_secs()),
        ]);

        info!(
            "Installing chart {} as {} in {}",
            self.chart,
            manifest.subject(),
            namespace
        );
        let upgrade = self
            .backend
            .command(Tool::Helm, args)
            .stdin(manifest.rendered())
            .timeout(deploy_timeout + HELM_GRACE);
        self.backend.run(upgrade).await?;
        Ok(())
    }

    async fn check_status(&self, subject: &str, namespace: &str) -> Result<StatusReport, DeployError> {
        let raw_state = self.release_status(subject, namespace).await?;

        let selector = format!("app.kubernetes.io/instance={subject}");
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

        let live = raw_state == DEPLOYED && summary.ready == summary.total;
        Ok(StatusReport {
            ready_pods: summary.ready,
            total_pods: summary.total,
            services,
            raw_state,
            live,
        })
    }

    async fn delete(&self, subject: &str, namespace: &str) -> Result<(), DeployError> {
        info!("Uninstalling release {} in {}", subject, namespace);
        let uninstall = self
            .backend
            .command(Tool::Helm, ["uninstall", subject, "-n", namespace]);
        match self.backend.run(uninstall).await {
            Err(DeployError::Backend(failed)) if is_not_found(&failed.stderr) => {
                debug!("Release {} already absent", subject);
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    fn name(&self) -> &str {
        "chart"
    }
}
