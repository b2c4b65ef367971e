//! Deployment strategy tests against the fake executor

use std::sync::Arc;
use std::time::Duration;

use kindops::command::{CommandResult, FakeExecutor};
use kindops::deploy::{
    Backend, BackendOptions, DeployError, StrategyFactory, StrategyKind,
};
use kindops::params::{validate, ParameterSchema, RawValues};
use kindops::render::{render, BackendHint, RenderTarget, RenderedManifest};
use tokio_test::{assert_err, assert_ok};

const CONFIG_MAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ $subject }}\n  labels:\n    app: {{ $subject }}\n";

const READY_PODS: &str = r#"{"items": [
    {"metadata": {"name": "web-1"}, "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}},
    {"metadata": {"name": "web-2"}, "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}}
]}"#;

const STARTING_PODS: &str = r#"{"items": [
    {"metadata": {"name": "web-1"}, "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}},
    {"metadata": {"name": "web-2"}, "status": {"phase": "Pending"}}
]}"#;

const SERVICES: &str = r#"{"items": [{"metadata": {"name": "web"}}]}"#;

fn manifest(body: &str, backend: BackendHint) -> RenderedManifest {
    let values = validate(&ParameterSchema::default(), &RawValues::new()).unwrap();
    render(body, &values, &RenderTarget::new(backend, "shop", "web")).unwrap()
}

fn backend(fake: &Arc<FakeExecutor>, context: Option<&str>) -> Backend {
    Backend::new(
        fake.clone(),
        BackendOptions {
            context: context.map(str::to_string),
            deploy_timeout: Duration::from_secs(120),
            ..Default::default()
        },
    )
}

fn chart_kind() -> StrategyKind {
    StrategyKind::Chart {
        chart: "bitnami/nginx".into(),
        version: Some("15.0.0".into()),
        repo: None,
    }
}

#[tokio::test]
async fn test_raw_deploy_creates_namespace_and_applies() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("kubectl get namespace", CommandResult::failed(1, "namespaces \"shop\" not found"))
        .on("kubectl create namespace", CommandResult::ok("namespace/shop created"))
        .on("kubectl apply", CommandResult::ok("configmap/web created"));

    let strategy = StrategyFactory::create(&StrategyKind::RawManifest, backend(&fake, None));
    let manifest = manifest(CONFIG_MAP, BackendHint::RawManifest);
    strategy.deploy(&manifest, "shop").await.unwrap();

    assert_eq!(
        fake.calls(),
        vec![
            "kubectl get namespace shop",
            "kubectl create namespace shop",
            "kubectl apply -n shop -f -",
        ]
    );
    let apply = fake.history().pop().unwrap();
    assert_eq!(apply.stdin.as_deref(), Some(manifest.rendered()));
    assert_eq!(apply.timeout, Some(Duration::from_secs(120)));
    assert_eq!(strategy.name(), "raw_manifest");
}

#[tokio::test]
async fn test_raw_redeploy_is_idempotent() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("kubectl get namespace", CommandResult::ok("shop Active"))
        .on("kubectl apply", CommandResult::ok("configmap/web unchanged"));

    let strategy = StrategyFactory::create(&StrategyKind::RawManifest, backend(&fake, None));
    let manifest = manifest(CONFIG_MAP, BackendHint::RawManifest);
    assert_ok!(strategy.deploy(&manifest, "shop").await);
    assert_ok!(strategy.deploy(&manifest, "shop").await);

    assert_eq!(fake.count("kubectl create namespace"), 0);
    assert_eq!(fake.count("kubectl apply"), 2);
}

#[tokio::test]
async fn test_raw_apply_failure_is_definitive() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("kubectl get namespace", CommandResult::ok(""))
        .on("kubectl apply", CommandResult::failed(1, "error: unable to recognize \"STDIN\""));

    let strategy = StrategyFactory::create(&StrategyKind::RawManifest, backend(&fake, None));
    let err = assert_err!(
        strategy
            .deploy(&manifest(CONFIG_MAP, BackendHint::RawManifest), "shop")
            .await
    );

    assert!(!err.is_ambiguous());
    let failed = err.failed_command().unwrap();
    assert_eq!(failed.exit_code, 1);
    assert_eq!(failed.argv[0], "kubectl");
}

#[tokio::test]
async fn test_raw_status() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on_sequence(
        "kubectl get pods",
        [CommandResult::ok(STARTING_PODS), CommandResult::ok(READY_PODS)],
    )
    .on("kubectl get services", CommandResult::ok(SERVICES));

    let strategy = StrategyFactory::create(&StrategyKind::RawManifest, backend(&fake, None));

    let report = strategy.check_status("web", "shop").await.unwrap();
    assert!(!report.live);
    assert_eq!((report.ready_pods, report.total_pods), (1, 2));
    assert_eq!(report.raw_state, "Running,Pending");

    let report = strategy.check_status("web", "shop").await.unwrap();
    assert!(report.live);
    assert_eq!(report.services, vec!["web".to_string()]);
    assert_eq!(
        fake.calls()[0],
        "kubectl get pods -n shop -l app=web -o json"
    );
}

#[tokio::test]
async fn test_raw_status_of_absent_subject() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("kubectl get pods", CommandResult::ok(r#"{"items": []}"#))
        .on("kubectl get services", CommandResult::ok(r#"{"items": []}"#));

    let strategy = StrategyFactory::create(&StrategyKind::RawManifest, backend(&fake, None));
    let report = strategy.check_status("ghost", "shop").await.unwrap();
    assert!(!report.live);
    assert_eq!(report.raw_state, "absent");
    assert_eq!(report.total_pods, 0);
}

#[tokio::test]
async fn test_raw_delete_of_absent_subject() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("kubectl delete", CommandResult::ok("No resources found"));

    let strategy = StrategyFactory::create(&StrategyKind::RawManifest, backend(&fake, None));
    assert_ok!(strategy.delete("ghost", "shop").await);
    assert_eq!(
        fake.calls(),
        vec!["kubectl delete all,configmap,secret,ingress -n shop -l app=ghost --ignore-not-found"]
    );
}

#[tokio::test]
async fn test_chart_deploy_argv() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("helm upgrade", CommandResult::ok("Release \"web\" has been upgraded"));

    let strategy = StrategyFactory::create(&chart_kind(), backend(&fake, Some("kind-dev")));
    let manifest = manifest("replicaCount: 2\n", BackendHint::Chart);
    strategy.deploy(&manifest, "shop").await.unwrap();

    let call = fake.history().pop().unwrap();
    assert_eq!(
        call.fingerprint(),
        "helm upgrade --install web bitnami/nginx -n shop --create-namespace -f - \
         --version 15.0.0 --wait --timeout 120s --kube-context kind-dev"
    );
    assert_eq!(call.stdin.as_deref(), Some("replicaCount: 2\n"));
    assert_eq!(strategy.name(), "chart");
}

#[tokio::test]
async fn test_chart_timeout_is_ambiguous() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on(
        "helm upgrade",
        CommandResult::failed(1, "Error: UPGRADE FAILED: timed out waiting for the condition"),
    );

    let strategy = StrategyFactory::create(&chart_kind(), backend(&fake, None));
    let err = strategy
        .deploy(&manifest("", BackendHint::Chart), "shop")
        .await
        .unwrap_err();
    assert!(err.is_ambiguous());
    assert!(matches!(err, DeployError::Timeout { .. }));

    let fake = Arc::new(FakeExecutor::new());
    fake.on("helm upgrade", CommandResult::timeout(Duration::from_secs(150)));
    let strategy = StrategyFactory::create(&chart_kind(), backend(&fake, None));
    let err = strategy
        .deploy(&manifest("", BackendHint::Chart), "shop")
        .await
        .unwrap_err();
    assert!(err.is_ambiguous());
}

#[tokio::test]
async fn test_chart_status() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("helm status", CommandResult::ok(r#"{"name": "web", "info": {"status": "deployed"}}"#))
        .on("kubectl get pods", CommandResult::ok(READY_PODS))
        .on("kubectl get services", CommandResult::ok(SERVICES));

    let strategy = StrategyFactory::create(&chart_kind(), backend(&fake, Some("kind-dev")));
    let report = strategy.check_status("web", "shop").await.unwrap();
    assert!(report.live);
    assert_eq!(report.raw_state, "deployed");
    assert_eq!(
        fake.calls(),
        vec![
            "helm status web -n shop -o json --kube-context kind-dev",
            "kubectl get pods -n shop -l app.kubernetes.io/instance=web -o json --context kind-dev",
            "kubectl get services -n shop -l app.kubernetes.io/instance=web -o json --context kind-dev",
        ]
    );
}

#[tokio::test]
async fn test_chart_status_pending_release() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("helm status", CommandResult::ok(r#"{"info": {"status": "pending-install"}}"#))
        .on("kubectl get pods", CommandResult::ok(READY_PODS))
        .on("kubectl get services", CommandResult::ok(SERVICES));

    let strategy = StrategyFactory::create(&chart_kind(), backend(&fake, None));
    let report = strategy.check_status("web", "shop").await.unwrap();
    assert!(!report.live);
    assert_eq!(report.raw_state, "pending-install");
}

#[tokio::test]
async fn test_chart_missing_release() {
    let fake = Arc::new(FakeExecutor::new());
    fake.on("helm status", CommandResult::failed(1, "Error: release: not found"))
        .on("helm uninstall", CommandResult::failed(1, "Error: uninstall: Release not loaded: web: release: not found"))
        .on("kubectl get pods", CommandResult::ok(r#"{"items": []}"#))
        .on("kubectl get services", CommandResult::ok(r#"{"items": []}"#));

    let strategy = StrategyFactory::create(&chart_kind(), backend(&fake, None));
    let report = strategy.check_status("web", "shop").await.unwrap();
    assert_eq!(report.raw_state, "absent");
    assert!(!report.live);

    assert_ok!(strategy.delete("web", "shop").await);
}

#[tokio::test]
async fn test_strategy_rejects_other_backend_output() {
    let fake = Arc::new(FakeExecutor::new());
    let strategy = StrategyFactory::create(&chart_kind(), backend(&fake, None));
    let err = strategy
        .deploy(&manifest(CONFIG_MAP, BackendHint::RawManifest), "shop")
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::BackendMismatch { .. }));
    assert!(fake.calls().is_empty());
}
