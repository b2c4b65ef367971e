//! Template registry tests

use std::fs;
use std::sync::Arc;

use kindops::deploy::StrategyKind;
use kindops::registry::{
    DirTemplateRegistry, MemoryTemplateRegistry, RegistryError, Template, TemplateMetadata,
    TemplateRegistry,
};
use serde_json::json;

fn metadata(value: serde_json::Value) -> TemplateMetadata {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_memory_registry() {
    let template = Template::new(
        "web",
        metadata(json!({"description": "Static site"})),
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ $subject }}\n",
    )
    .unwrap();
    assert_eq!(template.name, "web");
    assert_eq!(template.strategy, StrategyKind::RawManifest);

    let registry = MemoryTemplateRegistry::new().with_template(template);
    let loaded = registry.load_template("web").await.unwrap();
    assert_eq!(loaded.description.as_deref(), Some("Static site"));
    assert_eq!(registry.template_ids().await.unwrap(), vec!["web".to_string()]);
    assert!(matches!(
        registry.load_template("db").await,
        Err(RegistryError::NotFound(id)) if id == "db"
    ));
}

#[test]
fn test_template_rejects_bad_definitions() {
    let bad_schema = Template::new(
        "web",
        metadata(json!({"parameters": [
            {"name": "replicas", "type": "number", "max": 3, "default": 5}
        ]})),
        "",
    );
    assert!(matches!(bad_schema, Err(RegistryError::Schema { .. })));

    let bad_body = Template::new("web", metadata(json!({})), "{{ .image | nope }}");
    assert!(matches!(bad_body, Err(RegistryError::Body { .. })));
}

#[tokio::test]
async fn test_dir_registry_chart_template() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("redis");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("metadata.json"),
        r#"{
            "name": "Redis",
            "strategy": {"type": "chart", "chart": "bitnami/redis", "version": "19.0.1"},
            "parameters": [{"name": "replicas", "type": "number", "default": 1}]
        }"#,
    )
    .unwrap();
    fs::write(dir.join("values.yaml"), "replica:\n  replicaCount: {{ .replicas }}\n").unwrap();

    // Directories without metadata are not templates
    fs::create_dir_all(root.path().join("scratch")).unwrap();

    let registry = DirTemplateRegistry::new(root.path());
    assert_eq!(registry.template_ids().await.unwrap(), vec!["redis".to_string()]);

    let template = registry.load_template("redis").await.unwrap();
    assert_eq!(template.name, "Redis");
    assert_eq!(
        template.strategy,
        StrategyKind::Chart {
            chart: "bitnami/redis".into(),
            version: Some("19.0.1".into()),
            repo: None,
        }
    );
    assert_eq!(template.source(), "replica:\n  replicaCount: {{ .replicas }}\n");
    assert_eq!(template.schema.len(), 1);

    let cached = registry.load_template("redis").await.unwrap();
    assert!(Arc::ptr_eq(&template, &cached));

    // Metadata changes invalidate the cached entry too
    fs::write(
        dir.join("metadata.json"),
        r#"{"name": "Redis HA", "strategy": {"type": "chart", "chart": "bitnami/redis"}}"#,
    )
    .unwrap();
    let reloaded = registry.load_template("redis").await.unwrap();
    assert_eq!(reloaded.name, "Redis HA");
}

#[tokio::test]
async fn test_dir_registry_chart_without_values() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("nginx");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("metadata.json"),
        r#"{"strategy": {"type": "chart", "chart": "ingress-nginx", "repo": "https://kubernetes.github.io/ingress-nginx"}}"#,
    )
    .unwrap();

    let registry = DirTemplateRegistry::new(root.path());
    let template = registry.load_template("nginx").await.unwrap();
    assert_eq!(template.name, "nginx");
    assert_eq!(template.source(), "");
}

#[tokio::test]
async fn test_dir_registry_bad_metadata() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("broken");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("metadata.json"), "{ not json").unwrap();

    let registry = DirTemplateRegistry::new(root.path());
    assert!(matches!(
        registry.load_template("broken").await,
        Err(RegistryError::FileSys(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_dir_registry_follows_mounted_symlinks() {
    use std::os::unix::fs::symlink;

    // ConfigMap volumes expose every key as a link into a hidden data dir
    let mount = tempfile::tempdir().unwrap();
    let data = mount.path().join("..data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("metadata.json"), r#"{"name": "Web"}"#).unwrap();
    fs::write(
        data.join("deploy.yaml"),
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n",
    )
    .unwrap();

    let template_dir = mount.path().join("store/web");
    fs::create_dir_all(template_dir.join("kubernetes")).unwrap();
    symlink(data.join("metadata.json"), template_dir.join("metadata.json")).unwrap();
    symlink(data.join("deploy.yaml"), template_dir.join("kubernetes/deploy.yaml")).unwrap();

    let root = tempfile::tempdir().unwrap();
    symlink(&template_dir, root.path().join("web")).unwrap();

    let registry = DirTemplateRegistry::new(root.path());
    assert_eq!(registry.template_ids().await.unwrap(), vec!["web".to_string()]);
    let template = registry.load_template("web").await.unwrap();
    assert!(template.source().contains("kind: Deployment"));
}
