//! Template cache unit tests

use std::sync::Arc;

use kindops::registry::{Template, TemplateCache, TemplateMetadata};
use serde_json::json;

fn create_test_template(id: &str, name: &str) -> Arc<Template> {
    let metadata: TemplateMetadata = serde_json::from_value(json!({ "name": name })).unwrap();
    Arc::new(Template::new(id, metadata, "apiVersion: v1\nkind: ConfigMap\n").unwrap())
}

#[test]
fn test_template_cache_insert_and_get() {
    let cache = TemplateCache::new(10);
    cache.insert(create_test_template("web", "Web"), "digest-1".to_string());

    let entry = cache.get("web");
    assert!(entry.is_some());
    assert_eq!(entry.unwrap().template.name, "Web");
}

#[test]
fn test_template_cache_digest_check() {
    let cache = TemplateCache::new(10);
    cache.insert(create_test_template("web", "Web"), "digest-1".to_string());

    assert!(cache.get_fresh("web", "digest-1").is_some());
    assert!(cache.get_fresh("web", "digest-2").is_none());
    assert!(cache.get_fresh("redis", "digest-1").is_none());
}

#[test]
fn test_template_cache_eviction() {
    let cache = TemplateCache::new(2);

    cache.insert(create_test_template("t1", "One"), "d1".to_string());
    cache.insert(create_test_template("t2", "Two"), "d2".to_string());
    cache.insert(create_test_template("t3", "Three"), "d3".to_string());

    // Cache should have evicted the oldest entry
    assert_eq!(cache.len(), 2);
    assert!(cache.get("t1").is_none());
    assert!(cache.get("t3").is_some());
}

#[test]
fn test_template_cache_replace_does_not_evict() {
    let cache = TemplateCache::new(2);

    cache.insert(create_test_template("t1", "One"), "d1".to_string());
    cache.insert(create_test_template("t2", "Two"), "d2".to_string());
    cache.insert(create_test_template("t1", "One again"), "d1b".to_string());

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("t1").unwrap().template.name, "One again");
    assert!(cache.get("t2").is_some());
}

#[test]
fn test_template_cache_remove() {
    let cache = TemplateCache::new(10);
    cache.insert(create_test_template("t1", "One"), "d1".to_string());
    cache.insert(create_test_template("t2", "Two"), "d2".to_string());

    assert_eq!(cache.remove("t1").unwrap().digest, "d1");
    assert!(cache.remove("t1").is_none());
    assert!(cache.get("t1").is_none());
    assert_eq!(cache.len(), 1);
}
