//! Parameter validator tests

use kindops::params::{validate, ParameterSchema, RawValues, Rule, SchemaError, ValidationError};
use serde_json::{json, Value};

fn schema() -> ParameterSchema {
    serde_json::from_value(json!([
        {"name": "image", "type": "string", "pattern": "^[a-z0-9./:-]+$", "default": "nginx:latest"},
        {"name": "replicas", "type": "number", "min": 1, "max": 10, "integer": true, "default": 1},
        {"name": "size", "type": "enum", "options": ["small", "large"], "default": "small"},
        {"name": "ports", "type": "array", "min_items": 1, "max_items": 3, "default": [80]},
        {"name": "labels", "type": "object"},
        {"name": "enableMonitoring", "type": "boolean", "default": false},
        {"name": "scrapeInterval", "type": "string", "required": true,
         "depends_on": [{"on": "enableMonitoring", "effect": "show"}]},
        {"name": "storageClass", "type": "string",
         "depends_on": [{"on": "size", "equals": "large", "effect": "require"}]},
        {"name": "adminPassword", "type": "string", "required": true, "min_length": 8}
    ]))
    .unwrap()
}

fn raw(value: Value) -> RawValues {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_valid_values_are_defaulted() {
    let values = validate(&schema(), &raw(json!({"adminPassword": "s3cretpass"}))).unwrap();

    assert_eq!(values.get("image"), Some(&json!("nginx:latest")));
    assert_eq!(values.get("replicas"), Some(&json!(1)));
    assert_eq!(values.get("ports"), Some(&json!([80])));
    assert!(!values.contains("labels"));
    assert!(!values.contains("scrapeInterval"));
}

#[test]
fn test_every_violation_is_reported() {
    let errors = validate(
        &schema(),
        &raw(json!({
            "image": "Not An Image",
            "replicas": 2.5,
            "size": "medium",
            "ports": [],
            "labels": "team=a",
            "enableMonitoring": true,
            "typo": 1
        })),
    )
    .unwrap_err();

    assert_eq!(
        errors.0,
        vec![
            ValidationError::MissingRequired {
                name: "adminPassword".into()
            },
            ValidationError::ConstraintViolation {
                name: "image".into(),
                rule: Rule::Pattern("^[a-z0-9./:-]+$".into())
            },
            ValidationError::ConstraintViolation {
                name: "replicas".into(),
                rule: Rule::Integer
            },
            ValidationError::ConstraintViolation {
                name: "size".into(),
                rule: Rule::OneOf(vec![json!("small"), json!("large")])
            },
            ValidationError::ConstraintViolation {
                name: "ports".into(),
                rule: Rule::MinItems(1)
            },
            ValidationError::TypeMismatch {
                name: "labels".into(),
                expected: "object".into(),
                actual: "string".into()
            },
            ValidationError::DependencyUnsatisfied {
                name: "scrapeInterval".into(),
                depends_on: "enableMonitoring".into()
            },
            ValidationError::UnknownParameter { name: "typo".into() },
        ]
    );
    assert_eq!(errors.len(), 8);
}

#[test]
fn test_require_rule() {
    let values = raw(json!({"adminPassword": "s3cretpass", "size": "large"}));
    let errors = validate(&schema(), &values).unwrap_err();
    assert_eq!(
        errors.0,
        vec![ValidationError::DependencyUnsatisfied {
            name: "storageClass".into(),
            depends_on: "size".into()
        }]
    );

    let mut values = values;
    values.insert("storageClass".into(), json!("standard"));
    assert!(validate(&schema(), &values).is_ok());
}

#[test]
fn test_short_password_and_type_mismatch() {
    let errors = validate(
        &schema(),
        &raw(json!({"adminPassword": "short", "replicas": "three"})),
    )
    .unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors.0[0].parameter(), "replicas");
    assert_eq!(
        errors.0[0].to_string(),
        "parameter 'replicas' expected number, got string"
    );
    assert_eq!(
        errors.0[1],
        ValidationError::ConstraintViolation {
            name: "adminPassword".into(),
            rule: Rule::MinLength(8)
        }
    );
}

#[test]
fn test_errors_serialize_with_kind() {
    let errors = validate(&schema(), &raw(json!({"adminPassword": "s3cretpass", "replicas": 15})))
        .unwrap_err();
    let json = serde_json::to_value(&errors.0[0]).unwrap();
    assert_eq!(json["kind"], "constraint_violation");
    assert_eq!(json["name"], "replicas");
    assert_eq!(json["rule"]["rule"], "max");
}

#[test]
fn test_schema_check() {
    assert!(schema().check().is_ok());

    let duplicate: ParameterSchema = serde_json::from_value(json!([
        {"name": "port", "type": "number"},
        {"name": "port", "type": "string"}
    ]))
    .unwrap();
    assert_eq!(duplicate.check(), Err(SchemaError::Duplicate("port".into())));

    let bad_pattern: ParameterSchema = serde_json::from_value(json!([
        {"name": "host", "type": "string", "pattern": "(unclosed"}
    ]))
    .unwrap();
    assert!(matches!(
        bad_pattern.check(),
        Err(SchemaError::InvalidPattern { name, .. }) if name == "host"
    ));
}
