//! Integration tests for attribute-tree marshalling.
//!
//! These tests exercise the public API end to end: reading a backend
//! response into a typed tree, completing it with nulls and writing it back.

use attrforge_core::{
    AttributeType, AttributeValue, CaseConverter, CasePolicy, MarshalError, ValueMarshaller,
    fill_unknowns,
};
use serde_json::json;

fn instance_type() -> AttributeType {
    AttributeType::object([
        (
            "metadata",
            AttributeType::object([
                ("name", AttributeType::String),
                ("namespace", AttributeType::String),
                ("labels", AttributeType::map(AttributeType::String)),
                ("annotations", AttributeType::map(AttributeType::String)),
            ]),
        ),
        (
            "spec",
            AttributeType::object([
                ("vcsa_host", AttributeType::String),
                ("vcsa_tls_verify", AttributeType::Bool),
                ("external_id", AttributeType::String),
                ("pool_ipv4", AttributeType::list(AttributeType::String)),
                ("vlan_id", AttributeType::Int64),
                ("poll_interval", AttributeType::Number),
                ("extra", AttributeType::Dynamic),
            ]),
        ),
    ])
}

#[test]
fn test_backend_response_round_trip() {
    let response = json!({
        "metadata": {
            "name": "vc1",
            "namespace": "eda",
            "labels": {"Owner": "NetOps", "env_tier": "prod"},
            "annotations": {"kubectl.kubernetes.io/last-applied": "{}"}
        },
        "spec": {
            "vcsaHost": "vc.example.com",
            "vcsaTlsVerify": true,
            "externalId": "ext-1",
            "poolIPv4": ["10.0.0.0/24", "10.0.1.0/24"],
            "vlanID": 100,
            "pollInterval": 30,
            "extra": {"nested": [1, "two", false]}
        }
    });

    let marshaller = ValueMarshaller::default();
    let value = marshaller.from_native(&instance_type(), &response).unwrap();

    let spec = value.field("spec").unwrap();
    assert_eq!(spec.field("vlan_id"), Some(&AttributeValue::int64(100)));
    assert_eq!(spec.field("vcsa_tls_verify"), Some(&AttributeValue::bool(true)));
    assert_eq!(spec.field("external_id"), Some(&AttributeValue::string("ext-1")));

    let labels = value.field("metadata").unwrap().field("labels").unwrap();
    let keys: Vec<_> = labels.entries().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["Owner".to_string(), "env_tier".to_string()]);

    assert_eq!(marshaller.to_native(&value).unwrap(), response);
}

#[test]
fn test_tags_keep_their_case() {
    let ty = AttributeType::object([
        ("name", AttributeType::String),
        ("tags", AttributeType::map(AttributeType::String)),
    ]);
    let marshaller = ValueMarshaller::new(
        CaseConverter::standard().clone(),
        CasePolicy::default().with("tags"),
    );

    let value = marshaller
        .from_native(&ty, &json!({"name": "x", "tags": {"MixedCase": "v"}}))
        .unwrap();
    let tags = value.field("tags").unwrap().entries().unwrap();
    assert!(tags.contains_key("MixedCase"));

    // Without the policy the key is case-converted.
    let plain = ValueMarshaller::new(CaseConverter::standard().clone(), CasePolicy::none())
        .from_native(&ty, &json!({"name": "x", "tags": {"MixedCase": "v"}}))
        .unwrap();
    assert!(plain.field("tags").unwrap().entries().unwrap().contains_key("mixed_case"));
}

#[test]
fn test_partial_response_is_null_completed() {
    let marshaller = ValueMarshaller::default();
    let value = marshaller
        .from_native(&instance_type(), &json!({"metadata": {"name": "vc1"}}))
        .unwrap();

    let filled = fill_unknowns(value.clone()).unwrap();
    assert_eq!(filled, value);
    assert!(filled.field("spec").unwrap().is_null());
    assert!(filled.field("metadata").unwrap().field("labels").unwrap().is_null());

    // Null fields are dropped on the way back.
    assert_eq!(
        marshaller.to_native(&filled).unwrap(),
        json!({"metadata": {"name": "vc1"}})
    );
}

#[test]
fn test_errors_name_the_offending_field() {
    let err = ValueMarshaller::default()
        .from_native(
            &instance_type(),
            &json!({"spec": {"poolIPv4": ["10.0.0.0/24", 7]}}),
        )
        .unwrap_err();
    assert_eq!(
        err,
        MarshalError::TypeMismatch {
            path: "spec.pool_ipv4[1]".to_string(),
            expected: "string".to_string(),
            got: "number".to_string(),
        }
    );
}
