//! Schema-bound structures and their field tables.
//!
//! A resource or data-source model is a plain struct whose fields are
//! [`AttributeValue`]s. Instead of discovering those fields at runtime, each
//! model implements [`Model`] and lists a static table of [`Field`] entries:
//! the attribute name plus an accessor and a mutator.
//!
//! ```
//! use attrforge_core::model::{Field, Model};
//! use attrforge_core::AttributeValue;
//!
//! struct AppGroup {
//!     name: AttributeValue,
//!     api_version: AttributeValue,
//! }
//!
//! impl Model for AppGroup {
//!     const FIELDS: &'static [Field<Self>] = &[
//!         Field::new("name", |m| &m.name, |m, v| m.name = v),
//!         Field::new("api_version", |m| &m.api_version, |m, v| m.api_version = v),
//!     ];
//! }
//! ```
//!
//! The marshaller then offers whole-model operations: building a request body
//! ([`ValueMarshaller::model_to_native`]), building read-filter query
//! parameters ([`ValueMarshaller::model_to_query`]), reading a response into
//! the model ([`ValueMarshaller::model_from_native`]) and null-completing it
//! ([`fill_model`]).

use std::collections::BTreeMap;

use serde_json::Map;

use crate::fill::fill_unknowns;
use crate::marshal::{MarshalError, ValueMarshaller, is_absent};
use crate::scope::VisitScope;
use crate::value::{AttributeType, AttributeValue, NativeValue};

/// One attribute of a model.
pub struct Field<M> {
    /// Attribute-tree name of the field (`snake_case`).
    pub name: &'static str,
    get: fn(&M) -> &AttributeValue,
    set: fn(&mut M, AttributeValue),
}

impl<M> Field<M> {
    pub const fn new(
        name: &'static str,
        get: fn(&M) -> &AttributeValue,
        set: fn(&mut M, AttributeValue),
    ) -> Self {
        Self { name, get, set }
    }

    pub fn get<'m>(&self, model: &'m M) -> &'m AttributeValue {
        (self.get)(model)
    }

    pub fn set(&self, model: &mut M, value: AttributeValue) {
        (self.set)(model, value)
    }
}

/// A struct whose attributes are listed in a static field table.
pub trait Model: Sized + 'static {
    const FIELDS: &'static [Field<Self>];
}

impl ValueMarshaller {
    /// Request body from every known field of the model.
    pub fn model_to_native<M: Model>(
        &self,
        model: &M,
    ) -> Result<Map<String, NativeValue>, MarshalError> {
        let mut body = Map::new();
        for field in M::FIELDS {
            let value = field.get(model);
            if is_absent(value) {
                tracing::trace!(field = field.name, "skipping field without a known value");
                continue;
            }
            let scope = VisitScope::root().enter(field.name, self.policy());
            let native = self
                .to_native_scoped(value, &scope)
                .map_err(|e| e.within(field.name))?;
            body.insert(self.native_key(field.name, &scope), native);
        }
        Ok(body)
    }

    /// Query parameters from the model's known string fields.
    ///
    /// Fields of any other type, and null or unknown strings, are left out.
    pub fn model_to_query<M: Model>(&self, model: &M) -> BTreeMap<String, String> {
        M::FIELDS
            .iter()
            .filter_map(|field| {
                let value = field.get(model);
                if value.ty() != &AttributeType::String {
                    return None;
                }
                value
                    .as_str()
                    .map(|s| (self.case().to_lower_camel(field.name), s.to_string()))
            })
            .collect()
    }

    /// Overwrite every field of the model from a native response.
    ///
    /// Each field keeps its current type; fields absent from the response
    /// become typed nulls.
    pub fn model_from_native<M: Model>(
        &self,
        data: &Map<String, NativeValue>,
        model: &mut M,
    ) -> Result<(), MarshalError> {
        for field in M::FIELDS {
            let ty = field.get(model).ty().clone();
            let scope = VisitScope::root().enter(field.name, self.policy());
            let item = data
                .get(&self.native_key(field.name, &scope))
                .unwrap_or(&NativeValue::Null);
            let value = self
                .from_native_scoped(&ty, item, &scope)
                .map_err(|e| e.within(field.name))?;
            field.set(model, value);
        }
        Ok(())
    }
}

/// Null-complete every field of the model.
///
/// Unknown fields become typed nulls and object fields are completed
/// recursively.
pub fn fill_model<M: Model>(model: &mut M) -> Result<(), MarshalError> {
    for field in M::FIELDS {
        let value = field.get(model);
        if value.is_known() && !value.ty().is_object() {
            continue;
        }
        let filled = fill_unknowns(value.clone()).map_err(|e| e.within(field.name))?;
        field.set(model, filled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct PluginInstance {
        name: AttributeValue,
        namespace: AttributeValue,
        vcsa_host: AttributeValue,
        poll_interval: AttributeValue,
        labels: AttributeValue,
        status: AttributeValue,
    }

    fn status_type() -> AttributeType {
        AttributeType::object([
            ("health", AttributeType::String),
            ("last_sync_id", AttributeType::Int64),
        ])
    }

    impl PluginInstance {
        fn unknown() -> Self {
            Self {
                name: AttributeValue::unknown(AttributeType::String),
                namespace: AttributeValue::unknown(AttributeType::String),
                vcsa_host: AttributeValue::unknown(AttributeType::String),
                poll_interval: AttributeValue::unknown(AttributeType::Int64),
                labels: AttributeValue::unknown(AttributeType::map(AttributeType::String)),
                status: AttributeValue::unknown(status_type()),
            }
        }
    }

    impl Model for PluginInstance {
        const FIELDS: &'static [Field<Self>] = &[
            Field::new("name", |m| &m.name, |m, v| m.name = v),
            Field::new("namespace", |m| &m.namespace, |m, v| m.namespace = v),
            Field::new("vcsa_host", |m| &m.vcsa_host, |m, v| m.vcsa_host = v),
            Field::new("poll_interval", |m| &m.poll_interval, |m, v| m.poll_interval = v),
            Field::new("labels", |m| &m.labels, |m, v| m.labels = v),
            Field::new("status", |m| &m.status, |m, v| m.status = v),
        ];
    }

    #[test]
    fn test_model_to_native_skips_unresolved_fields() {
        let mut model = PluginInstance::unknown();
        model.name = AttributeValue::string("vc1");
        model.poll_interval = AttributeValue::int64(30);
        model.namespace = AttributeValue::null(AttributeType::String);

        let body = ValueMarshaller::default().model_to_native(&model).unwrap();
        assert_eq!(
            NativeValue::Object(body),
            json!({"name": "vc1", "pollInterval": 30})
        );
    }

    #[test]
    fn test_model_to_query_projects_known_strings() {
        let mut model = PluginInstance::unknown();
        model.namespace = AttributeValue::string("eda");
        model.vcsa_host = AttributeValue::string("vc.example.com");
        model.poll_interval = AttributeValue::int64(30);

        let query = ValueMarshaller::default().model_to_query(&model);
        let expected: BTreeMap<String, String> = [
            ("namespace".to_string(), "eda".to_string()),
            ("vcsaHost".to_string(), "vc.example.com".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(query, expected);
    }

    #[test]
    fn test_model_from_native_and_fill() {
        let marshaller = ValueMarshaller::default();
        let mut model = PluginInstance::unknown();
        let response = json!({
            "name": "vc1",
            "pollInterval": "45",
            "labels": {"Owner": "NetOps"},
            "status": {"health": "ok"}
        });
        let NativeValue::Object(response) = response else {
            unreachable!()
        };

        marshaller.model_from_native(&response, &mut model).unwrap();
        assert_eq!(model.name, AttributeValue::string("vc1"));
        assert_eq!(model.poll_interval, AttributeValue::int64(45));
        assert!(model.namespace.is_null());
        assert!(model.labels.entries().unwrap().contains_key("Owner"));
        assert!(model.status.field("last_sync_id").unwrap().is_null());

        fill_model(&mut model).unwrap();
        assert!(!model.vcsa_host.is_unknown());
    }

    #[test]
    fn test_fill_model_replaces_unknowns() {
        let mut model = PluginInstance::unknown();
        model.name = AttributeValue::string("vc1");

        let mut status = crate::value::Fields::new();
        status.insert("health".into(), AttributeValue::string("ok"));
        status.insert("last_sync_id".into(), AttributeValue::unknown(AttributeType::Int64));
        model.status = AttributeValue::object(status_type(), status).unwrap();

        fill_model(&mut model).unwrap();
        assert_eq!(model.name, AttributeValue::string("vc1"));
        assert_eq!(model.namespace, AttributeValue::null(AttributeType::String));
        assert_eq!(
            model.labels,
            AttributeValue::null(AttributeType::map(AttributeType::String))
        );
        assert_eq!(
            model.status.field("last_sync_id"),
            Some(&AttributeValue::null(AttributeType::Int64))
        );
    }

    #[test]
    fn test_model_from_native_reports_field_path() {
        let mut model = PluginInstance::unknown();
        let NativeValue::Object(response) = json!({"status": {"lastSyncID": "abc"}}) else {
            unreachable!()
        };
        let err = ValueMarshaller::default()
            .model_from_native(&response, &mut model)
            .unwrap_err();
        match err {
            MarshalError::ConversionFailure { path, .. } => {
                assert_eq!(path, "status.last_sync_id")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
