//! Null-completion of partially known attribute trees.
//!
//! A value read back from the backend may omit optional fields the schema
//! still declares. The configuration engine requires those fields to be an
//! explicit null rather than unknown, so after reading a response the tree is
//! passed through [`fill_unknowns`].

use crate::marshal::MarshalError;
use crate::value::{AttributeType, AttributeValue, Fields, Payload, ValueState};

/// Replace every unknown value with a null of the same type.
///
/// Object and custom object values are walked recursively; custom objects are
/// rebuilt through their type's construction capability. Known values are
/// never replaced, lists and maps are left as they are, and applying the pass
/// twice gives the same tree as applying it once.
pub fn fill_unknowns(value: AttributeValue) -> Result<AttributeValue, MarshalError> {
    fill_at(value, "")
}

fn fill_at(value: AttributeValue, path: &str) -> Result<AttributeValue, MarshalError> {
    let (ty, state) = value.into_parts();
    match state {
        ValueState::Unknown => {
            tracing::trace!(path, ty = %ty, "replacing unknown with null");
            Ok(AttributeValue::null(ty))
        }
        ValueState::Known(Payload::Object(fields)) if ty.is_object() => {
            let mut filled = Fields::with_capacity(fields.len());
            for (name, field) in fields {
                let child = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}.{name}")
                };
                filled.insert(name, fill_at(field, &child)?);
            }
            let filled = match &ty {
                AttributeType::Custom(typable) => typable.value_from_object(filled)?,
                _ => filled,
            };
            AttributeValue::object(ty, filled)
        }
        state => Ok(AttributeValue::from_parts(ty, state)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FieldTypes, ObjectTypable};

    fn spec_type() -> AttributeType {
        AttributeType::object([
            ("name", AttributeType::String),
            ("count", AttributeType::Int64),
            (
                "status",
                AttributeType::object([
                    ("phase", AttributeType::String),
                    ("ready", AttributeType::Bool),
                ]),
            ),
            ("tags", AttributeType::list(AttributeType::String)),
        ])
    }

    fn partially_known() -> AttributeValue {
        let status_ty = spec_type().field_types().unwrap()["status"].clone();
        let mut status = Fields::new();
        status.insert("phase".into(), AttributeValue::string("Ready"));
        status.insert("ready".into(), AttributeValue::unknown(AttributeType::Bool));

        let mut fields = Fields::new();
        fields.insert("name".into(), AttributeValue::string("n1"));
        fields.insert("count".into(), AttributeValue::unknown(AttributeType::Int64));
        fields.insert("status".into(), AttributeValue::object(status_ty, status).unwrap());
        fields.insert(
            "tags".into(),
            AttributeValue::unknown(AttributeType::list(AttributeType::String)),
        );
        AttributeValue::object(spec_type(), fields).unwrap()
    }

    #[test]
    fn test_unknown_leaves_become_typed_nulls() {
        let filled = fill_unknowns(partially_known()).unwrap();

        assert_eq!(filled.field("name"), Some(&AttributeValue::string("n1")));
        assert_eq!(
            filled.field("count"),
            Some(&AttributeValue::null(AttributeType::Int64))
        );
        assert_eq!(
            filled.field("tags"),
            Some(&AttributeValue::null(AttributeType::list(AttributeType::String)))
        );

        let status = filled.field("status").unwrap();
        assert_eq!(status.field("phase"), Some(&AttributeValue::string("Ready")));
        assert_eq!(
            status.field("ready"),
            Some(&AttributeValue::null(AttributeType::Bool))
        );
    }

    #[test]
    fn test_idempotent() {
        let once = fill_unknowns(partially_known()).unwrap();
        let twice = fill_unknowns(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_root_unknown_becomes_null() {
        let filled = fill_unknowns(AttributeValue::unknown(spec_type())).unwrap();
        assert!(filled.is_null());
        assert_eq!(filled.ty(), &spec_type());
    }

    #[test]
    fn test_known_scalars_untouched() {
        let value = AttributeValue::int64(5);
        assert_eq!(fill_unknowns(value.clone()).unwrap(), value);
        let null = AttributeValue::null(AttributeType::String);
        assert_eq!(fill_unknowns(null.clone()).unwrap(), null);
    }

    #[derive(Debug)]
    struct Status;

    impl ObjectTypable for Status {
        fn type_name(&self) -> &str {
            "status"
        }

        fn attribute_types(&self) -> FieldTypes {
            [("phase".to_string(), AttributeType::String)].into_iter().collect()
        }
    }

    #[test]
    fn test_custom_object_is_rewrapped() {
        let ty = AttributeType::custom(Status);
        let mut fields = Fields::new();
        fields.insert("phase".into(), AttributeValue::unknown(AttributeType::String));
        let value = AttributeValue::object(ty.clone(), fields).unwrap();

        let filled = fill_unknowns(value).unwrap();
        assert_eq!(filled.ty(), &ty);
        assert!(filled.field("phase").unwrap().is_null());
    }
}
