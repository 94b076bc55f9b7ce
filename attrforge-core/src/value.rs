//! Attribute-tree types and values.
//!
//! This module defines the typed side of marshalling:
//! - [`AttributeType`] - the shape of a value, a closed set of kinds plus one
//!   extension point for custom object types ([`ObjectTypable`])
//! - [`AttributeValue`] - a tri-state value (known, null, unknown) that always
//!   carries its type, so a correctly typed null can be produced anywhere
//! - [`NativeValue`] - the schema-less JSON value spoken by the backend API

use indexmap::IndexMap;
use serde_json::Number;
use std::fmt;
use std::sync::Arc;

use crate::marshal::MarshalError;

/// Schema-less value exchanged with the backend API.
pub type NativeValue = serde_json::Value;

/// Ordered field name to type mapping of an object type.
pub type FieldTypes = IndexMap<String, AttributeType>;

/// Ordered field name to value mapping of an object value.
pub type Fields = IndexMap<String, AttributeValue>;

/// A custom object type that presents its own name but round-trips through
/// the generic object representation.
///
/// Implementors describe their fields with [`attribute_types`] and rebuild a
/// value of their own type from a generic object with [`value_from_object`],
/// which is where custom validation or normalisation belongs.
///
/// [`attribute_types`]: ObjectTypable::attribute_types
/// [`value_from_object`]: ObjectTypable::value_from_object
pub trait ObjectTypable: fmt::Debug + Send + Sync {
    /// Human-readable type name used in diagnostics.
    fn type_name(&self) -> &str;

    /// The fields of the underlying object.
    fn attribute_types(&self) -> FieldTypes;

    /// Build a value of this type from its generic object fields.
    ///
    /// The default implementation accepts the fields unchanged.
    fn value_from_object(&self, fields: Fields) -> Result<Fields, MarshalError> {
        Ok(fields)
    }
}

/// The shape of an attribute value.
#[derive(Debug, Clone)]
pub enum AttributeType {
    Bool,
    Dynamic,
    Float32,
    Float64,
    Int32,
    Int64,
    List(Box<AttributeType>),
    Map(Box<AttributeType>),
    Number,
    Object(FieldTypes),
    Set(Box<AttributeType>),
    String,
    Custom(Arc<dyn ObjectTypable>),
}

impl AttributeType {
    /// List type with the given element type.
    pub fn list(elem: AttributeType) -> Self {
        Self::List(Box::new(elem))
    }

    /// Map type with the given element type.
    pub fn map(elem: AttributeType) -> Self {
        Self::Map(Box::new(elem))
    }

    /// Set type with the given element type.
    pub fn set(elem: AttributeType) -> Self {
        Self::Set(Box::new(elem))
    }

    /// Object type from `(name, type)` pairs, in declaration order.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeType)>,
        K: Into<String>,
    {
        Self::Object(fields.into_iter().map(|(k, t)| (k.into(), t)).collect())
    }

    /// Custom object type.
    pub fn custom(typable: impl ObjectTypable + 'static) -> Self {
        Self::Custom(Arc::new(typable))
    }

    /// Element type of a list, map or set.
    pub fn element_type(&self) -> Option<&AttributeType> {
        match self {
            Self::List(elem) | Self::Map(elem) | Self::Set(elem) => Some(elem),
            _ => None,
        }
    }

    /// Field types of an object or custom object type.
    pub fn field_types(&self) -> Option<FieldTypes> {
        match self {
            Self::Object(fields) => Some(fields.clone()),
            Self::Custom(typable) => Some(typable.attribute_types()),
            _ => None,
        }
    }

    /// Whether this is an object or custom object type.
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Custom(_))
    }

    /// Short kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Dynamic => "dynamic",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Number => "number",
            Self::Object(_) => "object",
            Self::Set(_) => "set",
            Self::String => "string",
            Self::Custom(_) => "custom object",
        }
    }
}

impl PartialEq for AttributeType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b))
            | (Self::Map(a), Self::Map(b))
            | (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => {
                a.type_name() == b.type_name() && a.attribute_types() == b.attribute_types()
            }
            (a, b) => {
                !a.is_compound() && std::mem::discriminant(a) == std::mem::discriminant(b)
            }
        }
    }
}

impl AttributeType {
    fn is_compound(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Map(_) | Self::Set(_) | Self::Object(_) | Self::Custom(_)
        )
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(elem) => write!(f, "list[{elem}]"),
            Self::Map(elem) => write!(f, "map[{elem}]"),
            Self::Set(elem) => write!(f, "set[{elem}]"),
            Self::Object(fields) => {
                write!(f, "object{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            Self::Custom(typable) => write!(f, "{}", typable.type_name()),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Payload of a known value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bool(bool),
    Float32(f32),
    Float64(f64),
    Int32(i32),
    Int64(i64),
    Number(Number),
    String(String),
    List(Vec<AttributeValue>),
    Set(Vec<AttributeValue>),
    Map(IndexMap<String, AttributeValue>),
    /// Fields of an object or custom object value.
    Object(Fields),
    /// Underlying value of a dynamic value.
    Dynamic(Box<AttributeValue>),
}

/// Tri-state of an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueState {
    Known(Payload),
    Null,
    /// Not yet resolved by a planning step.
    Unknown,
}

/// A typed, tri-state value of the attribute tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeValue {
    ty: AttributeType,
    state: ValueState,
}

impl AttributeValue {
    /// Null value of the given type.
    pub fn null(ty: AttributeType) -> Self {
        Self {
            ty,
            state: ValueState::Null,
        }
    }

    /// Unknown value of the given type.
    pub fn unknown(ty: AttributeType) -> Self {
        Self {
            ty,
            state: ValueState::Unknown,
        }
    }

    pub fn bool(value: bool) -> Self {
        Self::known_unchecked(AttributeType::Bool, Payload::Bool(value))
    }

    pub fn float32(value: f32) -> Self {
        Self::known_unchecked(AttributeType::Float32, Payload::Float32(value))
    }

    pub fn float64(value: f64) -> Self {
        Self::known_unchecked(AttributeType::Float64, Payload::Float64(value))
    }

    pub fn int32(value: i32) -> Self {
        Self::known_unchecked(AttributeType::Int32, Payload::Int32(value))
    }

    pub fn int64(value: i64) -> Self {
        Self::known_unchecked(AttributeType::Int64, Payload::Int64(value))
    }

    pub fn number(value: impl Into<Number>) -> Self {
        Self::known_unchecked(AttributeType::Number, Payload::Number(value.into()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::known_unchecked(AttributeType::String, Payload::String(value.into()))
    }

    /// Dynamic value wrapping an underlying value of any type.
    pub fn dynamic(underlying: AttributeValue) -> Self {
        Self::known_unchecked(AttributeType::Dynamic, Payload::Dynamic(Box::new(underlying)))
    }

    /// List value; every element must have `elem` as its type.
    pub fn list(elem: AttributeType, items: Vec<AttributeValue>) -> Result<Self, MarshalError> {
        check_elements(&elem, items.iter())?;
        Ok(Self::known_unchecked(AttributeType::list(elem), Payload::List(items)))
    }

    /// Set value; duplicates are kept as given.
    pub fn set(elem: AttributeType, items: Vec<AttributeValue>) -> Result<Self, MarshalError> {
        check_elements(&elem, items.iter())?;
        Ok(Self::known_unchecked(AttributeType::set(elem), Payload::Set(items)))
    }

    /// Map value; every entry must have `elem` as its type.
    pub fn map(
        elem: AttributeType,
        entries: IndexMap<String, AttributeValue>,
    ) -> Result<Self, MarshalError> {
        check_elements(&elem, entries.values())?;
        Ok(Self::known_unchecked(AttributeType::map(elem), Payload::Map(entries)))
    }

    /// Object value of an object or custom object type.
    ///
    /// The field set must match the type's declared fields exactly and each
    /// field value must carry the declared type. Fields are stored in
    /// declaration order.
    pub fn object(ty: AttributeType, mut fields: Fields) -> Result<Self, MarshalError> {
        let declared = ty.field_types().ok_or_else(|| MarshalError::TypeMismatch {
            path: String::new(),
            expected: "object".to_string(),
            got: ty.to_string(),
        })?;
        if let Some(extra) = fields.keys().find(|name| !declared.contains_key(*name)) {
            return Err(MarshalError::ConversionFailure {
                path: extra.clone(),
                message: format!("field is not declared by {ty}"),
            });
        }
        let mut ordered = Fields::with_capacity(declared.len());
        for (name, field_ty) in &declared {
            let value = fields
                .shift_remove(name)
                .ok_or_else(|| MarshalError::ConversionFailure {
                    path: name.clone(),
                    message: format!("missing declared field of {ty}"),
                })?;
            if value.ty() != field_ty {
                return Err(MarshalError::TypeMismatch {
                    path: name.clone(),
                    expected: field_ty.to_string(),
                    got: value.ty().to_string(),
                });
            }
            ordered.insert(name.clone(), value);
        }
        Ok(Self::known_unchecked(ty, Payload::Object(ordered)))
    }

    fn known_unchecked(ty: AttributeType, payload: Payload) -> Self {
        Self {
            ty,
            state: ValueState::Known(payload),
        }
    }

    /// The value's type.
    pub fn ty(&self) -> &AttributeType {
        &self.ty
    }

    /// The value's state.
    pub fn state(&self) -> &ValueState {
        &self.state
    }

    /// The payload when known.
    pub fn payload(&self) -> Option<&Payload> {
        match &self.state {
            ValueState::Known(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.state, ValueState::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.state, ValueState::Unknown)
    }

    pub fn is_known(&self) -> bool {
        matches!(self.state, ValueState::Known(_))
    }

    /// The string payload of a known string value.
    pub fn as_str(&self) -> Option<&str> {
        match self.payload() {
            Some(Payload::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Fields of a known object or custom object value.
    pub fn fields(&self) -> Option<&Fields> {
        match self.payload() {
            Some(Payload::Object(fields)) => Some(fields),
            _ => None,
        }
    }

    /// A single field of a known object value.
    pub fn field(&self, name: &str) -> Option<&AttributeValue> {
        self.fields().and_then(|fields| fields.get(name))
    }

    /// Entries of a known map value.
    pub fn entries(&self) -> Option<&IndexMap<String, AttributeValue>> {
        match self.payload() {
            Some(Payload::Map(entries)) => Some(entries),
            _ => None,
        }
    }

    /// Elements of a known list or set value.
    pub fn elements(&self) -> Option<&[AttributeValue]> {
        match self.payload() {
            Some(Payload::List(items)) | Some(Payload::Set(items)) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn into_parts(self) -> (AttributeType, ValueState) {
        (self.ty, self.state)
    }

    pub(crate) fn from_parts(ty: AttributeType, state: ValueState) -> Self {
        Self { ty, state }
    }
}

fn check_elements<'a>(
    elem: &AttributeType,
    items: impl Iterator<Item = &'a AttributeValue>,
) -> Result<(), MarshalError> {
    for (index, item) in items.enumerate() {
        if item.ty() != elem {
            return Err(MarshalError::TypeMismatch {
                path: format!("[{index}]"),
                expected: elem.to_string(),
                got: item.ty().to_string(),
            });
        }
    }
    Ok(())
}

/// Scalars render as their plain value, null as `null`, unknown as
/// `<unknown>`, and collections as their type.
impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            ValueState::Null => write!(f, "null"),
            ValueState::Unknown => write!(f, "<unknown>"),
            ValueState::Known(payload) => match payload {
                Payload::Bool(v) => write!(f, "{v}"),
                Payload::Float32(v) => write!(f, "{v}"),
                Payload::Float64(v) => write!(f, "{v}"),
                Payload::Int32(v) => write!(f, "{v}"),
                Payload::Int64(v) => write!(f, "{v}"),
                Payload::Number(v) => write!(f, "{v}"),
                Payload::String(v) => write!(f, "{v}"),
                Payload::Dynamic(inner) => write!(f, "{inner}"),
                Payload::List(items) | Payload::Set(items) => {
                    write!(f, "{}({} elements)", self.ty, items.len())
                }
                Payload::Map(entries) => write!(f, "{}({} entries)", self.ty, entries.len()),
                Payload::Object(_) => write!(f, "{}", self.ty),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Metadata;

    impl ObjectTypable for Metadata {
        fn type_name(&self) -> &str {
            "metadata"
        }

        fn attribute_types(&self) -> FieldTypes {
            [("name".to_string(), AttributeType::String)].into_iter().collect()
        }
    }

    #[test]
    fn test_type_equality() {
        assert_eq!(AttributeType::String, AttributeType::String);
        assert_ne!(AttributeType::String, AttributeType::Bool);
        assert_eq!(
            AttributeType::list(AttributeType::Int64),
            AttributeType::list(AttributeType::Int64)
        );
        assert_ne!(
            AttributeType::list(AttributeType::Int64),
            AttributeType::set(AttributeType::Int64)
        );
        assert_eq!(AttributeType::custom(Metadata), AttributeType::custom(Metadata));
        assert_ne!(
            AttributeType::custom(Metadata),
            AttributeType::object([("name", AttributeType::String)])
        );
    }

    #[test]
    fn test_object_orders_fields_by_declaration() {
        let ty = AttributeType::object([("b", AttributeType::String), ("a", AttributeType::Bool)]);
        let mut fields = Fields::new();
        fields.insert("a".into(), AttributeValue::bool(true));
        fields.insert("b".into(), AttributeValue::string("x"));

        let value = AttributeValue::object(ty, fields).unwrap();
        let names: Vec<_> = value.fields().unwrap().keys().cloned().collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_object_rejects_mismatched_field() {
        let ty = AttributeType::object([("name", AttributeType::String)]);
        let mut fields = Fields::new();
        fields.insert("name".into(), AttributeValue::int64(1));

        let err = AttributeValue::object(ty, fields).unwrap_err();
        assert!(matches!(err, MarshalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_object_rejects_missing_and_extra_fields() {
        let ty = AttributeType::object([("name", AttributeType::String)]);
        assert!(AttributeValue::object(ty.clone(), Fields::new()).is_err());

        let mut fields = Fields::new();
        fields.insert("name".into(), AttributeValue::string("x"));
        fields.insert("other".into(), AttributeValue::string("y"));
        assert!(AttributeValue::object(ty, fields).is_err());
    }

    #[test]
    fn test_list_rejects_wrong_element_type() {
        let err = AttributeValue::list(
            AttributeType::String,
            vec![AttributeValue::string("a"), AttributeValue::bool(false)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("[1]"));
    }

    #[test]
    fn test_display() {
        assert_eq!(AttributeValue::int64(42).to_string(), "42");
        assert_eq!(AttributeValue::string("x").to_string(), "x");
        assert_eq!(AttributeValue::null(AttributeType::String).to_string(), "null");
        assert_eq!(AttributeValue::unknown(AttributeType::Bool).to_string(), "<unknown>");
        assert_eq!(
            AttributeType::map(AttributeType::list(AttributeType::String)).to_string(),
            "map[list[string]]"
        );
    }
}
