//! Bidirectional conversion between attribute trees and native values.
//!
//! [`ValueMarshaller::to_native`] turns a typed [`AttributeValue`] into the
//! JSON body sent to the backend, and [`ValueMarshaller::from_native`] reads a
//! backend response back into a value of a given [`AttributeType`].
//!
//! Key casing: typed names are `snake_case`, native names are
//! `lowerCamelCase`, and keys below a case-preserving field (see
//! [`crate::scope`]) are copied verbatim in both directions.
//!
//! Null and unknown elements are dropped from native output. Any error aborts
//! the whole conversion.

use indexmap::IndexMap;
use serde_json::{Map, Number};
use thiserror::Error;

use crate::casing::CaseConverter;
use crate::scope::{CasePolicy, VisitScope};
use crate::value::{
    AttributeType, AttributeValue, FieldTypes, Fields, NativeValue, Payload, ValueState,
};

/// Error type for marshalling operations.
///
/// `path` is the dotted field path of the offending value, empty at the root.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarshalError {
    /// A null or unknown value where a concrete value is required.
    #[error("nil value at '{path}'")]
    NilInput { path: String },

    /// The value does not have the expected shape.
    #[error("type mismatch at '{path}': expected {expected}, got {got}")]
    TypeMismatch {
        path: String,
        expected: String,
        got: String,
    },

    /// The type cannot be converted.
    #[error("unsupported type at '{path}': {ty}")]
    UnsupportedType { path: String, ty: String },

    /// The shape matched but the value could not be represented.
    #[error("conversion failed at '{path}': {message}")]
    ConversionFailure { path: String, message: String },
}

impl MarshalError {
    /// The same error with its path placed below `parent`.
    pub(crate) fn within(self, parent: &str) -> Self {
        let join = |path: String| {
            if parent.is_empty() {
                path
            } else if path.is_empty() {
                parent.to_string()
            } else if path.starts_with('[') {
                format!("{parent}{path}")
            } else {
                format!("{parent}.{path}")
            }
        };
        match self {
            Self::NilInput { path } => Self::NilInput { path: join(path) },
            Self::TypeMismatch {
                path,
                expected,
                got,
            } => Self::TypeMismatch {
                path: join(path),
                expected,
                got,
            },
            Self::UnsupportedType { path, ty } => Self::UnsupportedType {
                path: join(path),
                ty,
            },
            Self::ConversionFailure { path, message } => Self::ConversionFailure {
                path: join(path),
                message,
            },
        }
    }
}

/// Converts values between the attribute tree and native data.
#[derive(Debug, Clone)]
pub struct ValueMarshaller {
    case: CaseConverter,
    policy: CasePolicy,
}

impl Default for ValueMarshaller {
    fn default() -> Self {
        Self::new(CaseConverter::standard().clone(), CasePolicy::default())
    }
}

impl ValueMarshaller {
    pub fn new(case: CaseConverter, policy: CasePolicy) -> Self {
        Self { case, policy }
    }

    pub fn case(&self) -> &CaseConverter {
        &self.case
    }

    pub fn policy(&self) -> &CasePolicy {
        &self.policy
    }

    /// Convert a known value to native data.
    ///
    /// Fails with [`MarshalError::NilInput`] when `value` itself is null or
    /// unknown; nested null and unknown entries are skipped.
    pub fn to_native(&self, value: &AttributeValue) -> Result<NativeValue, MarshalError> {
        self.to_native_scoped(value, &VisitScope::root())
    }

    /// [`to_native`](Self::to_native) starting from an explicit scope.
    pub fn to_native_scoped(
        &self,
        value: &AttributeValue,
        scope: &VisitScope,
    ) -> Result<NativeValue, MarshalError> {
        self.encode(value, scope, "")
    }

    /// Read native data into a value of type `ty`.
    ///
    /// JSON `null` becomes a typed null.
    pub fn from_native(
        &self,
        ty: &AttributeType,
        data: &NativeValue,
    ) -> Result<AttributeValue, MarshalError> {
        self.from_native_scoped(ty, data, &VisitScope::root())
    }

    /// [`from_native`](Self::from_native) starting from an explicit scope.
    pub fn from_native_scoped(
        &self,
        ty: &AttributeType,
        data: &NativeValue,
        scope: &VisitScope,
    ) -> Result<AttributeValue, MarshalError> {
        self.decode(ty, data, scope, "")
    }

    /// Native key for a typed name at the given scope.
    pub(crate) fn native_key(&self, name: &str, scope: &VisitScope) -> String {
        if scope.is_preserving() {
            name.to_string()
        } else {
            self.case.to_lower_camel(name)
        }
    }

    /// Typed key for a native name at the given scope.
    fn typed_key(&self, name: &str, scope: &VisitScope) -> String {
        if scope.is_preserving() {
            name.to_string()
        } else {
            self.case.to_separated(name)
        }
    }

    fn encode(
        &self,
        value: &AttributeValue,
        scope: &VisitScope,
        path: &str,
    ) -> Result<NativeValue, MarshalError> {
        let payload = match value.state() {
            ValueState::Known(payload) => payload,
            ValueState::Null | ValueState::Unknown => {
                return Err(MarshalError::NilInput {
                    path: path.to_string(),
                });
            }
        };

        match payload {
            Payload::Bool(v) => Ok(NativeValue::Bool(*v)),
            Payload::Int32(v) => Ok(NativeValue::from(*v)),
            Payload::Int64(v) => Ok(NativeValue::from(*v)),
            Payload::Float32(v) => float_to_native(shortest_f64(*v), path),
            Payload::Float64(v) => float_to_native(*v, path),
            Payload::Number(n) => Ok(NativeValue::Number(integral_number(n))),
            Payload::String(s) => Ok(NativeValue::String(s.clone())),
            Payload::Dynamic(inner) => self.encode(inner, scope, path),
            Payload::List(items) | Payload::Set(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if is_absent(item) {
                        continue;
                    }
                    out.push(self.encode(item, scope, &index_path(path, index))?);
                }
                Ok(NativeValue::Array(out))
            }
            Payload::Map(entries) => self.encode_entries(entries, scope, path),
            Payload::Object(fields) => self.encode_entries(fields, scope, path),
        }
    }

    fn encode_entries(
        &self,
        entries: &IndexMap<String, AttributeValue>,
        scope: &VisitScope,
        path: &str,
    ) -> Result<NativeValue, MarshalError> {
        let mut out = Map::new();
        for (name, item) in entries {
            if is_absent(item) {
                continue;
            }
            let child = scope.enter(name, &self.policy);
            tracing::trace!(field = name.as_str(), preserving = child.is_preserving(), "encoding entry");
            let native = self.encode(item, &child, &field_path(path, name))?;
            out.insert(self.native_key(name, &child), native);
        }
        Ok(NativeValue::Object(out))
    }

    fn decode(
        &self,
        ty: &AttributeType,
        data: &NativeValue,
        scope: &VisitScope,
        path: &str,
    ) -> Result<AttributeValue, MarshalError> {
        if data.is_null() {
            return Ok(AttributeValue::null(ty.clone()));
        }

        match ty {
            AttributeType::Bool => data
                .as_bool()
                .map(AttributeValue::bool)
                .ok_or_else(|| mismatch(path, ty, data)),
            AttributeType::String => data
                .as_str()
                .map(AttributeValue::string)
                .ok_or_else(|| mismatch(path, ty, data)),
            AttributeType::Float32 => {
                let v = data.as_f64().ok_or_else(|| mismatch(path, ty, data))?;
                let narrowed = v as f32;
                if v.is_finite() && !narrowed.is_finite() {
                    return Err(MarshalError::ConversionFailure {
                        path: path.to_string(),
                        message: format!("{v} is out of range for float32"),
                    });
                }
                Ok(AttributeValue::float32(narrowed))
            }
            AttributeType::Float64 => {
                let v = data.as_f64().ok_or_else(|| mismatch(path, ty, data))?;
                Ok(AttributeValue::float64(v))
            }
            AttributeType::Int32 => {
                let v = native_to_i64(data, path)?;
                let v = i32::try_from(v).map_err(|_| MarshalError::ConversionFailure {
                    path: path.to_string(),
                    message: format!("{v} does not fit in int32"),
                })?;
                Ok(AttributeValue::int32(v))
            }
            AttributeType::Int64 => Ok(AttributeValue::int64(native_to_i64(data, path)?)),
            AttributeType::Number => Ok(AttributeValue::number(native_to_number(data, path)?)),
            AttributeType::Dynamic => self.decode_dynamic(data, scope, path),
            AttributeType::List(elem) => {
                let items = self.decode_elements(elem, data, scope, path, ty)?;
                AttributeValue::list((**elem).clone(), items)
            }
            AttributeType::Set(elem) => {
                let items = self.decode_elements(elem, data, scope, path, ty)?;
                AttributeValue::set((**elem).clone(), items)
            }
            AttributeType::Map(elem) => {
                let object = data.as_object().ok_or_else(|| mismatch(path, ty, data))?;
                let mut entries = IndexMap::with_capacity(object.len());
                for (key, item) in object {
                    let child = scope.enter(key, &self.policy);
                    let value = self.decode(elem, item, &child, &field_path(path, key))?;
                    let typed = self.typed_key(key, &child);
                    if entries.insert(typed.clone(), value).is_some() {
                        return Err(MarshalError::ConversionFailure {
                            path: field_path(path, key),
                            message: format!("duplicate key '{typed}' after case conversion"),
                        });
                    }
                }
                AttributeValue::map((**elem).clone(), entries)
            }
            AttributeType::Object(field_types) => {
                let fields = self.decode_fields(field_types, data, scope, path, ty)?;
                AttributeValue::object(ty.clone(), fields).map_err(|e| e.within(path))
            }
            AttributeType::Custom(typable) => {
                let field_types = typable.attribute_types();
                let fields = self.decode_fields(&field_types, data, scope, path, ty)?;
                let fields = typable
                    .value_from_object(fields)
                    .map_err(|e| e.within(path))?;
                AttributeValue::object(ty.clone(), fields).map_err(|e| e.within(path))
            }
        }
    }

    fn decode_elements(
        &self,
        elem: &AttributeType,
        data: &NativeValue,
        scope: &VisitScope,
        path: &str,
        ty: &AttributeType,
    ) -> Result<Vec<AttributeValue>, MarshalError> {
        let array = data.as_array().ok_or_else(|| mismatch(path, ty, data))?;
        array
            .iter()
            .enumerate()
            .map(|(index, item)| self.decode(elem, item, scope, &index_path(path, index)))
            .collect()
    }

    fn decode_fields(
        &self,
        field_types: &FieldTypes,
        data: &NativeValue,
        scope: &VisitScope,
        path: &str,
        ty: &AttributeType,
    ) -> Result<Fields, MarshalError> {
        let object = data.as_object().ok_or_else(|| mismatch(path, ty, data))?;
        let mut fields = Fields::with_capacity(field_types.len());
        for (name, field_ty) in field_types {
            let child = scope.enter(name, &self.policy);
            let key = self.native_key(name, &child);
            tracing::trace!(field = name.as_str(), key = key.as_str(), "decoding field");
            let item = object.get(&key).unwrap_or(&NativeValue::Null);
            let value = self.decode(field_ty, item, &child, &field_path(path, name))?;
            fields.insert(name.clone(), value);
        }
        Ok(fields)
    }

    /// Infer a type from the native shape: scalars become bool, number or
    /// string; arrays become lists and objects maps of dynamic values.
    fn decode_dynamic(
        &self,
        data: &NativeValue,
        scope: &VisitScope,
        path: &str,
    ) -> Result<AttributeValue, MarshalError> {
        let underlying = match data {
            NativeValue::Null => AttributeValue::null(AttributeType::Dynamic),
            NativeValue::Bool(v) => AttributeValue::bool(*v),
            NativeValue::Number(n) => AttributeValue::number(integral_number(n)),
            NativeValue::String(s) => AttributeValue::string(s.clone()),
            NativeValue::Array(_) => {
                let elem = AttributeType::Dynamic;
                let items = self.decode_elements(&elem, data, scope, path, &AttributeType::Dynamic)?;
                AttributeValue::list(elem, items)?
            }
            NativeValue::Object(_) => {
                self.decode(&AttributeType::map(AttributeType::Dynamic), data, scope, path)?
            }
        };
        Ok(AttributeValue::dynamic(underlying))
    }
}

fn field_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

fn native_kind(data: &NativeValue) -> &'static str {
    match data {
        NativeValue::Null => "null",
        NativeValue::Bool(_) => "bool",
        NativeValue::Number(_) => "number",
        NativeValue::String(_) => "string",
        NativeValue::Array(_) => "array",
        NativeValue::Object(_) => "object",
    }
}

fn mismatch(path: &str, ty: &AttributeType, data: &NativeValue) -> MarshalError {
    MarshalError::TypeMismatch {
        path: path.to_string(),
        expected: ty.to_string(),
        got: native_kind(data).to_string(),
    }
}

/// Null or unknown, looking through dynamic wrappers.
pub(crate) fn is_absent(value: &AttributeValue) -> bool {
    match value.payload() {
        Some(Payload::Dynamic(inner)) => is_absent(inner),
        Some(_) => false,
        None => true,
    }
}

/// Widen through the shortest decimal form so `0.1f32` stays `0.1`.
fn shortest_f64(v: f32) -> f64 {
    v.to_string().parse().unwrap_or_else(|_| f64::from(v))
}

fn float_to_native(v: f64, path: &str) -> Result<NativeValue, MarshalError> {
    Number::from_f64(v)
        .map(NativeValue::Number)
        .ok_or_else(|| MarshalError::ConversionFailure {
            path: path.to_string(),
            message: format!("{v} has no JSON representation"),
        })
}

/// Integral floats within `i64` range become integers; everything else is
/// returned unchanged.
fn integral_number(n: &Number) -> Number {
    match n.as_f64() {
        Some(f) if n.is_f64() && is_integral_i64(f) => Number::from(f as i64),
        _ => n.clone(),
    }
}

fn is_integral_i64(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Convert any numeric native representation to `i64`.
///
/// Accepts signed and unsigned integers, integral floats and decimal strings.
/// Fails when the value would be truncated or does not fit.
pub fn native_to_i64(data: &NativeValue, path: &str) -> Result<i64, MarshalError> {
    let failure = |message: String| MarshalError::ConversionFailure {
        path: path.to_string(),
        message,
    };
    match data {
        NativeValue::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(v)
            } else if let Some(v) = n.as_u64() {
                i64::try_from(v).map_err(|_| failure(format!("{v} does not fit in int64")))
            } else {
                match n.as_f64() {
                    Some(f) if is_integral_i64(f) => Ok(f as i64),
                    _ => Err(failure(format!("{n} is not an integer"))),
                }
            }
        }
        NativeValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| failure(format!("'{s}' is not an integer: {e}"))),
        other => Err(MarshalError::TypeMismatch {
            path: path.to_string(),
            expected: "int64".to_string(),
            got: native_kind(other).to_string(),
        }),
    }
}

/// Convert any numeric native representation to a JSON number, normalising
/// to an integer when that is lossless.
pub fn native_to_number(data: &NativeValue, path: &str) -> Result<Number, MarshalError> {
    match data {
        NativeValue::Number(n) => Ok(integral_number(n)),
        NativeValue::String(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Ok(Number::from(v));
            }
            if let Ok(v) = trimmed.parse::<u64>() {
                return Ok(Number::from(v));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(|n| integral_number(&n))
                .ok_or_else(|| MarshalError::ConversionFailure {
                    path: path.to_string(),
                    message: format!("'{s}' is not a number"),
                })
        }
        other => Err(MarshalError::TypeMismatch {
            path: path.to_string(),
            expected: "number".to_string(),
            got: native_kind(other).to_string(),
        }),
    }
}
