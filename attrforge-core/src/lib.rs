//! # attrforge core
//!
//! Data-marshalling and authentication core for configuration-engine
//! integrations with a REST backend.
//!
//! This crate provides:
//! - [`AttributeValue`] / [`AttributeType`]: the typed, tri-state attribute tree
//! - [`ValueMarshaller`]: conversion between attribute trees and native JSON,
//!   with key case conversion ([`CaseConverter`]) and case-preserving subtrees
//! - [`fill_unknowns`]: null-completion of partially known trees
//! - [`Model`]: static field tables for schema-bound structs
//! - [`CredentialStore`]: cached OAuth2 grants with retrying login
//! - [`ApiClient`]: authenticated REST calls over [`HttpTransport`]
//!
//! ## Quick Start
//!
//! ```rust
//! use attrforge_core::{AttributeType, ValueMarshaller};
//! use serde_json::json;
//!
//! let ty = AttributeType::object([
//!     ("vlan_id", AttributeType::Int64),
//!     ("labels", AttributeType::map(AttributeType::String)),
//! ]);
//! let marshaller = ValueMarshaller::default();
//!
//! let native = json!({"vlanID": 10, "labels": {"Owner": "NetOps"}});
//! let value = marshaller.from_native(&ty, &native).unwrap();
//! assert!(value.field("vlan_id").is_some());
//! assert_eq!(marshaller.to_native(&value).unwrap(), native);
//! ```

pub mod casing;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fill;
pub mod gateway;
pub mod marshal;
pub mod model;
pub mod scope;
pub mod secret;
pub mod transport;
pub mod value;

// Re-export commonly used types at crate root
pub use casing::{CaseConverter, camel_to_snake, snake_to_camel};

pub use value::{AttributeType, AttributeValue, NativeValue, ObjectTypable, Payload, ValueState};

pub use scope::{CasePolicy, VisitScope};

pub use marshal::{MarshalError, ValueMarshaller};

pub use fill::fill_unknowns;

pub use model::{Field, Model, fill_model};

pub use credentials::{
    AuthTransport, ClientCredential, CredentialError, CredentialStore, GrantKind, GrantState,
    TokenInfo,
};

pub use transport::{HttpTransport, Params, TransportError, TransportSettings};

pub use gateway::{ApiClient, ApiError};

pub use config::{ClientConfig, ConfigError};

pub use secret::Secret;

pub use error::AttrforgeError;
