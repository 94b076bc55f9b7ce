//! Top-level error types for attrforge.

use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::gateway::ApiError;
use crate::marshal::MarshalError;
use crate::transport::TransportError;

/// Top-level error type encompassing all attrforge errors.
#[derive(Debug, Error)]
pub enum AttrforgeError {
    /// Error converting between attribute trees and native values.
    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    /// Error obtaining credentials.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Error from an API call.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Error from the HTTP transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
