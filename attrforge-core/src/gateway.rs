//! Authenticated calls to the backend API.
//!
//! [`ApiClient`] attaches the primary bearer token to every request and
//! returns the decoded JSON body. API calls are never retried here: only the
//! login inside [`CredentialStore`] retries, and connection-level retries
//! belong to the [`HttpTransport`].

use std::sync::Arc;

use reqwest::Method;
use thiserror::Error;

use crate::config::ClientConfig;
use crate::credentials::{CredentialError, CredentialStore, GrantKind};
use crate::error::AttrforgeError;
use crate::transport::{
    HttpTransport, Params, RequestBody, TransportError, TransportRequest,
};
use crate::value::NativeValue;

/// Error type for API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("failed to decode response: {message}")]
    Decode { message: String },
}

/// Client for the backend REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Arc<HttpTransport>,
    credentials: Arc<CredentialStore<HttpTransport>>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<HttpTransport>,
        credentials: Arc<CredentialStore<HttpTransport>>,
    ) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Build the transport and credential store described by `config`.
    ///
    /// Resolves the client secret when none is configured, so this performs
    /// network calls in that case.
    pub async fn connect(config: &ClientConfig) -> Result<Self, AttrforgeError> {
        let transport = Arc::new(HttpTransport::new(config.transport_settings()?)?);
        let credentials = CredentialStore::connect(config, transport.clone()).await?;
        tracing::info!(base_url = %config.base_url, client_id = %config.client_id, "API client ready");
        Ok(Self::new(transport, Arc::new(credentials)))
    }

    pub fn credentials(&self) -> &CredentialStore<HttpTransport> {
        &self.credentials
    }

    pub async fn create(
        &self,
        path: &str,
        path_params: &Params,
        body: &NativeValue,
    ) -> Result<NativeValue, ApiError> {
        self.execute(Method::POST, path, path_params, &Params::new(), Some(body))
            .await
    }

    pub async fn get(&self, path: &str, path_params: &Params) -> Result<NativeValue, ApiError> {
        self.execute(Method::GET, path, path_params, &Params::new(), None)
            .await
    }

    /// GET with query parameters, typically built by
    /// [`ValueMarshaller::model_to_query`](crate::marshal::ValueMarshaller::model_to_query).
    pub async fn get_by_query(
        &self,
        path: &str,
        path_params: &Params,
        query: &Params,
    ) -> Result<NativeValue, ApiError> {
        self.execute(Method::GET, path, path_params, query, None)
            .await
    }

    pub async fn update(
        &self,
        path: &str,
        path_params: &Params,
        body: &NativeValue,
    ) -> Result<NativeValue, ApiError> {
        self.execute(Method::PUT, path, path_params, &Params::new(), Some(body))
            .await
    }

    pub async fn delete(&self, path: &str, path_params: &Params) -> Result<NativeValue, ApiError> {
        self.execute(Method::DELETE, path, path_params, &Params::new(), None)
            .await
    }

    /// Send one authenticated request and decode its JSON response.
    ///
    /// An empty response body decodes as `null`.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        path_params: &Params,
        query: &Params,
        body: Option<&NativeValue>,
    ) -> Result<NativeValue, ApiError> {
        let token = self.credentials.get_access_token(GrantKind::Primary).await?;

        let mut request = TransportRequest::new(method.clone(), path)
            .path_params(path_params.clone())
            .query(query.clone())
            .bearer(token);
        if let Some(body) = body {
            request = request.body(RequestBody::Json(body.clone()));
        }

        let started = std::time::Instant::now();
        let response = self.transport.send(&request).await?;
        tracing::info!(
            %method,
            path,
            ?path_params,
            ?query,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "API call"
        );

        if !response.is_success() {
            return Err(ApiError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        response.json().map_err(|e| match e {
            TransportError::Decode { message, .. } => ApiError::Decode { message },
            other => ApiError::Transport(other),
        })
    }
}
