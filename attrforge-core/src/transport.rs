//! HTTP transport to the backend and its identity provider.
//!
//! [`HttpTransport`] wraps a [`reqwest::Client`] configured from
//! [`TransportSettings`]: base URL, request timeout, TLS verification, debug
//! tracing and a retry policy. Connection failures and 5xx responses are
//! retried `retries` times with a fixed interval; every other response is
//! handed back to the caller as-is.
//!
//! Request paths are relative to the base URL and may contain `{name}`
//! placeholders, which are replaced by the matching path parameter:
//!
//! ```text
//! /apps/{group}/v1/namespaces/{namespace}/instances  +  {group: vmware.eda.nokia.com, namespace: eda}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use thiserror::Error;
use url::Url;

use crate::credentials::{AuthTransport, TokenResponse};
use crate::secret::Secret;
use crate::value::NativeValue;

/// Path or query parameters.
pub type Params = BTreeMap<String, String>;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request URL could not be built.
    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {message}")]
    Client { message: String },

    /// The request could not be completed, even after retrying.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// The response body was not what the caller expected.
    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub base_url: Url,
    pub timeout: Duration,
    pub tls_skip_verify: bool,
    /// Log every request and response body at debug level.
    pub debug: bool,
    /// Additional attempts after a connection failure or 5xx response.
    pub retries: u32,
    pub retry_interval: Duration,
}

impl TransportSettings {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(15),
            tls_skip_verify: false,
            debug: false,
            retries: 3,
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// Body of an outgoing request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(NativeValue),
    Form(Vec<(String, String)>),
}

/// A request relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub path_params: Params,
    pub query: Params,
    pub bearer: Option<Secret>,
    pub body: RequestBody,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: Params::new(),
            query: Params::new(),
            bearer: None,
            body: RequestBody::Empty,
        }
    }

    pub fn path_params(mut self, params: Params) -> Self {
        self.path_params = params;
        self
    }

    pub fn query(mut self, query: Params) -> Self {
        self.query = query;
        self
    }

    pub fn bearer(mut self, token: Secret) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with [`TransportError::Status`] unless the status is 2xx.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Status {
                url: self.url,
                status: self.status,
                body: self.body,
            })
        }
    }

    /// Decode the body as JSON; an empty body decodes as `null`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, TransportError> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| TransportError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

/// HTTP client bound to one backend.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    settings: TransportSettings,
}

impl HttpTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        if settings.base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl {
                message: format!("{} cannot be used as a base URL", settings.base_url),
            });
        }
        if settings.tls_skip_verify {
            tracing::warn!(base_url = %settings.base_url, "TLS certificate verification disabled");
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.tls_skip_verify)
            .build()
            .map_err(|e| TransportError::Client {
                message: e.to_string(),
            })?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Absolute URL for `path` with its placeholders substituted.
    pub fn resolve_url(&self, path: &str, path_params: &Params) -> Result<Url, TransportError> {
        let mut url = self.settings.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| TransportError::InvalidUrl {
                message: format!("{} cannot be used as a base URL", self.settings.base_url),
            })?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                segments.push(&substitute(segment, path_params)?);
            }
        }
        Ok(url)
    }

    /// Send a request, retrying connection failures and 5xx responses.
    pub async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut url = self.resolve_url(&request.path, &request.path_params)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut attempt = 0;
        loop {
            match self.send_once(request, &url).await {
                Ok(response) if response.status < 500 || attempt >= self.settings.retries => {
                    return Ok(response);
                }
                Ok(response) => {
                    tracing::warn!(
                        url = %url,
                        status = response.status,
                        attempt,
                        "server error, retrying"
                    );
                }
                Err(e) if attempt >= self.settings.retries => return Err(e),
                Err(e) => {
                    tracing::warn!(url = %url, attempt, error = %e, "request failed, retrying");
                }
            }
            attempt += 1;
            tokio::time::sleep(self.settings.retry_interval).await;
        }
    }

    async fn send_once(
        &self,
        request: &TransportRequest,
        url: &Url,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.expose());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(pairs) => builder.form(pairs),
        };

        if self.settings.debug {
            match &request.body {
                RequestBody::Json(body) => {
                    tracing::debug!(method = %request.method, url = %url, body = %body, "sending request")
                }
                _ => tracing::debug!(method = %request.method, url = %url, "sending request"),
            }
        }

        let started = std::time::Instant::now();
        let response = builder.send().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if self.settings.debug {
            tracing::debug!(
                url = %url,
                status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                body = body.as_str(),
                "received response"
            );
        }

        Ok(TransportResponse {
            url: url.to_string(),
            status,
            body,
        })
    }
}

/// Replace `{name}` placeholders in one path segment.
fn substitute(segment: &str, params: &Params) -> Result<String, TransportError> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + close];
        let value = params.get(name).ok_or_else(|| TransportError::InvalidUrl {
            message: format!("missing path parameter '{name}'"),
        })?;
        out.push_str(&rest[..open]);
        out.push_str(value);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[async_trait]
impl AuthTransport for HttpTransport {
    async fn request_token(
        &self,
        token_path: &str,
        form: Vec<(String, String)>,
    ) -> Result<TokenResponse, TransportError> {
        let request = TransportRequest::new(Method::POST, token_path).body(RequestBody::Form(form));
        self.send(&request).await?.error_for_status()?.json()
    }

    async fn list_clients(
        &self,
        clients_path: &str,
        access_token: &Secret,
        client_id: &str,
    ) -> Result<Vec<NativeValue>, TransportError> {
        let query = Params::from([("clientId".to_string(), client_id.to_string())]);
        let request = TransportRequest::new(Method::GET, clients_path)
            .query(query)
            .bearer(access_token.clone());
        let clients: Option<Vec<NativeValue>> = self.send(&request).await?.error_for_status()?.json()?;
        Ok(clients.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header, method, path, query_param},
    };

    fn transport(base: &str, retries: u32) -> HttpTransport {
        let mut settings = TransportSettings::new(Url::parse(base).unwrap());
        settings.retries = retries;
        settings.retry_interval = Duration::from_millis(10);
        HttpTransport::new(settings).unwrap()
    }

    #[test]
    fn test_resolve_url_substitutes_placeholders() {
        let transport = transport("https://eda.example.com/", 0);
        let params = Params::from([
            ("namespace".to_string(), "eda".to_string()),
            ("name".to_string(), "vc 1".to_string()),
        ]);
        let url = transport
            .resolve_url("/apps/v1/namespaces/{namespace}/instances/{name}", &params)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://eda.example.com/apps/v1/namespaces/eda/instances/vc%201"
        );
    }

    #[test]
    fn test_resolve_url_keeps_base_path() {
        let transport = transport("https://eda.example.com/prefix", 0);
        let url = transport.resolve_url("/core/x", &Params::new()).unwrap();
        assert_eq!(url.as_str(), "https://eda.example.com/prefix/core/x");
    }

    #[test]
    fn test_resolve_url_missing_parameter() {
        let transport = transport("https://eda.example.com", 0);
        let err = transport
            .resolve_url("/namespaces/{namespace}", &Params::new())
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }

    #[test]
    fn test_substitute_mixed_segment() {
        let params = Params::from([("v".to_string(), "2".to_string())]);
        assert_eq!(substitute("v{v}beta", &params).unwrap(), "v2beta");
        assert_eq!(substitute("plain", &params).unwrap(), "plain");
    }

    #[tokio::test]
    async fn test_request_token_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/realms/eda/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "refresh_token": "ref",
                "token_type": "Bearer",
                "scope": "openid",
                "expires_in": 300
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server.uri(), 0);
        let form = vec![
            ("grant_type".to_string(), "password".to_string()),
            ("username".to_string(), "admin".to_string()),
        ];
        let token = transport.request_token("/realms/eda/token", form).await.unwrap();
        assert_eq!(token.access_token.expose(), "tok");
        assert_eq!(token.expires_in, 300.0);
    }

    #[tokio::test]
    async fn test_request_token_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = transport(&server.uri(), 0)
            .request_token("/token", Vec::new())
            .await
            .unwrap_err();
        match err {
            TransportError::Status { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_clients_sends_bearer_and_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/realms/eda/clients"))
            .and(query_param("clientId", "eda"))
            .and(header("authorization", "Bearer admin-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"clientId": "eda", "secret": "s3"}])),
            )
            .mount(&server)
            .await;

        let clients = transport(&server.uri(), 0)
            .list_clients("/admin/realms/eda/clients", &Secret::new("admin-token"), "eda")
            .await
            .unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0]["secret"], "s3");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let response = transport(&server.uri(), 2)
            .send(&TransportRequest::new(Method::GET, "/health"))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let response = transport(&server.uri(), 3)
            .send(&TransportRequest::new(Method::GET, "/missing"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }
}
