//! OAuth2 bearer credentials for the backend API.
//!
//! A [`CredentialStore`] holds two (credential, grant) pairs:
//!
//! - [`GrantKind::Primary`] authenticates calls to the backend API.
//! - [`GrantKind::Secondary`] is an administrative identity-provider account,
//!   used only to look up the primary client's secret when it is not
//!   configured (see [`CredentialStore::resolve_client_secret`]).
//!
//! # Grant lifecycle
//!
//! ```text
//! Unauthenticated --login(password)--> Valid --lifetime elapses--> Expired
//!                                        ^                            |
//!                                        +--login(refresh|password)---+
//! ```
//!
//! A login makes up to [`LOGIN_ATTEMPTS`] attempts, sleeping `1s * 2^n` after
//! failed attempt `n` (no sleep after the last one).
//!
//! # Locking
//!
//! Both grants sit behind a single [`tokio::sync::Mutex`]. It is held for the
//! whole validity check, login and grant update, backoff sleeps included, so
//! a failing identity provider is never hit by two logins at once. Callers for
//! either grant queue behind an in-flight login; there is no way to cancel it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::secret::Secret;
use crate::transport::TransportError;
use crate::value::NativeValue;

/// Maximum number of token requests made by one login.
pub const LOGIN_ATTEMPTS: u32 = 5;

/// Delay after the first failed attempt; doubled after each further failure.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Identity-provider proxy prefix on the backend.
pub const KEYCLOAK_PATH: &str = "/core/httpproxy/v1/keycloak";

/// Token endpoint path for a realm.
pub fn token_path(realm: &str) -> String {
    format!("{KEYCLOAK_PATH}/realms/{realm}/protocol/openid-connect/token")
}

/// Administrative client listing path for a realm.
pub fn clients_path(realm: &str) -> String {
    format!("{KEYCLOAK_PATH}/admin/realms/{realm}/clients")
}

/// Error type for credential operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Every login attempt failed.
    #[error("login failed after {attempts} attempts: {last_error}")]
    LoginFailed { attempts: u32, last_error: String },

    /// The token endpoint answered successfully but without an access token.
    #[error("token endpoint returned an empty access token")]
    EmptyToken,

    /// The token lifetime is negative, not a number or too large.
    #[error("token endpoint returned an invalid lifetime: {expires_in}")]
    InvalidLifetime { expires_in: f64 },

    /// The client listing had no entry for the client.
    #[error("client not found: {client_id}")]
    SecretNotFound { client_id: String },

    /// The client entry has no usable `secret` field.
    #[error("client secret not found for client: {client_id}")]
    SecretFieldMissing { client_id: String },

    /// The client listing matched more than one client.
    #[error("{count} clients match client id {client_id}")]
    AmbiguousClient { client_id: String, count: usize },

    /// The client listing could not be fetched.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Which of the two credential pairs to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantKind {
    Primary,
    Secondary,
}

impl std::fmt::Display for GrantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// Login material for one OAuth2 client.
#[derive(Debug, Clone)]
pub struct ClientCredential {
    /// Token endpoint, relative to the transport's base URL.
    pub auth_url: String,
    pub client_id: String,
    /// Empty for public clients.
    pub client_secret: Secret,
    pub username: String,
    pub password: Secret,
}

impl ClientCredential {
    /// Form body for a token request.
    ///
    /// With a refresh token this is a `refresh_token` grant, otherwise a
    /// `password` grant.
    fn form(&self, refresh_token: Option<&Secret>) -> Vec<(String, String)> {
        let mut form = vec![("client_id".to_string(), self.client_id.clone())];
        if !self.client_secret.is_empty() {
            form.push((
                "client_secret".to_string(),
                self.client_secret.expose().to_string(),
            ));
        }
        match refresh_token {
            Some(token) => {
                form.push(("grant_type".to_string(), "refresh_token".to_string()));
                form.push(("refresh_token".to_string(), token.expose().to_string()));
            }
            None => {
                form.push(("grant_type".to_string(), "password".to_string()));
                form.push(("username".to_string(), self.username.clone()));
                form.push(("password".to_string(), self.password.expose().to_string()));
            }
        }
        form
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Secret,
    #[serde(default)]
    pub refresh_token: Option<Secret>,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    /// Lifetime in seconds; `0` means the token does not expire.
    #[serde(default)]
    pub expires_in: f64,
}

/// Validity of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    /// No login has succeeded yet.
    Unauthenticated,
    /// The cached access token can be used.
    Valid,
    /// The lifetime has elapsed.
    Expired,
}

/// Cached token material of one credential.
#[derive(Debug, Clone, Default)]
pub struct Grant {
    access_token: Secret,
    refresh_token: Secret,
    scope: String,
    token_type: String,
    expires_in: Duration,
    issued_at: Option<Instant>,
    issued_wall: Option<DateTime<Utc>>,
}

impl Grant {
    pub fn state(&self) -> GrantState {
        match self.issued_at {
            None => GrantState::Unauthenticated,
            Some(_) if self.access_token.is_empty() => GrantState::Unauthenticated,
            Some(issued) => {
                if !self.expires_in.is_zero() && issued.elapsed() >= self.expires_in {
                    GrantState::Expired
                } else {
                    GrantState::Valid
                }
            }
        }
    }

    /// Overwrite the grant from a successful token response.
    fn record(&mut self, response: TokenResponse, lifetime: Duration) {
        self.access_token = response.access_token;
        if let Some(refresh) = response.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = refresh;
        }
        self.scope = response.scope;
        self.token_type = response.token_type;
        self.expires_in = lifetime;
        self.issued_at = Some(Instant::now());
        self.issued_wall = Some(Utc::now());
    }

    fn info(&self, kind: GrantKind) -> TokenInfo {
        let expires_at = match (self.issued_wall, self.expires_in.is_zero()) {
            (Some(issued), false) => chrono::Duration::from_std(self.expires_in)
                .ok()
                .map(|lifetime| issued + lifetime),
            _ => None,
        };
        TokenInfo {
            kind,
            state: self.state(),
            token_type: self.token_type.clone(),
            scope: self.scope.clone(),
            has_refresh_token: !self.refresh_token.is_empty(),
            issued_at: self.issued_wall,
            expires_at,
        }
    }
}

/// Status of a grant, without any token material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenInfo {
    pub kind: GrantKind,
    pub state: GrantState,
    pub token_type: String,
    pub scope: String,
    pub has_refresh_token: bool,
    pub issued_at: Option<DateTime<Utc>>,
    /// `None` when not logged in or the token does not expire.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Network access needed by the credential store.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// POST a form to a token endpoint and decode the 2xx response.
    async fn request_token(
        &self,
        token_path: &str,
        form: Vec<(String, String)>,
    ) -> Result<TokenResponse, TransportError>;

    /// Fetch the administrative client listing filtered by `client_id`.
    async fn list_clients(
        &self,
        clients_path: &str,
        access_token: &Secret,
        client_id: &str,
    ) -> Result<Vec<NativeValue>, TransportError>;
}

#[derive(Debug)]
struct Pair {
    credential: ClientCredential,
    grant: Grant,
}

#[derive(Debug)]
struct Pairs {
    primary: Pair,
    secondary: Pair,
}

impl Pairs {
    fn get_mut(&mut self, kind: GrantKind) -> &mut Pair {
        match kind {
            GrantKind::Primary => &mut self.primary,
            GrantKind::Secondary => &mut self.secondary,
        }
    }

    fn get(&self, kind: GrantKind) -> &Pair {
        match kind {
            GrantKind::Primary => &self.primary,
            GrantKind::Secondary => &self.secondary,
        }
    }
}

/// Thread-safe cache of the primary and secondary grants.
pub struct CredentialStore<T> {
    transport: Arc<T>,
    clients_path: String,
    pairs: Mutex<Pairs>,
}

impl<T: AuthTransport> CredentialStore<T> {
    /// Create a store with both grants unauthenticated.
    ///
    /// `clients_path` is the administrative listing queried by
    /// [`resolve_client_secret`](Self::resolve_client_secret).
    pub fn new(
        transport: Arc<T>,
        primary: ClientCredential,
        secondary: ClientCredential,
        clients_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            clients_path: clients_path.into(),
            pairs: Mutex::new(Pairs {
                primary: Pair {
                    credential: primary,
                    grant: Grant::default(),
                },
                secondary: Pair {
                    credential: secondary,
                    grant: Grant::default(),
                },
            }),
        }
    }

    /// Build a store from client configuration.
    ///
    /// When no primary client secret is configured it is resolved through
    /// the secondary credential before the store is returned.
    pub async fn connect(config: &ClientConfig, transport: Arc<T>) -> Result<Self, CredentialError> {
        let primary = ClientCredential {
            auth_url: token_path(&config.realm),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        };
        let secondary = ClientCredential {
            auth_url: token_path(&config.keycloak_master_realm),
            client_id: config.keycloak_admin_client_id.clone(),
            client_secret: Secret::default(),
            username: config.keycloak_admin_username.clone(),
            password: config.keycloak_admin_password.clone(),
        };
        let store = Self::new(transport, primary, secondary, clients_path(&config.realm));

        if config.client_secret.is_empty() {
            tracing::info!(client_id = %config.client_id, "no client secret configured, resolving it");
            let secret = store.resolve_client_secret(&config.client_id).await?;
            store.set_client_secret(GrantKind::Primary, secret).await;
        }
        Ok(store)
    }

    /// Replace the client secret of one credential.
    pub async fn set_client_secret(&self, kind: GrantKind, secret: Secret) {
        let mut pairs = self.pairs.lock().await;
        pairs.get_mut(kind).credential.client_secret = secret;
    }

    /// Return a usable access token, logging in first when needed.
    ///
    /// A valid cached token is returned without any network access.
    pub async fn get_access_token(&self, kind: GrantKind) -> Result<Secret, CredentialError> {
        let mut pairs = self.pairs.lock().await;
        let pair = pairs.get_mut(kind);

        let state = pair.grant.state();
        tracing::debug!(
            grant = %kind,
            auth_url = %pair.credential.auth_url,
            ?state,
            "checking grant"
        );
        if state == GrantState::Valid {
            return Ok(pair.grant.access_token.clone());
        }

        let use_refresh = state == GrantState::Expired && !pair.grant.refresh_token.is_empty();
        self.login(kind, pair, use_refresh).await?;
        Ok(pair.grant.access_token.clone())
    }

    /// Status of a grant, without network access.
    pub async fn token_info(&self, kind: GrantKind) -> TokenInfo {
        let pairs = self.pairs.lock().await;
        pairs.get(kind).grant.info(kind)
    }

    /// Look up a client's secret through the secondary credential.
    ///
    /// The listing must contain exactly one entry for `client_id`, and that
    /// entry must carry a string `secret` field.
    pub async fn resolve_client_secret(&self, client_id: &str) -> Result<Secret, CredentialError> {
        let token = self.get_access_token(GrantKind::Secondary).await?;
        let clients = self
            .transport
            .list_clients(&self.clients_path, &token, client_id)
            .await?;
        tracing::debug!(client_id, matches = clients.len(), "client listing received");

        let client = match clients.as_slice() {
            [] => {
                return Err(CredentialError::SecretNotFound {
                    client_id: client_id.to_string(),
                });
            }
            [client] => client,
            _ => {
                return Err(CredentialError::AmbiguousClient {
                    client_id: client_id.to_string(),
                    count: clients.len(),
                });
            }
        };

        match client.get("secret").and_then(NativeValue::as_str) {
            Some(secret) => Ok(Secret::new(secret)),
            None => Err(CredentialError::SecretFieldMissing {
                client_id: client_id.to_string(),
            }),
        }
    }

    /// Run the login attempt sequence for one pair. Called with the lock held.
    ///
    /// A failed refresh falls back to the password grant for the remaining
    /// attempts.
    async fn login(
        &self,
        kind: GrantKind,
        pair: &mut Pair,
        mut use_refresh: bool,
    ) -> Result<(), CredentialError> {
        let mut last_error = String::new();

        for attempt in 0..LOGIN_ATTEMPTS {
            let refresh = use_refresh.then_some(&pair.grant.refresh_token);
            let grant_type = if refresh.is_some() { "refresh_token" } else { "password" };
            tracing::debug!(grant = %kind, attempt, grant_type, "requesting token");

            let form = pair.credential.form(refresh);
            match self
                .transport
                .request_token(&pair.credential.auth_url, form)
                .await
            {
                Ok(response) if response.access_token.is_empty() => {
                    last_error = CredentialError::EmptyToken.to_string();
                }
                Ok(response) => match Duration::try_from_secs_f64(response.expires_in) {
                    Ok(lifetime) => {
                        pair.grant.record(response, lifetime);
                        tracing::info!(
                            grant = %kind,
                            attempt,
                            grant_type,
                            expires_in_secs = pair.grant.expires_in.as_secs(),
                            "login succeeded"
                        );
                        return Ok(());
                    }
                    Err(_) => {
                        last_error = CredentialError::InvalidLifetime {
                            expires_in: response.expires_in,
                        }
                        .to_string();
                    }
                },
                Err(e) => last_error = e.to_string(),
            }

            tracing::warn!(grant = %kind, attempt, grant_type, error = %last_error, "login attempt failed");
            use_refresh = false;
            if attempt + 1 < LOGIN_ATTEMPTS {
                tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt)).await;
            }
        }

        tracing::error!(grant = %kind, attempts = LOGIN_ATTEMPTS, "login failed");
        Err(CredentialError::LoginFailed {
            attempts: LOGIN_ATTEMPTS,
            last_error,
        })
    }
}

impl<T> std::fmt::Debug for CredentialStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("clients_path", &self.clients_path)
            .finish_non_exhaustive()
    }
}
