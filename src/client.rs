use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{Error, RemoteError};
use crate::traits::AuthBackend;
use crate::types::{LoginRequest, LoginResponse, MeResponse, Principal, Token};

/// HTTP client for the portal's auth endpoints.
#[derive(Debug, Clone)]
pub struct AuthClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl AuthClient {
    /// Create a client whose requests time out after the configured duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the TLS backend cannot be initialised.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    ///
    /// The supplied client's own timeout settings apply.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// `POST /auth/login`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Rejected`] for a non-2xx answer, or a transport
    /// error if the backend cannot be reached.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, RemoteError> {
        let url = self.config.login_url().map_err(config_error)?;
        let response = self
            .http
            .post(url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(transport_error)?;

        let response = Self::ensure_success(response, "login").await?;
        Self::decode(response).await
    }

    /// `GET /auth/me` with the bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Rejected`] if the backend refuses the token, or a
    /// transport error if the backend cannot be reached.
    pub async fn me(&self, token: &Token) -> Result<Principal, RemoteError> {
        let url = self.config.me_url().map_err(config_error)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(transport_error)?;

        let response = Self::ensure_success(response, "session check").await?;
        Self::decode::<MeResponse>(response).await.map(|me| me.user)
    }

    /// Checks HTTP response status; returns the response on success or a rejection.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, RemoteError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(operation, status, detail = %body, "Backend rejected request");
        Err(RemoteError::Rejected { status })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else {
                RemoteError::Decode(e.to_string())
            }
        })
    }
}

impl AuthBackend for AuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<LoginResponse, RemoteError> {
        self.login(email, password).await
    }

    async fn current_principal(&self, token: &Token) -> Result<Principal, RemoteError> {
        self.me(token).await
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(Box::new(e))
    }
}

fn config_error(e: Error) -> RemoteError {
    RemoteError::Endpoint(e.to_string())
}
