use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::AuthClient;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::traits::{AuthBackend, Notice};
use crate::types::Credential;
use crate::validator::SessionValidator;

/// Admin resource collections served by the portal backend.
pub mod resources {
    pub const SERVICES: &str = "services";
    pub const CONSULTATIONS: &str = "consultations";
    pub const REFUNDS: &str = "refunds";
    pub const PAYMENTS: &str = "payments";

    /// Path of one item in a collection, e.g. `refunds/r%2F12`.
    #[must_use]
    pub fn item(collection: &str, id: &str) -> String {
        format!("{collection}/{}", urlencoding::encode(id))
    }
}

/// Bearer-authenticated client for the admin resources.
///
/// A response that rejects the credential ends the session through
/// [`SessionValidator::reject_session`], so the next guarded view redirects
/// without another round trip.
pub struct ApiClient<B> {
    http: reqwest::Client,
    config: ClientConfig,
    validator: SessionValidator<B>,
}

impl<B> Clone for ApiClient<B> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            validator: self.validator.clone(),
        }
    }
}

impl<B: AuthBackend> ApiClient<B> {
    /// Share the connection pool and base URL of `auth`.
    #[must_use]
    pub fn new(auth: &AuthClient, validator: SessionValidator<B>) -> Self {
        Self {
            http: auth.http().clone(),
            config: auth.config().clone(),
            validator,
        }
    }

    /// `GET {base}/{path}`.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(Method::GET, path, None::<&()>).await?;
        Ok(response.json().await?)
    }

    /// Send `body` as JSON with `method` and decode the JSON answer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NoCredential`] when logged out,
    /// [`ApiError::Unauthorized`] when the backend refuses the credential,
    /// [`ApiError::Status`] for other non-2xx answers and [`ApiError::Http`]
    /// for transport or decode failures.
    pub async fn send_json<Req, T>(
        &self,
        method: Method,
        path: &str,
        body: &Req,
    ) -> Result<T, ApiError>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(method, path, Some(body)).await?;
        Ok(response.json().await?)
    }

    /// `DELETE {base}/{path}`, ignoring any response body.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(Method::DELETE, path, None::<&()>).await?;
        Ok(())
    }

    async fn execute<Req: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Req>,
    ) -> Result<reqwest::Response, ApiError> {
        let Some(credential) = self.validator.credential() else {
            tracing::debug!(path, "No credential, request not sent");
            return Err(ApiError::NoCredential);
        };
        let url = self
            .config
            .endpoint(path)
            .map_err(|e| ApiError::Endpoint(e.to_string()))?;

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(credential.token.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        self.check_status(response, &credential, path).await
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        credential: &Credential,
        path: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if self.ends_session(status) {
            tracing::warn!(path, status = status.as_u16(), "Credential refused by resource");
            self.validator
                .reject_session(&credential.token, &Notice::SessionExpired);
            return Err(ApiError::Unauthorized {
                status: status.as_u16(),
            });
        }
        let detail = response.text().await.unwrap_or_default();
        tracing::warn!(path, status = status.as_u16(), detail = %detail, "Resource request failed");
        Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        })
    }

    fn ends_session(&self, status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED
            || (status == StatusCode::FORBIDDEN && self.validator.config().forbidden_ends_session())
    }
}
