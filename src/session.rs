use crate::error::{Error, RemoteError};
use crate::traits::AuthBackend;
use crate::types::{Credential, Principal};
use crate::validator::SessionValidator;

/// Login and logout on top of a [`SessionValidator`].
pub struct SessionService<B> {
    validator: SessionValidator<B>,
}

impl<B> Clone for SessionService<B> {
    fn clone(&self) -> Self {
        Self {
            validator: self.validator.clone(),
        }
    }
}

impl<B: AuthBackend> SessionService<B> {
    #[must_use]
    pub fn new(validator: SessionValidator<B>) -> Self {
        Self { validator }
    }

    #[must_use]
    pub fn validator(&self) -> &SessionValidator<B> {
        &self.validator
    }

    /// Sign in and store the issued credential.
    ///
    /// Any previous validation result is discarded, so the first protected
    /// view after login always checks the new token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the backend refuses the credentials or
    /// cannot be reached, or [`Error::Store`] if the token cannot be stored.
    pub async fn login(&self, email: &str, password: &str) -> Result<Principal, Error> {
        let response = self
            .validator
            .backend()
            .sign_in(email, password)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Login failed");
                login_error(&e)
            })?;

        let credential = Credential::new(response.token, self.validator.clock().now_ms());
        self.validator.begin_session(&credential)?;

        tracing::info!(role = %response.user.role, "Login successful");
        Ok(response.user)
    }

    /// Drop the stored credential and any cached validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the credential cannot be removed.
    pub fn logout(&self) -> Result<(), Error> {
        self.validator.end_session()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Whether a credential is stored. Says nothing about its validity.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.validator.credential().is_some()
    }
}

fn login_error(e: &RemoteError) -> Error {
    let status = match e {
        RemoteError::Rejected { status } => Some(*status),
        _ => None,
    };
    Error::Remote {
        operation: "login",
        status,
        detail: e.to_string(),
    }
}
