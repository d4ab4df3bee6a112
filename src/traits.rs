use std::future::Future;

use crate::error::RemoteError;
use crate::types::{LoginResponse, Principal, Token};

/// The portal REST backend, as far as sessions are concerned.
///
/// [`AuthClient`](crate::AuthClient) is the HTTP implementation; tests and
/// embedders may supply their own.
///
/// # Example
///
/// ```rust,ignore
/// impl AuthBackend for StubBackend {
///     async fn sign_in(&self, email: &str, _password: &str) -> Result<LoginResponse, RemoteError> {
///         Ok(LoginResponse::new("stub-token", Principal::new("admin").with_email(email)))
///     }
///
///     async fn current_principal(&self, _token: &Token) -> Result<Principal, RemoteError> {
///         Ok(Principal::new("admin"))
///     }
/// }
/// ```
pub trait AuthBackend: Send + Sync + 'static {
    /// Exchange email and password for a credential (`POST /auth/login`).
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<LoginResponse, RemoteError>> + Send;

    /// Verify a token server-side and return its principal (`GET /auth/me`).
    fn current_principal(
        &self,
        token: &Token,
    ) -> impl Future<Output = Result<Principal, RemoteError>> + Send;
}

/// User-visible session notice (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Notice {
    /// Authenticated, but the role does not satisfy the requirement.
    AccessDenied,
    /// The backend rejected the credential (or could not be reached under
    /// the default fail-closed policy).
    SessionExpired,
    /// The backend could not be reached; the credential was kept.
    BackendUnavailable,
    /// The session will reach its maximum age in `remaining_secs`.
    ExpiryWarning { remaining_secs: u64 },
    /// The session reached its maximum age and was ended locally.
    SessionTimedOut,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied => f.write_str("Access denied"),
            Self::SessionExpired => f.write_str("Session expired. Please log in again"),
            Self::BackendUnavailable => f.write_str("Unable to reach the server. Please try again"),
            Self::ExpiryWarning { remaining_secs } => {
                let minutes = remaining_secs / 60;
                let seconds = remaining_secs % 60;
                write!(f, "Your session will expire in {minutes}:{seconds:02}")
            }
            Self::SessionTimedOut => f.write_str("Your session has timed out. Please log in again"),
        }
    }
}

/// Surfaces notices to the user.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notice: &Notice);
}

/// Moves the host application to another route.
pub trait Navigator: Send + Sync + 'static {
    fn redirect(&self, path: &str);
}

/// Notifier that only logs, for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::ExpiryWarning { remaining_secs } => {
                tracing::info!(remaining_secs, notice = %notice, "Session notice");
            }
            _ => tracing::warn!(notice = %notice, "Session notice"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_messages() {
        assert_eq!(Notice::AccessDenied.to_string(), "Access denied");
        assert_eq!(
            Notice::ExpiryWarning { remaining_secs: 1800 }.to_string(),
            "Your session will expire in 30:00"
        );
        assert_eq!(
            Notice::ExpiryWarning { remaining_secs: 65 }.to_string(),
            "Your session will expire in 1:05"
        );
    }
}
