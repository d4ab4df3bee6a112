use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Opaque bearer token issued by `POST /auth/login`.
///
/// `Debug` output is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Role string reported by the backend (`"admin"`, `"user"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Stored credential: the token and the moment it was issued.
///
/// The two fields live in one value, so a store can never hold a token
/// without its timestamp or the other way round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token: Token,
    /// Issuance time in epoch milliseconds.
    pub issued_at_ms: u64,
}

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<Token>, issued_at_ms: u64) -> Self {
        Self {
            token: token.into(),
            issued_at_ms,
        }
    }

    /// Milliseconds elapsed since issuance; zero if `now_ms` is in the past.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.issued_at_ms)
    }
}

/// Authenticated identity as reported by `GET /auth/me`.
///
/// Transient: used to decide role requirements, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Principal {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Principal {
    #[must_use]
    pub fn new(role: impl Into<Role>) -> Self {
        Self {
            id: None,
            role: role.into(),
            email: None,
            name: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response of `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct LoginResponse {
    pub token: Token,
    pub user: Principal,
}

impl LoginResponse {
    #[must_use]
    pub fn new(token: impl Into<Token>, user: Principal) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }
}

/// Response of `GET /auth/me`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MeResponse {
    pub(crate) user: Principal,
}

/// Outcome of the most recent remote check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// When the check completed, in epoch milliseconds.
    pub timestamp_ms: u64,
    /// Role returned by the check; `None` when it failed.
    pub role: Option<Role>,
}
