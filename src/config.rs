use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::types::Role;

/// What the validator does when `/auth/me` cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportFailurePolicy {
    /// Fail closed: clear the credential and cache the failure, exactly as
    /// for a rejected token.
    #[default]
    Logout,
    /// Deny this check but keep the credential and cache nothing, so the
    /// next navigation retries.
    KeepCredential,
}

/// Absolute session lifetime and the cadence of the expiry monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub max_age: Duration,
    /// How long before `max_age` the warning is raised.
    pub warning_lead: Duration,
    pub check_interval: Duration,
    pub countdown_tick: Duration,
    /// Delay between monitor start and its first check.
    pub grace_delay: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 60 * 60),
            warning_lead: Duration::from_secs(60 * 60),
            check_interval: Duration::from_secs(5 * 60),
            countdown_tick: Duration::from_secs(1),
            grace_delay: Duration::from_secs(5),
        }
    }
}

impl ExpiryPolicy {
    /// Token age at which the warning starts.
    #[must_use]
    pub fn warning_threshold(&self) -> Duration {
        self.max_age.saturating_sub(self.warning_lead)
    }
}

/// Endpoints and transport settings for the portal REST backend.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) api_base_url: Url,
    pub(crate) login_path: String,
    pub(crate) me_path: String,
    pub(crate) timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            login_path: "auth/login".into(),
            me_path: "auth/me".into(),
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_me_path(mut self, path: impl Into<String>) -> Self {
        self.me_path = path.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve a backend path against the base URL.
    ///
    /// A base without a trailing slash is treated as a directory, so
    /// `https://api.example.com/v1` + `auth/me` is `.../v1/auth/me`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut base = self.api_base_url.clone();
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("endpoint {path}: {e}")))
    }

    pub(crate) fn login_url(&self) -> Result<Url, Error> {
        self.endpoint(&self.login_path)
    }

    pub(crate) fn me_url(&self) -> Result<Url, Error> {
        self.endpoint(&self.me_path)
    }
}

/// Session layer configuration.
///
/// The backend URL is the only required value. Everything else has a
/// default and a `with_*` override.
///
/// ```rust,ignore
/// let config = SessionConfig::new("https://api.example.com".parse()?)
///     .with_cache_duration(Duration::from_secs(60))
///     .with_entry_point("/signin");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    pub(crate) client: ClientConfig,
    pub(crate) cache_duration: Duration,
    pub(crate) expiry: ExpiryPolicy,
    pub(crate) entry_point: String,
    pub(crate) admin_role: Role,
    pub(crate) transport_failure: TransportFailurePolicy,
    pub(crate) forbidden_ends_session: bool,
}

impl SessionConfig {
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self::with_client(ClientConfig::new(api_base_url))
    }

    #[must_use]
    pub fn with_client(client: ClientConfig) -> Self {
        Self {
            client,
            cache_duration: Duration::from_secs(5 * 60),
            expiry: ExpiryPolicy::default(),
            entry_point: "/login".into(),
            admin_role: Role::from("admin"),
            transport_failure: TransportFailurePolicy::default(),
            forbidden_ends_session: true,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `PORTAL_API_URL`: base URL of the portal REST backend
    ///
    /// # Optional env vars
    /// - `PORTAL_CACHE_TTL_SECS`: validation cache window
    /// - `PORTAL_SESSION_MAX_AGE_SECS`: absolute session lifetime
    /// - `PORTAL_SESSION_WARNING_SECS`: warning lead before expiry
    /// - `PORTAL_EXPIRY_CHECK_SECS`: expiry monitor interval
    /// - `PORTAL_EXPIRY_GRACE_SECS`: delay before the first expiry check
    /// - `PORTAL_HTTP_TIMEOUT_SECS`: backend request timeout
    /// - `PORTAL_ENTRY_POINT`: public route used for redirects
    /// - `PORTAL_ADMIN_ROLE`: role name that satisfies admin requirements
    /// - `PORTAL_TRANSPORT_FAILURE`: `logout` or `keep`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required values are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = lookup("PORTAL_API_URL")
            .ok_or_else(|| Error::Config("PORTAL_API_URL is required".into()))?;
        let base: Url = base
            .parse()
            .map_err(|e| Error::Config(format!("PORTAL_API_URL: {e}")))?;

        let mut client = ClientConfig::new(base);
        if let Some(timeout) = secs(&lookup, "PORTAL_HTTP_TIMEOUT_SECS")? {
            client = client.with_timeout(timeout);
        }

        let mut config = Self::with_client(client);
        if let Some(ttl) = secs(&lookup, "PORTAL_CACHE_TTL_SECS")? {
            config = config.with_cache_duration(ttl);
        }

        let mut expiry = ExpiryPolicy::default();
        if let Some(max_age) = secs(&lookup, "PORTAL_SESSION_MAX_AGE_SECS")? {
            expiry.max_age = max_age;
        }
        if let Some(lead) = secs(&lookup, "PORTAL_SESSION_WARNING_SECS")? {
            expiry.warning_lead = lead;
        }
        if let Some(interval) = secs(&lookup, "PORTAL_EXPIRY_CHECK_SECS")? {
            expiry.check_interval = interval;
        }
        if let Some(grace) = secs(&lookup, "PORTAL_EXPIRY_GRACE_SECS")? {
            expiry.grace_delay = grace;
        }
        if expiry.warning_lead > expiry.max_age {
            return Err(Error::Config(
                "PORTAL_SESSION_WARNING_SECS must not exceed PORTAL_SESSION_MAX_AGE_SECS".into(),
            ));
        }
        config = config.with_expiry(expiry);

        if let Some(entry) = lookup("PORTAL_ENTRY_POINT") {
            config = config.with_entry_point(entry);
        }
        if let Some(role) = lookup("PORTAL_ADMIN_ROLE") {
            config = config.with_admin_role(role.trim());
        }
        if let Some(policy) = lookup("PORTAL_TRANSPORT_FAILURE") {
            let policy = match policy.trim().to_ascii_lowercase().as_str() {
                "logout" => TransportFailurePolicy::Logout,
                "keep" => TransportFailurePolicy::KeepCredential,
                other => {
                    return Err(Error::Config(format!(
                        "PORTAL_TRANSPORT_FAILURE: expected 'logout' or 'keep', got '{other}'"
                    )));
                }
            };
            config = config.with_transport_failure(policy);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: ExpiryPolicy) -> Self {
        self.expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_entry_point(mut self, path: impl Into<String>) -> Self {
        self.entry_point = path.into();
        self
    }

    #[must_use]
    pub fn with_admin_role(mut self, role: impl Into<Role>) -> Self {
        self.admin_role = role.into();
        self
    }

    #[must_use]
    pub fn with_transport_failure(mut self, policy: TransportFailurePolicy) -> Self {
        self.transport_failure = policy;
        self
    }

    /// Whether a 403 from an admin resource ends the session like a 401.
    #[must_use]
    pub fn with_forbidden_ends_session(mut self, enabled: bool) -> Self {
        self.forbidden_ends_session = enabled;
        self
    }

    #[must_use]
    pub fn client(&self) -> &ClientConfig {
        &self.client
    }

    #[must_use]
    pub fn cache_duration(&self) -> Duration {
        self.cache_duration
    }

    #[must_use]
    pub fn expiry(&self) -> &ExpiryPolicy {
        &self.expiry
    }

    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    #[must_use]
    pub fn admin_role(&self) -> &Role {
        &self.admin_role
    }

    #[must_use]
    pub fn transport_failure(&self) -> TransportFailurePolicy {
        self.transport_failure
    }

    #[must_use]
    pub fn forbidden_ends_session(&self) -> bool {
        self.forbidden_ends_session
    }
}

fn secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>, Error>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        })
        .transpose()
}
