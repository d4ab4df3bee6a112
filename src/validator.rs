//! Single-flight, time-cached session validation.
//!
//! The validator answers "is the stored credential authorized for this
//! requirement" with at most one `/auth/me` call outstanding at a time.
//! Concurrent callers attach to the pending check and observe its outcome.
//!
//! Every write to the credential goes through [`SessionValidator`] so the
//! cache never outlives the credential it describes. Each `clear()` advances
//! a session epoch; a check that completes under an older epoch still answers
//! its own waiters but leaves the cache and the store alone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::clock::{Clock, SystemClock, duration_ms};
use crate::config::{SessionConfig, TransportFailurePolicy};
use crate::error::StoreError;
use crate::store::TokenStore;
use crate::traits::{AuthBackend, Notice, Notifier, TracingNotifier};
use crate::types::{Credential, Role, Token, ValidationResult};

/// Result of one remote check, shared with every waiter.
#[derive(Debug, Clone)]
enum CheckOutcome {
    Authorized(Role),
    Denied,
}

type Pending = watch::Receiver<Option<CheckOutcome>>;

enum Slot {
    Absent,
    Fresh(ValidationResult),
    InFlight(Pending),
}

struct CacheState {
    epoch: u64,
    slot: Slot,
    /// Latest result timestamp written in this epoch.
    last_written_ms: u64,
}

enum Step {
    Hit(CheckOutcome),
    Join(Pending),
}

struct Inner<B> {
    backend: B,
    store: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    cache: Mutex<CacheState>,
}

/// Session validation service.
///
/// Cheap to clone; clones share one cache. Construct it once and hand it to
/// every guard, monitor and client that needs session checks.
pub struct SessionValidator<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for SessionValidator<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`SessionValidator`].
pub struct ValidatorBuilder<B> {
    backend: B,
    store: Arc<dyn TokenStore>,
    config: SessionConfig,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl<B: AuthBackend> ValidatorBuilder<B> {
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionValidator<B> {
        SessionValidator {
            inner: Arc::new(Inner {
                backend: self.backend,
                store: self.store,
                notifier: self.notifier,
                clock: self.clock,
                config: self.config,
                cache: Mutex::new(CacheState {
                    epoch: 0,
                    slot: Slot::Absent,
                    last_written_ms: 0,
                }),
            }),
        }
    }
}

impl<B: AuthBackend> SessionValidator<B> {
    /// Start building a validator. Notices default to [`TracingNotifier`],
    /// time to [`SystemClock`].
    #[must_use]
    pub fn builder(
        backend: B,
        store: Arc<dyn TokenStore>,
        config: SessionConfig,
    ) -> ValidatorBuilder<B> {
        ValidatorBuilder {
            backend,
            store,
            config,
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    /// Whether the stored session satisfies the requirement.
    ///
    /// Returns `false` without any network traffic when no credential is
    /// stored. A fresh cached result is answered immediately. Otherwise the
    /// call joins the in-flight check or starts one. Remote failures never
    /// escape: they clear the credential, emit a [`Notice`] and yield
    /// `false`.
    pub async fn validate(&self, require_admin: bool) -> bool {
        // The credential is read under the cache lock: every writer holds it,
        // so the token and the epoch always belong to the same session.
        let (credential, epoch, step, leader) = {
            let mut cache = self.inner.lock();
            let Some(credential) = self.inner.store.load() else {
                tracing::debug!("No stored credential");
                return false;
            };
            let epoch = cache.epoch;
            let existing = match &cache.slot {
                Slot::Fresh(result) if self.inner.is_fresh(result) => {
                    Some(Step::Hit(outcome_of(result)))
                }
                Slot::InFlight(pending) => Some(Step::Join(pending.clone())),
                Slot::Absent | Slot::Fresh(_) => None,
            };
            match existing {
                Some(step) => (credential, epoch, step, None),
                None => {
                    let (tx, rx) = watch::channel(None);
                    cache.slot = Slot::InFlight(rx.clone());
                    (credential, epoch, Step::Join(rx), Some(tx))
                }
            }
        };

        let outcome = match step {
            Step::Hit(outcome) => {
                tracing::debug!("Session validation cache hit");
                outcome
            }
            Step::Join(pending) => {
                match leader {
                    Some(tx) => self.spawn_check(epoch, credential.clone(), tx),
                    None => tracing::debug!("Joining in-flight session check"),
                }
                self.await_check(epoch, pending).await
            }
        };

        self.inner
            .apply_requirement(epoch, &credential, outcome, require_admin)
    }

    /// Forget the cached result and any in-flight marker.
    ///
    /// The credential itself is untouched. Call it whenever the credential
    /// changes; [`begin_session`](Self::begin_session) and
    /// [`end_session`](Self::end_session) already do.
    pub fn clear(&self) {
        let mut cache = self.inner.lock();
        reset(&mut cache);
    }

    /// Store a freshly issued credential, invalidating the cache in the same step.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the credential could not be persisted.
    pub fn begin_session(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut cache = self.inner.lock();
        reset(&mut cache);
        self.inner.store.save(credential)
    }

    /// Remove the credential and invalidate the cache (logout, expiry).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stored credential could not be removed.
    pub fn end_session(&self) -> Result<(), StoreError> {
        let mut cache = self.inner.lock();
        reset(&mut cache);
        self.inner.store.clear()
    }

    /// Like [`end_session`](Self::end_session), but only while the store
    /// still holds `token`. Returns `Ok(false)` if it was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stored credential could not be removed.
    pub fn end_session_for(&self, token: &Token) -> Result<bool, StoreError> {
        let mut cache = self.inner.lock();
        if self
            .inner
            .store
            .load()
            .is_none_or(|stored| stored.token != *token)
        {
            return Ok(false);
        }
        reset(&mut cache);
        self.inner.store.clear()?;
        Ok(true)
    }

    /// End the session because the backend refused `token` outside of a
    /// check (for example a 401 from a resource endpoint).
    ///
    /// Caches an invalid result, clears the credential and emits `notice`.
    /// Returns `false` and does nothing if the store no longer holds `token`.
    pub fn reject_session(&self, token: &Token, notice: &Notice) -> bool {
        {
            let mut cache = self.inner.lock();
            if self
                .inner
                .store
                .load()
                .is_none_or(|stored| stored.token != *token)
            {
                tracing::debug!("Ignoring rejection of a replaced credential");
                return false;
            }
            reset(&mut cache);
            let now = self.inner.clock.now_ms();
            self.inner.write_result(&mut cache, false, None, now);
            self.inner.clear_store();
        }
        tracing::warn!(notice = %notice, "Session rejected");
        self.inner.notifier.notify(notice);
        true
    }

    /// Last cached result, if any (ignores freshness).
    #[must_use]
    pub fn cached(&self) -> Option<ValidationResult> {
        match &self.inner.lock().slot {
            Slot::Fresh(result) => Some(result.clone()),
            Slot::Absent | Slot::InFlight(_) => None,
        }
    }

    #[must_use]
    pub fn is_check_in_flight(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::InFlight(_))
    }

    /// Stored credential, without contacting the backend.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.inner.store.load()
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }

    fn spawn_check(
        &self,
        epoch: u64,
        credential: Credential,
        tx: watch::Sender<Option<CheckOutcome>>,
    ) {
        tracing::debug!(epoch, "Starting session check");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.run_check(epoch, &credential).await;
            tx.send_replace(Some(outcome));
        });
    }

    async fn await_check(&self, epoch: u64, mut pending: Pending) -> CheckOutcome {
        let published = pending
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone());
        if let Ok(Some(outcome)) = published {
            return outcome;
        }

        tracing::error!(epoch, "Session check ended without a result");
        let mut cache = self.inner.lock();
        if cache.epoch == epoch && matches!(cache.slot, Slot::InFlight(_)) {
            cache.slot = Slot::Absent;
        }
        CheckOutcome::Denied
    }
}

impl<B: AuthBackend> Inner<B> {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, result: &ValidationResult) -> bool {
        let age = self.clock.now_ms().saturating_sub(result.timestamp_ms);
        age < duration_ms(self.config.cache_duration)
    }

    fn write_result(&self, cache: &mut CacheState, is_valid: bool, role: Option<Role>, now: u64) {
        let timestamp_ms = now.max(cache.last_written_ms);
        cache.last_written_ms = timestamp_ms;
        cache.slot = Slot::Fresh(ValidationResult {
            is_valid,
            timestamp_ms,
            role,
        });
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear stored credential");
        }
    }

    async fn run_check(&self, epoch: u64, credential: &Credential) -> CheckOutcome {
        match self.backend.current_principal(&credential.token).await {
            Ok(principal) => {
                let mut cache = self.lock();
                if cache.epoch == epoch {
                    let now = self.clock.now_ms();
                    self.write_result(&mut cache, true, Some(principal.role.clone()), now);
                }
                CheckOutcome::Authorized(principal.role)
            }
            Err(e)
                if e.is_transport()
                    && self.config.transport_failure == TransportFailurePolicy::KeepCredential =>
            {
                tracing::warn!(error = %e, "Session check unreachable; keeping credential");
                let stale = {
                    let mut cache = self.lock();
                    let current = cache.epoch == epoch;
                    if current {
                        cache.slot = Slot::Absent;
                    }
                    !current
                };
                if !stale {
                    self.notifier.notify(&Notice::BackendUnavailable);
                }
                CheckOutcome::Denied
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed");
                self.fail(epoch, credential, &Notice::SessionExpired);
                CheckOutcome::Denied
            }
        }
    }

    fn apply_requirement(
        &self,
        epoch: u64,
        credential: &Credential,
        outcome: CheckOutcome,
        require_admin: bool,
    ) -> bool {
        match outcome {
            CheckOutcome::Denied => false,
            CheckOutcome::Authorized(role) if !require_admin || role == self.config.admin_role => {
                true
            }
            CheckOutcome::Authorized(role) => {
                tracing::warn!(role = %role, "Admin role required");
                self.fail(epoch, credential, &Notice::AccessDenied);
                false
            }
        }
    }

    /// Fail-closed path: cache the failure, drop the credential, tell the user.
    ///
    /// No-op when the epoch has moved on, since the store may already hold a
    /// different session.
    fn fail(&self, epoch: u64, credential: &Credential, notice: &Notice) {
        {
            let mut cache = self.lock();
            if cache.epoch != epoch {
                tracing::debug!(epoch, "Ignoring failure from a previous session");
                return;
            }
            let now = self.clock.now_ms();
            self.write_result(&mut cache, false, None, now);
            if self
                .store
                .load()
                .is_some_and(|stored| stored.token == credential.token)
            {
                self.clear_store();
            }
        }
        self.notifier.notify(notice);
    }
}

fn reset(cache: &mut CacheState) {
    cache.epoch += 1;
    cache.slot = Slot::Absent;
    cache.last_written_ms = 0;
}

fn outcome_of(result: &ValidationResult) -> CheckOutcome {
    match (&result.role, result.is_valid) {
        (Some(role), true) => CheckOutcome::Authorized(role.clone()),
        _ => CheckOutcome::Denied,
    }
}
