//! Absolute session lifetime enforcement.
//!
//! The monitor polls the stored credential's age. Within `warning_lead` of
//! the maximum age it raises a warning and counts down once per
//! `countdown_tick`; at the maximum age it ends the session and redirects to
//! the entry point. The countdown is recomputed from the clock on every
//! tick, so a replaced credential drops the monitor back to polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ExpiryPolicy;
use crate::traits::{AuthBackend, Navigator, Notice};
use crate::types::Token;
use crate::validator::SessionValidator;

/// Observable monitor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    /// Waiting out the grace delay.
    Idle,
    Monitoring,
    /// Countdown to forced logout is running.
    Warning {
        remaining_secs: u64,
        /// The user dismissed the warning; expiry still happens on time.
        acknowledged: bool,
    },
    /// Terminal: the session was ended and the host redirected.
    Expired,
}

/// Classification of a token age under an [`ExpiryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Expiring { remaining_secs: u64 },
    Expired,
}

/// Classify `age` against `policy`.
///
/// `remaining_secs` rounds up, so it reaches zero only at `max_age`.
#[must_use]
pub fn phase_for_age(policy: &ExpiryPolicy, age: Duration) -> Phase {
    if age >= policy.max_age {
        Phase::Expired
    } else if age >= policy.warning_threshold() {
        let remaining = policy.max_age - age;
        let remaining_secs = u64::try_from(remaining.as_millis().div_ceil(1000)).unwrap_or(u64::MAX);
        Phase::Expiring { remaining_secs }
    } else {
        Phase::Active
    }
}

/// Starts expiry monitoring for the validator's session.
pub struct SessionExpiryMonitor<B> {
    validator: SessionValidator<B>,
    navigator: Arc<dyn Navigator>,
}

impl<B: AuthBackend> SessionExpiryMonitor<B> {
    #[must_use]
    pub fn new(validator: SessionValidator<B>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            validator,
            navigator,
        }
    }

    /// Spawn the monitoring task. Must be called within a tokio runtime.
    ///
    /// Monitoring stops when the returned handle is dropped.
    #[must_use]
    pub fn start(&self) -> MonitorHandle {
        let (tx, rx) = watch::channel(MonitorState::Idle);
        let tx = Arc::new(tx);
        let task = MonitorTask {
            validator: self.validator.clone(),
            navigator: Arc::clone(&self.navigator),
            policy: self.validator.config().expiry().clone(),
            state: Arc::clone(&tx),
        };
        MonitorHandle {
            state_tx: tx,
            state_rx: rx,
            task: tokio::spawn(task.run()),
        }
    }
}

/// Owner of a running monitor.
pub struct MonitorHandle {
    state_tx: Arc<watch::Sender<MonitorState>>,
    state_rx: watch::Receiver<MonitorState>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.state_rx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state_rx.clone()
    }

    /// Dismiss the current warning without extending the session.
    ///
    /// Returns `false` if no warning is showing.
    pub fn acknowledge_warning(&self) -> bool {
        self.state_tx.send_if_modified(|state| match state {
            MonitorState::Warning { acknowledged, .. } if !*acknowledged => {
                *acknowledged = true;
                true
            }
            _ => false,
        })
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct MonitorTask<B> {
    validator: SessionValidator<B>,
    navigator: Arc<dyn Navigator>,
    policy: ExpiryPolicy,
    state: Arc<watch::Sender<MonitorState>>,
}

impl<B: AuthBackend> MonitorTask<B> {
    async fn run(self) {
        tokio::time::sleep(self.policy.grace_delay).await;
        self.state.send_replace(MonitorState::Monitoring);
        tracing::debug!(
            max_age_secs = self.policy.max_age.as_secs(),
            "Session expiry monitoring started"
        );

        let mut checks = tokio::time::interval(self.policy.check_interval);
        checks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            checks.tick().await;
            let Some((token, phase)) = self.phase() else {
                continue;
            };
            match phase {
                Phase::Active => {}
                Phase::Expired => {
                    if self.expire(&token) {
                        return;
                    }
                }
                Phase::Expiring { remaining_secs } => {
                    tracing::info!(remaining_secs, "Session nearing maximum age");
                    self.state.send_replace(MonitorState::Warning {
                        remaining_secs,
                        acknowledged: false,
                    });
                    self.validator
                        .notifier()
                        .notify(&Notice::ExpiryWarning { remaining_secs });

                    if let Some(expired) = self.countdown().await {
                        if self.expire(&expired) {
                            return;
                        }
                    } else {
                        tracing::debug!("Credential changed during countdown");
                    }
                    self.state.send_replace(MonitorState::Monitoring);
                    checks.reset();
                }
            }
        }
    }

    /// Tick once per `countdown_tick`. Returns the expired token, or `None`
    /// once the session is no longer expiring.
    async fn countdown(&self) -> Option<Token> {
        let mut ticks = tokio::time::interval(self.policy.countdown_tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticks.tick().await;
        loop {
            ticks.tick().await;
            match self.phase()? {
                (_, Phase::Expiring { remaining_secs }) => {
                    self.state.send_modify(|state| {
                        if let MonitorState::Warning {
                            remaining_secs: shown,
                            ..
                        } = state
                        {
                            *shown = remaining_secs;
                        }
                    });
                }
                (token, Phase::Expired) => return Some(token),
                (_, Phase::Active) => return None,
            }
        }
    }

    /// Stored token and its phase, `None` when logged out.
    fn phase(&self) -> Option<(Token, Phase)> {
        let credential = self.validator.credential()?;
        let age = credential.age_ms(self.validator.clock().now_ms());
        let phase = phase_for_age(&self.policy, Duration::from_millis(age));
        Some((credential.token, phase))
    }

    /// End the session of `token`. Returns `false` without side effects if
    /// the store has moved on to another credential.
    fn expire(&self, token: &Token) -> bool {
        match self.validator.end_session_for(token) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Expired credential already replaced");
                return false;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to clear expired credential"),
        }
        tracing::info!("Session reached maximum age; logged out");
        self.state.send_replace(MonitorState::Expired);
        self.validator.notifier().notify(&Notice::SessionTimedOut);
        self.navigator
            .redirect(self.validator.config().entry_point());
        true
    }
}
