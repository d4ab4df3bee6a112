use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::traits::{AuthBackend, Navigator};
use crate::validator::SessionValidator;

/// Access decision for a mounted view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    /// Validation has not resolved yet.
    Pending,
    /// The session satisfies the requirement.
    Granted,
    /// Access was refused and the host was sent to this path.
    Redirected(String),
}

/// What the host should display for a guarded view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<T> {
    Loading,
    Content(T),
    Redirect(String),
}

/// Gates protected views behind [`SessionValidator::validate`].
///
/// ```rust,ignore
/// let guard = RouteGuard::new(validator.clone(), navigator);
/// let mut view = guard.mount(true);
/// match view.render(|| refunds_table()) {
///     Rendered::Loading => spinner(),
///     Rendered::Content(table) => table,
///     Rendered::Redirect(_) => nothing(),
/// }
/// ```
pub struct RouteGuard<B> {
    validator: SessionValidator<B>,
    navigator: Arc<dyn Navigator>,
}

impl<B> Clone for RouteGuard<B> {
    fn clone(&self) -> Self {
        Self {
            validator: self.validator.clone(),
            navigator: Arc::clone(&self.navigator),
        }
    }
}

impl<B: AuthBackend> RouteGuard<B> {
    #[must_use]
    pub fn new(validator: SessionValidator<B>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            validator,
            navigator,
        }
    }

    /// Mount a protected view and start validating it.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn mount(&self, require_admin: bool) -> GuardedView<B> {
        let (tx, rx) = watch::channel(GuardState::Pending);
        let mut view = GuardedView {
            guard: self.clone(),
            require_admin,
            state_tx: Arc::new(tx),
            state_rx: rx,
            task: None,
            live: Arc::new(Mutex::new(false)),
        };
        view.launch();
        view
    }
}

/// A mounted protected view.
///
/// Dropping it is the unmount: the pending validation is abandoned and no
/// state change or redirect happens afterwards.
pub struct GuardedView<B> {
    guard: RouteGuard<B>,
    require_admin: bool,
    state_tx: Arc<watch::Sender<GuardState>>,
    state_rx: watch::Receiver<GuardState>,
    task: Option<JoinHandle<()>>,
    /// Cleared when the current validation task is superseded or unmounted.
    /// Held while the task publishes, so no redirect lands after `cancel`.
    live: Arc<Mutex<bool>>,
}

impl<B: AuthBackend> GuardedView<B> {
    #[must_use]
    pub fn state(&self) -> GuardState {
        self.state_rx.borrow().clone()
    }

    #[must_use]
    pub fn require_admin(&self) -> bool {
        self.require_admin
    }

    /// Wait until the view leaves [`GuardState::Pending`].
    pub async fn resolved(&mut self) -> GuardState {
        let resolved = self
            .state_rx
            .wait_for(|state| *state != GuardState::Pending)
            .await
            .map(|state| state.clone());
        resolved.unwrap_or_else(|_| self.state())
    }

    /// Subscribe to state changes, e.g. to re-render on resolution.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GuardState> {
        self.state_rx.clone()
    }

    /// Produce what the host should show. `content` runs only once access
    /// is granted.
    pub fn render<T>(&self, content: impl FnOnce() -> T) -> Rendered<T> {
        match self.state() {
            GuardState::Pending => Rendered::Loading,
            GuardState::Granted => Rendered::Content(content()),
            GuardState::Redirected(path) => Rendered::Redirect(path),
        }
    }

    /// Change the admin requirement and validate again.
    pub fn set_require_admin(&mut self, require_admin: bool) {
        if self.require_admin == require_admin {
            return;
        }
        self.require_admin = require_admin;
        self.launch();
    }

    fn launch(&mut self) {
        self.cancel();
        self.state_tx.send_replace(GuardState::Pending);

        let live = Arc::new(Mutex::new(true));
        self.live = Arc::clone(&live);

        let validator = self.guard.validator.clone();
        let navigator = Arc::clone(&self.guard.navigator);
        let state_tx = Arc::clone(&self.state_tx);
        let require_admin = self.require_admin;

        self.task = Some(tokio::spawn(async move {
            let granted = validator.validate(require_admin).await;
            let live = live.lock().unwrap_or_else(PoisonError::into_inner);
            if !*live {
                return;
            }
            if granted {
                state_tx.send_replace(GuardState::Granted);
            } else {
                let entry = validator.config().entry_point().to_owned();
                tracing::debug!(entry = %entry, require_admin, "Guard redirecting");
                state_tx.send_replace(GuardState::Redirected(entry.clone()));
                navigator.redirect(&entry);
            }
        }));
    }
}

impl<B> GuardedView<B> {
    fn cancel(&mut self) {
        *self.live.lock().unwrap_or_else(PoisonError::into_inner) = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<B> Drop for GuardedView<B> {
    fn drop(&mut self) {
        self.cancel();
    }
}
