//! Fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::error::RemoteError;
use crate::traits::{AuthBackend, Navigator, Notice, Notifier};
use crate::types::{LoginResponse, Principal, Token};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Reply {
    Role(&'static str),
    Reject(u16),
    Unreachable,
}

#[derive(Default)]
struct FakeState {
    replies: Mutex<HashMap<String, Reply>>,
    accounts: Mutex<HashMap<String, (&'static str, &'static str)>>,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
}

/// Backend answering from a token table and counting `/auth/me` calls.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<FakeState>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Backend whose checks block until [`release`](Self::release) is called.
    pub(crate) fn gated() -> Self {
        Self {
            state: Arc::new(FakeState {
                gate: Some(Semaphore::new(0)),
                ..FakeState::default()
            }),
        }
    }

    pub(crate) fn reply(self, token: &str, reply: Reply) -> Self {
        self.set_reply(token, reply);
        self
    }

    pub(crate) fn set_reply(&self, token: &str, reply: Reply) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(token.to_owned(), reply);
    }

    /// Register a login: `email` + `password` yields `token`.
    pub(crate) fn account(self, email: &str, password: &'static str, token: &'static str) -> Self {
        self.state
            .accounts
            .lock()
            .unwrap()
            .insert(email.to_owned(), (password, token));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn release(&self, checks: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(checks);
        }
    }

    fn lookup(&self, token: &str) -> Reply {
        self.state
            .replies
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .unwrap_or(Reply::Reject(401))
    }
}

impl AuthBackend for FakeBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<LoginResponse, RemoteError> {
        let account = self.state.accounts.lock().unwrap().get(email).copied();
        match account {
            Some((expected, token)) if expected == password => match self.lookup(token) {
                Reply::Role(role) => Ok(LoginResponse::new(
                    token,
                    Principal::new(role).with_email(email),
                )),
                _ => Err(RemoteError::Rejected { status: 401 }),
            },
            _ => Err(RemoteError::Rejected { status: 401 }),
        }
    }

    async fn current_principal(&self, token: &Token) -> Result<Principal, RemoteError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.state.gate {
            gate.acquire().await.unwrap().forget();
        }
        match self.lookup(token.as_str()) {
            Reply::Role(role) => Ok(Principal::new(role)),
            Reply::Reject(status) => Err(RemoteError::Rejected { status }),
            Reply::Unreachable => Err(RemoteError::Transport("connection refused".into())),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.redirects.lock().unwrap().push(path.to_owned());
    }
}

pub(crate) fn config() -> crate::SessionConfig {
    crate::SessionConfig::new("http://backend.test/".parse().unwrap())
}
