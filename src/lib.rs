#![doc = include_str!("../README.md")]

#[cfg(feature = "client")]
pub mod api;
#[cfg(feature = "client")]
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod monitor;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;
pub mod validator;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
#[cfg(feature = "client")]
pub use api::{ApiClient, resources};
#[cfg(feature = "client")]
pub use client::AuthClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ExpiryPolicy, SessionConfig, TransportFailurePolicy};
pub use error::{ApiError, Error, RemoteError, StoreError};
pub use guard::{GuardState, GuardedView, Rendered, RouteGuard};
pub use monitor::{MonitorHandle, MonitorState, Phase, SessionExpiryMonitor, phase_for_age};
pub use session::SessionService;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use traits::{AuthBackend, Navigator, Notice, Notifier, TracingNotifier};
pub use types::{Credential, LoginResponse, Principal, Role, Token, ValidationResult};
pub use validator::{SessionValidator, ValidatorBuilder};
