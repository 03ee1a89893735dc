//! Session lifecycle: everything that happens between login and logout.
//!
//! - [`pipeline`] - middleware chain every authenticated request passes through
//! - [`interceptor`] - attaches the bearer credential
//! - [`coordinator`] - single-flight refresh and the 401 recovery layer
//! - [`broadcaster`] - idempotent forced logout
//! - [`watcher`] - proactive expiry detection
//! - [`notice`] - countdown shown when a session ends
//! - [`manager`] - owns one session's state and wires the rest together

pub mod backoff;
pub mod broadcaster;
pub mod coordinator;
pub mod events;
pub mod interceptor;
pub mod manager;
pub mod notice;
pub mod pipeline;
pub mod watcher;

pub use backoff::ExponentialBackoff;
pub use broadcaster::{LogoutBroadcaster, LogoutOutcome};
pub use coordinator::{RefreshCoordinator, RefreshOnUnauthorized, RefreshState};
pub use events::{LogoutEvent, LogoutReason, SessionBus, SessionEvent, SessionSignal};
pub use interceptor::{attach_bearer, BearerInterceptor};
pub use manager::{AuthenticatedClient, ManagerBuilder, TokenLifecycleManager};
pub use notice::{NoticeKind, NoticeSnapshot, NoticeState, SessionNotice};
pub use pipeline::{Middleware, Next, Pipeline};
pub use watcher::{ExpiryWatcher, WatchOutcome, WatcherHandle};
