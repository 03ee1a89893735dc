//! Prelude module for convenient imports.
//!
//! ```ignore
//! use sessionkeep::prelude::*;
//! ```

// Entry points
pub use crate::session::{AuthenticatedClient, ManagerBuilder, TokenLifecycleManager};

// Credentials
pub use crate::auth::{CredentialPair, ExpiryHints, Freshness, Identity};

// Events and notice
pub use crate::session::{
    LogoutEvent, LogoutReason, NoticeState, SessionEvent, SessionNotice, SessionSignal,
};

// Configuration and errors
pub use crate::config::SessionConfig;
pub use crate::error::{AuthError, RefreshFailure, SessionError, SessionResult};

// Production adapters
pub use crate::adapters::{BrowserNavigator, FileStorage, LogNavigator, ReqwestHttpClient};
