//! Unified error handling for the session layer.
//!
//! - **Error Categories**: high-level classification for handling decisions
//! - **Domain-specific Errors**: network and authentication errors
//! - **Unified Error Type**: `SessionError` consolidates all error types
//! - **Result Type Alias**: `SessionResult<T>`
//!
//! | Category | Description | Retryable |
//! |----------|-------------|-----------|
//! | Network | Connection, timeout | Yes |
//! | Auth | Rejected or invalidated session | No |
//! | Server | Backend errors (5xx) | Yes |
//! | Storage | Client storage unavailable | No |
//! | Configuration | Invalid settings | No |

mod auth;
mod category;
mod network;
mod result;
mod session_error;

pub use auth::{AuthError, RefreshFailure};
pub use category::ErrorCategory;
pub use network::NetworkError;
pub use result::SessionResult;
pub use session_error::SessionError;
