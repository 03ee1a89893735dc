//! Navigation abstraction used for the post-logout redirect.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("Failed to open {target}: {message}")]
    OpenFailed { target: String, message: String },
}

/// Sends the user to a login surface.
///
/// The target is a path such as `/admin/login?redirect=%2Freports`; how it
/// is reached (browser, router, log line) is up to the implementation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str) -> Result<(), NavigationError>;
}
