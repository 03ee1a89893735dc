//! Navigators for the post-logout redirect.

use tracing::info;

use crate::traits::{NavigationError, Navigator};

/// Opens the login surface in the system browser.
///
/// Relative targets are joined onto `base_url`.
#[derive(Debug, Clone)]
pub struct BrowserNavigator {
    base_url: String,
}

impl BrowserNavigator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else if target.starts_with('/') {
            format!("{}{}", self.base_url, target)
        } else {
            format!("{}/{}", self.base_url, target)
        }
    }
}

impl Navigator for BrowserNavigator {
    fn navigate(&self, target: &str) -> Result<(), NavigationError> {
        let url = self.url_for(target);
        info!(%url, "Opening login page");
        webbrowser::open(&url).map_err(|e| NavigationError::OpenFailed {
            target: url,
            message: e.to_string(),
        })
    }
}

/// Logs the target and prints it for the user; for headless use.
#[derive(Debug, Clone, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, target: &str) -> Result<(), NavigationError> {
        info!(target, "Login required");
        eprintln!("Please log in again: {}", target);
        Ok(())
    }
}
