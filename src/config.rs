//! Session configuration.
//!
//! Every timing constant, the Auth API location, the authorization-failure
//! classification and the role to login-surface mapping live here.
//!
//! # Example
//!
//! ```ignore
//! use sessionkeep::config::SessionConfig;
//!
//! let config = SessionConfig::new("https://api.example.com")
//!     .with_expiry_buffer_secs(60)
//!     .with_login_route("admin", "/admin/login");
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::api::DEFAULT_REFRESH_PATH;
use crate::auth::expiry::DEFAULT_BUFFER_SECS;
use crate::error::SessionError;

const ENV_PREFIX: &str = "SESSIONKEEP_";

/// Default Auth API base URL for the CLI.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Role to login-surface mapping used for post-logout redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectMap {
    by_role: HashMap<String, String>,
    default: String,
}

impl RedirectMap {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            by_role: HashMap::new(),
            default: default.into(),
        }
    }

    pub fn with_route(mut self, role: impl Into<String>, path: impl Into<String>) -> Self {
        self.by_role.insert(role.into().to_lowercase(), path.into());
        self
    }

    /// Parse `role=path,role=path`.
    pub fn parse_routes(mut self, spec: &str) -> Result<Self, SessionError> {
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((role, path)) = entry.split_once('=') else {
                return Err(SessionError::config(format!(
                    "login route '{}' must look like role=path",
                    entry
                )));
            };
            let (role, path) = (role.trim(), path.trim());
            if role.is_empty() || path.is_empty() {
                return Err(SessionError::config(format!(
                    "login route '{}' has an empty role or path",
                    entry
                )));
            }
            self = self.with_route(role, path);
        }
        Ok(self)
    }

    /// Login surface for `role`, falling back to the default.
    pub fn login_path(&self, role: Option<&str>) -> &str {
        role.and_then(|r| self.by_role.get(&r.to_lowercase()))
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    /// Login surface with an optional return location appended.
    pub fn target(&self, role: Option<&str>, redirect_hint: Option<&str>) -> String {
        let path = self.login_path(role);
        match redirect_hint.filter(|h| !h.is_empty()) {
            Some(hint) => {
                let separator = if path.contains('?') { '&' } else { '?' };
                format!("{}{}redirect={}", path, separator, urlencoding::encode(hint))
            }
            None => path.to_string(),
        }
    }

    pub fn default_path(&self) -> &str {
        &self.default
    }
}

impl Default for RedirectMap {
    fn default() -> Self {
        Self::new("/login")
    }
}

/// Configuration for one token lifecycle manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the Auth API (and of relative request paths).
    pub api_url: String,
    /// Path of the refresh endpoint under `api_url`.
    pub refresh_path: String,
    /// Seconds before expiry at which a token counts as expired.
    pub expiry_buffer_secs: u64,
    /// Period of the expiry watcher.
    pub watch_interval: Duration,
    /// How long the logout guard stays closed after a forced logout.
    pub logout_cooldown: Duration,
    /// Seconds the session notice counts down before logging out.
    pub notice_countdown_secs: u32,
    /// Deadline for one refresh call.
    pub refresh_timeout: Duration,
    /// Extra refresh attempts after a network failure (0 = none).
    pub refresh_network_retries: u32,
    /// Refresh from the watcher instead of only warning.
    pub preemptive_refresh: bool,
    /// Statuses that mean "authorization failure".
    pub auth_failure_statuses: Vec<u16>,
    /// Server messages that make an authorization failure terminal.
    /// Matched case-insensitively as substrings.
    pub terminal_messages: Vec<String>,
    pub redirects: RedirectMap,
    /// Location of the file-backed storage; `None` uses the home directory.
    pub storage_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            expiry_buffer_secs: DEFAULT_BUFFER_SECS,
            watch_interval: Duration::from_secs(30 * 60),
            logout_cooldown: Duration::from_millis(1000),
            notice_countdown_secs: 10,
            refresh_timeout: Duration::from_secs(15),
            refresh_network_retries: 0,
            preemptive_refresh: false,
            auth_failure_statuses: vec![401],
            terminal_messages: vec!["invalid token".to_string(), "token expired".to_string()],
            redirects: RedirectMap::default(),
            storage_path: None,
        }
    }
}

impl SessionConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_expiry_buffer_secs(mut self, secs: u64) -> Self {
        self.expiry_buffer_secs = secs;
        self
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn with_logout_cooldown(mut self, cooldown: Duration) -> Self {
        self.logout_cooldown = cooldown;
        self
    }

    pub fn with_notice_countdown_secs(mut self, secs: u32) -> Self {
        self.notice_countdown_secs = secs;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_refresh_network_retries(mut self, retries: u32) -> Self {
        self.refresh_network_retries = retries;
        self
    }

    pub fn with_preemptive_refresh(mut self, enabled: bool) -> Self {
        self.preemptive_refresh = enabled;
        self
    }

    pub fn with_auth_failure_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.auth_failure_statuses = statuses;
        self
    }

    pub fn with_terminal_messages(mut self, messages: Vec<String>) -> Self {
        self.terminal_messages = messages;
        self
    }

    pub fn with_redirects(mut self, redirects: RedirectMap) -> Self {
        self.redirects = redirects;
        self
    }

    pub fn with_login_route(mut self, role: impl Into<String>, path: impl Into<String>) -> Self {
        self.redirects = self.redirects.with_route(role, path);
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Whether `status` is an authorization failure.
    pub fn is_auth_failure(&self, status: u16) -> bool {
        self.auth_failure_statuses.contains(&status)
    }

    /// Whether a server message marks the failure as unrecoverable.
    pub fn is_terminal_message(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.terminal_messages
            .iter()
            .any(|m| !m.is_empty() && message.contains(&m.to_lowercase()))
    }

    /// Resolve a request path against `api_url`; absolute URLs pass through.
    pub fn resolve_url(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            return path_or_url.to_string();
        }
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path_or_url.trim_start_matches('/')
        )
    }

    /// Build from defaults overlaid with `SESSIONKEEP_*` environment variables.
    pub fn from_env() -> Result<Self, SessionError> {
        let mut config = Self::default();

        if let Some(url) = env_string("API_URL") {
            config.api_url = url;
        }
        if let Some(path) = env_string("REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Some(secs) = env_parse::<u64>("EXPIRY_BUFFER_SECS")? {
            config.expiry_buffer_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("WATCH_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(SessionError::config("WATCH_INTERVAL_SECS must be positive"));
            }
            config.watch_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("LOGOUT_COOLDOWN_MS")? {
            config.logout_cooldown = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u32>("NOTICE_COUNTDOWN_SECS")? {
            config.notice_countdown_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("REFRESH_TIMEOUT_SECS")? {
            config.refresh_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>("REFRESH_NETWORK_RETRIES")? {
            config.refresh_network_retries = retries;
        }
        if let Some(raw) = env_string("PREEMPTIVE_REFRESH") {
            config.preemptive_refresh = parse_bool("PREEMPTIVE_REFRESH", &raw)?;
        }

        let default_login =
            env_string("DEFAULT_LOGIN").unwrap_or_else(|| config.redirects.default_path().to_string());
        let mut redirects = RedirectMap::new(default_login);
        if let Some(routes) = env_string("LOGIN_ROUTES") {
            redirects = redirects.parse_routes(&routes)?;
        }
        config.redirects = redirects;

        if let Some(path) = env_string("STORAGE_PATH") {
            config.storage_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>, SessionError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
            SessionError::config(format!("{}{}='{}': {}", ENV_PREFIX, name, raw, e))
        }),
        None => Ok(None),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, SessionError> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SessionError::config(format!(
            "{}{}='{}' is not a boolean",
            ENV_PREFIX, name, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 12] = [
        "API_URL",
        "REFRESH_PATH",
        "EXPIRY_BUFFER_SECS",
        "WATCH_INTERVAL_SECS",
        "LOGOUT_COOLDOWN_MS",
        "NOTICE_COUNTDOWN_SECS",
        "REFRESH_TIMEOUT_SECS",
        "REFRESH_NETWORK_RETRIES",
        "PREEMPTIVE_REFRESH",
        "DEFAULT_LOGIN",
        "LOGIN_ROUTES",
        "STORAGE_PATH",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(format!("{}{}", ENV_PREFIX, var));
        }
    }

    fn set_env(name: &str, value: &str) {
        std::env::set_var(format!("{}{}", ENV_PREFIX, name), value);
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.expiry_buffer_secs, 30);
        assert_eq!(config.watch_interval, Duration::from_secs(1800));
        assert_eq!(config.logout_cooldown, Duration::from_secs(1));
        assert_eq!(config.notice_countdown_secs, 10);
        assert_eq!(config.refresh_network_retries, 0);
        assert!(!config.preemptive_refresh);
        assert!(config.is_auth_failure(401));
        assert!(!config.is_auth_failure(403));
    }

    #[test]
    fn test_terminal_messages_case_insensitive() {
        let config = SessionConfig::default();
        assert!(config.is_terminal_message("Invalid Token"));
        assert!(config.is_terminal_message("jwt error: token expired"));
        assert!(!config.is_terminal_message("Unauthorized"));
    }

    #[test]
    fn test_redirect_map() {
        let map = RedirectMap::new("/login").with_route("Admin", "/admin/login");
        assert_eq!(map.login_path(Some("admin")), "/admin/login");
        assert_eq!(map.login_path(Some("ADMIN")), "/admin/login");
        assert_eq!(map.login_path(Some("staff")), "/login");
        assert_eq!(map.login_path(None), "/login");
    }

    #[test]
    fn test_redirect_hint_is_encoded() {
        let map = RedirectMap::new("/login");
        assert_eq!(
            map.target(None, Some("/reports?year=2024")),
            "/login?redirect=%2Freports%3Fyear%3D2024"
        );
        assert_eq!(map.target(None, Some("")), "/login");

        let map = RedirectMap::new("/login?tenant=a");
        assert_eq!(map.target(None, Some("/x")), "/login?tenant=a&redirect=%2Fx");
    }

    #[test]
    fn test_parse_routes() {
        let map = RedirectMap::default()
            .parse_routes("admin=/admin/login, customer=/login/customer")
            .unwrap();
        assert_eq!(map.login_path(Some("customer")), "/login/customer");

        assert!(RedirectMap::default().parse_routes("admin").is_err());
        assert!(RedirectMap::default().parse_routes("=/x").is_err());
    }

    #[test]
    fn test_resolve_url() {
        let config = SessionConfig::new("https://api.example.com/");
        assert_eq!(config.resolve_url("/me"), "https://api.example.com/me");
        assert_eq!(config.resolve_url("me"), "https://api.example.com/me");
        assert_eq!(config.resolve_url("http://other/x"), "http://other/x");
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new("https://api.example.com")
            .with_expiry_buffer_secs(5)
            .with_notice_countdown_secs(3)
            .with_preemptive_refresh(true)
            .with_login_route("admin", "/admin/login");
        assert_eq!(config.expiry_buffer_secs, 5);
        assert_eq!(config.notice_countdown_secs, 3);
        assert!(config.preemptive_refresh);
        assert_eq!(config.redirects.login_path(Some("admin")), "/admin/login");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        set_env("API_URL", "https://auth.example.com");
        set_env("EXPIRY_BUFFER_SECS", "45");
        set_env("WATCH_INTERVAL_SECS", "60");
        set_env("PREEMPTIVE_REFRESH", "yes");
        set_env("DEFAULT_LOGIN", "/signin");
        set_env("LOGIN_ROUTES", "admin=/admin/signin");
        set_env("STORAGE_PATH", "/tmp/sessionkeep.json");

        let config = SessionConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.api_url, "https://auth.example.com");
        assert_eq!(config.expiry_buffer_secs, 45);
        assert_eq!(config.watch_interval, Duration::from_secs(60));
        assert!(config.preemptive_refresh);
        assert_eq!(config.redirects.login_path(None), "/signin");
        assert_eq!(config.redirects.login_path(Some("admin")), "/admin/signin");
        assert_eq!(
            config.storage_path,
            Some(PathBuf::from("/tmp/sessionkeep.json"))
        );
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        set_env("EXPIRY_BUFFER_SECS", "soon");
        let err = SessionConfig::from_env().unwrap_err();
        clear_env();
        assert_eq!(err.error_code(), "E_CONFIG");

        set_env("PREEMPTIVE_REFRESH", "maybe");
        assert!(SessionConfig::from_env().is_err());
        clear_env();

        set_env("WATCH_INTERVAL_SECS", "0");
        assert!(SessionConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_without_variables_is_default() {
        clear_env();
        let config = SessionConfig::from_env().unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.redirects, RedirectMap::default());
    }
}
