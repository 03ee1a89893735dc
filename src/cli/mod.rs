//! Command-line front end.
//!
//! Each command builds a [`TokenLifecycleManager`] over the file-backed
//! store, so separate invocations share one session and `watch` in one
//! terminal reacts to `logout` in another.
//!
//! ```ignore
//! use sessionkeep::cli::{parse_args, run_command};
//!
//! let command = parse_args(std::env::args())?;
//! run_command(command, SessionConfig::from_env()?).await?;
//! ```

pub mod args;
pub mod version;

pub use args::{parse_args, ArgsError, CliCommand, LoginArgs, USAGE};
pub use version::{version_string, VERSION};

use std::sync::Arc;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::adapters::{BrowserNavigator, FileStorage, LogNavigator, ReqwestHttpClient, StorageWatcher};
use crate::auth::{fingerprint, CredentialPair, ExpiryHints, Freshness, Identity, StoredSession};
use crate::config::SessionConfig;
use crate::session::{NoticeState, SessionEvent, TokenLifecycleManager};
use crate::traits::{Clock, Navigator, SystemClock};

/// When set, redirects open this web app in the browser instead of being printed.
const APP_URL_ENV: &str = "SESSIONKEEP_APP_URL";

/// Run a parsed command to completion.
pub async fn run_command(command: CliCommand, config: SessionConfig) -> Result<()> {
    match command {
        CliCommand::Version => {
            println!("{}", version_string());
            Ok(())
        }
        CliCommand::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        CliCommand::Status => {
            let (manager, _) = build_manager(config)?;
            let now_ms = SystemClock.now_ms();
            println!("{}", describe_session(&manager.session(), manager.freshness(), now_ms));
            Ok(())
        }
        CliCommand::Login(login) => {
            let (manager, _) = build_manager(config)?;
            run_login(&manager, login);
            println!("Logged in.");
            Ok(())
        }
        CliCommand::Logout => {
            let (manager, _) = build_manager(config)?;
            if manager.logout().is_performed() {
                println!("Logged out.");
            }
            Ok(())
        }
        CliCommand::Refresh => {
            let (manager, _) = build_manager(config)?;
            let token = manager
                .refresh()
                .await
                .map_err(|failure| eyre!(failure.message()))?;
            println!("Refreshed ({}).", fingerprint(&token));
            Ok(())
        }
        CliCommand::Get { urls } => {
            let (manager, _) = build_manager(config)?;
            run_get(&manager, urls).await
        }
        CliCommand::Watch => {
            let (manager, storage) = build_manager(config)?;
            run_watch(manager, storage).await
        }
    }
}

fn build_manager(config: SessionConfig) -> Result<(TokenLifecycleManager, Arc<FileStorage>)> {
    let storage = match &config.storage_path {
        Some(path) => FileStorage::open(path),
        None => FileStorage::open_default().wrap_err("Failed to locate the session file")?,
    };
    let storage = Arc::new(storage);
    debug!(path = %storage.path().display(), "Using session file");

    let navigator: Arc<dyn Navigator> = match std::env::var(APP_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => Arc::new(BrowserNavigator::new(url)),
        _ => Arc::new(LogNavigator),
    };

    let manager = TokenLifecycleManager::builder(config)
        .http(Arc::new(ReqwestHttpClient::new()))
        .storage(storage.clone())
        .navigator(navigator)
        .build()?;
    Ok((manager, storage))
}

fn run_login(manager: &TokenLifecycleManager, login: LoginArgs) {
    let pair = CredentialPair::new(login.access_token, login.refresh_token);
    let hints = login
        .expires_in
        .map(ExpiryHints::expires_in)
        .unwrap_or_default();
    let identity = match (login.user_id, login.role) {
        (None, None) => None,
        (id, role) => Some(Identity { id, role }),
    };
    manager.login(&pair, hints, identity);
}

/// Send every GET at once; a shared 401 triggers one refresh.
async fn run_get(manager: &TokenLifecycleManager, urls: Vec<String>) -> Result<()> {
    let client = manager.client();
    let requests = urls.iter().map(|url| {
        let client = client.clone();
        async move { (url, client.get(url).await) }
    });

    let mut failed = 0;
    for (url, result) in futures::future::join_all(requests).await {
        match result {
            Ok(response) => {
                println!("{} {}", response.status, url);
                if let Ok(text) = response.text() {
                    if !text.is_empty() {
                        println!("{}", text);
                    }
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {} ({})", e.error_code(), url, e.user_message());
            }
        }
    }

    if failed > 0 {
        return Err(eyre!("{} of {} requests failed", failed, urls.len()));
    }
    Ok(())
}

async fn run_watch(manager: TokenLifecycleManager, storage: Arc<FileStorage>) -> Result<()> {
    let mut events = manager.subscribe();
    let notice = manager.notice();
    let notice_task = notice.attach(manager.bus());
    let mut notice_rx = notice.subscribe();
    let watcher = manager.spawn_watcher();
    let sync_task =
        StorageWatcher::new(storage, manager.store().clone(), manager.bus().clone()).spawn();

    println!("Watching session. Press Ctrl-C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe_event(&event)),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            changed = notice_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = notice_rx.borrow_and_update().clone();
                match snapshot.state {
                    NoticeState::Counting { remaining } => println!(
                        "{} Logging out in {}s.",
                        snapshot.message.unwrap_or_default(),
                        remaining
                    ),
                    NoticeState::LoggedOut => break,
                    _ => {}
                }
            }
        }
    }

    watcher.stop();
    notice_task.abort();
    sync_task.abort();
    Ok(())
}

/// Human-readable summary of the stored session.
pub fn describe_session(session: &StoredSession, freshness: Freshness, now_ms: i64) -> String {
    let Some(access) = session.access_token.as_deref() else {
        return "Not logged in.".to_string();
    };

    let mut lines = vec![format!("Access token:  {}", fingerprint(access))];
    lines.push(format!(
        "Refresh token: {}",
        session
            .refresh_token
            .as_deref()
            .map(fingerprint)
            .unwrap_or_else(|| "none".to_string())
    ));
    lines.push(match freshness {
        Freshness::Fresh { expires_at_ms } => {
            format!("Expires in:    {}", format_remaining(expires_at_ms - now_ms))
        }
        Freshness::Expiring { expires_at_ms } if expires_at_ms > now_ms => {
            format!("Expires in:    {} (expiring)", format_remaining(expires_at_ms - now_ms))
        }
        Freshness::Expiring { .. } => "Expires in:    expired".to_string(),
        Freshness::Unknown | Freshness::Absent => "Expires in:    unknown".to_string(),
    });
    if let Some(identity) = &session.identity {
        lines.push(format!(
            "User:          {} ({})",
            identity.id.as_deref().unwrap_or("unknown"),
            identity.role.as_deref().unwrap_or("no role")
        ));
    }
    lines.join("\n")
}

fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Expiring { message, .. } => format!("[expiring] {}", message),
        SessionEvent::LoggedOut(logout) => format!(
            "[logged out] {} ({}, redirect {})",
            logout.message, logout.reason, logout.redirect_to
        ),
        SessionEvent::Refreshed { expires_at } => match expires_at {
            Some(at) => format!("[refreshed] valid until {}", at.to_rfc3339()),
            None => "[refreshed]".to_string(),
        },
        SessionEvent::LoggedIn { user_id } => {
            format!("[logged in] {}", user_id.as_deref().unwrap_or("unknown user"))
        }
    }
}

fn format_remaining(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    match secs {
        s if s >= 3600 => format!("{}h {}m", s / 3600, (s % 3600) / 60),
        s if s >= 60 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{}s", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ExpiryRecord;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_describe_empty_session() {
        assert_eq!(
            describe_session(&StoredSession::default(), Freshness::Absent, NOW),
            "Not logged in."
        );
    }

    #[test]
    fn test_describe_fresh_session() {
        let session = StoredSession {
            access_token: Some("A1".to_string()),
            refresh_token: Some("R1".to_string()),
            expiry: Some(ExpiryRecord::from_epoch_ms(NOW + 3_660_000)),
            identity: Some(Identity::new("u1", "admin")),
        };
        let text = describe_session(
            &session,
            Freshness::Fresh {
                expires_at_ms: NOW + 3_660_000,
            },
            NOW,
        );
        assert!(text.contains(&fingerprint("A1")));
        assert!(!text.contains("A1\n"));
        assert!(text.contains("1h 1m"));
        assert!(text.contains("u1 (admin)"));
    }

    #[test]
    fn test_describe_expired_session() {
        let session = StoredSession {
            access_token: Some("A1".to_string()),
            ..StoredSession::default()
        };
        let text = describe_session(&session, Freshness::Expiring { expires_at_ms: NOW - 1 }, NOW);
        assert!(text.contains("expired"));
        assert!(text.contains("Refresh token: none"));
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(59_999), "59s");
        assert_eq!(format_remaining(61_000), "1m 1s");
        assert_eq!(format_remaining(-5), "0s");
    }
}
