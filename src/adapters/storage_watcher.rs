//! Cross-process session sync.
//!
//! Watches the session file for changes made by other processes. A token
//! removed elsewhere is reported on the signal channel so the expiry watcher
//! can end this process's session; a token replaced elsewhere is simply
//! reloaded.
//!
//! Uses `notify` for filesystem events with a polling fallback, since some
//! filesystems (network mounts, containers) never deliver events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::file_storage::{ExternalChange, FileStorage};
use crate::auth::TokenStore;
use crate::session::{SessionBus, SessionSignal};

/// Polling fallback interval.
pub const POLL_INTERVAL_SECS: u64 = 5;

const REMOVED_ELSEWHERE: &str = "You were logged out in another window.";

pub struct StorageWatcher {
    storage: Arc<FileStorage>,
    store: Arc<TokenStore>,
    bus: SessionBus,
    poll_interval: Duration,
}

impl StorageWatcher {
    pub fn new(storage: Arc<FileStorage>, store: Arc<TokenStore>, bus: SessionBus) -> Self {
        Self {
            storage,
            store,
            bus,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Compare the file with what this process last saw and react.
    pub fn sync(&self) -> ExternalChange {
        let change = match self.storage.sync_from_disk() {
            Ok(change) => change,
            Err(e) => {
                debug!("Session file not readable: {}", e);
                return ExternalChange::Unchanged;
            }
        };

        match change {
            ExternalChange::Unchanged => {}
            ExternalChange::TokenReplaced => {
                info!("Session updated by another process");
                self.store.reload();
            }
            ExternalChange::TokenRemoved => {
                info!("Session removed by another process");
                self.store.reload();
                self.bus.signal(SessionSignal::TokenExpired {
                    message: Some(REMOVED_ELSEWHERE.to_string()),
                });
            }
        }
        change
    }

    /// Start watching. Abort the handle to stop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
            let watcher = self.setup_notify_watcher(wake_tx);
            if watcher.is_none() {
                warn!(
                    "File events unavailable for {}, polling every {:?}",
                    self.storage.path().display(),
                    self.poll_interval
                );
            }

            let mut poll = tokio::time::interval(self.poll_interval);
            loop {
                tokio::select! {
                    woke = wake_rx.recv() => {
                        if woke.is_none() {
                            break;
                        }
                    }
                    _ = poll.tick() => {}
                }
                self.sync();
            }
            drop(watcher);
        })
    }

    /// Watch the parent directory so replacement by rename is seen too.
    /// The returned watcher must be kept alive.
    fn setup_notify_watcher(&self, wake_tx: mpsc::Sender<()>) -> Option<notify::RecommendedWatcher> {
        use notify::{RecursiveMode, Watcher};

        let target = self.storage.path().to_path_buf();
        let file_name = target.file_name().map(|n| n.to_os_string());
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            let relevant = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if relevant {
                let _ = wake_tx.try_send(());
            }
        })
        .ok()?;

        let watch_path = target.parent()?;
        std::fs::create_dir_all(watch_path).ok()?;
        watcher.watch(watch_path, RecursiveMode::NonRecursive).ok()?;
        Some(watcher)
    }
}
