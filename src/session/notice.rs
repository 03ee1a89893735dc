//! Session notice.
//!
//! The UI-facing side of a session ending: a countdown with a reason, a
//! cancel action that pauses it, a refresh action and a "log in again"
//! action.
//!
//! ```text
//! HIDDEN -> COUNTING -> PAUSED        (cancel)
//!              |   \-> HIDDEN         (refresh succeeded)
//!              \-----> LOGGED_OUT     (zero, or "log in again")
//! ```
//!
//! Two kinds of notice exist. An *advisory* notice comes from the expiry
//! watcher: credentials are still stored, so refresh can save the session
//! and reaching zero performs the forced logout. A *forced* notice follows a
//! logout that already happened: reaching zero only redirects.
//!
//! Renderers read state through [`SessionNotice::subscribe`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::broadcaster::{LogoutBroadcaster, LogoutOutcome};
use super::coordinator::RefreshCoordinator;
use super::events::{LogoutEvent, LogoutReason, SessionBus, SessionEvent};
use crate::error::RefreshFailure;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeState {
    Hidden,
    Counting { remaining: u32 },
    Paused { remaining: u32 },
    LoggedOut,
}

impl NoticeState {
    pub fn is_visible(&self) -> bool {
        matches!(
            self,
            NoticeState::Counting { .. } | NoticeState::Paused { .. }
        )
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            NoticeState::Counting { remaining } | NoticeState::Paused { remaining } => {
                Some(*remaining)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Token expiring; credentials still present.
    Advisory,
    /// Logout already performed.
    Forced,
}

/// What a renderer needs to draw the notice.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeSnapshot {
    pub state: NoticeState,
    pub kind: Option<NoticeKind>,
    pub message: Option<String>,
    pub reason: Option<LogoutReason>,
    pub status: Option<u16>,
    pub redirect_to: Option<String>,
}

impl NoticeSnapshot {
    fn hidden() -> Self {
        Self {
            state: NoticeState::Hidden,
            kind: None,
            message: None,
            reason: None,
            status: None,
            redirect_to: None,
        }
    }
}

struct NoticeInner {
    snapshot: NoticeSnapshot,
    /// Logout events this notice caused itself.
    own_logouts: Vec<Uuid>,
}

pub struct SessionNotice {
    inner: Mutex<NoticeInner>,
    tx: watch::Sender<NoticeSnapshot>,
    countdown_secs: u32,
    broadcaster: Arc<LogoutBroadcaster>,
    coordinator: Arc<RefreshCoordinator>,
}

impl SessionNotice {
    pub fn new(
        countdown_secs: u32,
        broadcaster: Arc<LogoutBroadcaster>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        let (tx, _) = watch::channel(NoticeSnapshot::hidden());
        Self {
            inner: Mutex::new(NoticeInner {
                snapshot: NoticeSnapshot::hidden(),
                own_logouts: Vec::new(),
            }),
            tx,
            countdown_secs,
            broadcaster,
            coordinator,
        }
    }

    pub fn snapshot(&self) -> NoticeSnapshot {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> NoticeState {
        self.tx.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<NoticeSnapshot> {
        self.tx.subscribe()
    }

    pub fn countdown_secs(&self) -> u32 {
        self.countdown_secs
    }

    /// Show an advisory notice. Ignored while a forced notice is visible.
    pub fn show_advisory(&self, message: &str) {
        self.update(|inner| {
            let snap = &mut inner.snapshot;
            if snap.kind == Some(NoticeKind::Forced) && snap.state.is_visible() {
                return;
            }
            if snap.kind == Some(NoticeKind::Advisory) && snap.state.is_visible() {
                snap.message = Some(message.to_string());
                return;
            }
            *snap = NoticeSnapshot {
                state: NoticeState::Counting {
                    remaining: self.countdown_secs,
                },
                kind: Some(NoticeKind::Advisory),
                message: Some(message.to_string()),
                reason: Some(LogoutReason::TokenExpired),
                status: None,
                redirect_to: None,
            };
        });
    }

    /// Show a notice for a logout that already happened.
    pub fn show_forced(&self, event: &LogoutEvent) {
        self.update(|inner| {
            if inner.own_logouts.contains(&event.id) {
                return;
            }
            inner.snapshot = NoticeSnapshot {
                state: NoticeState::Counting {
                    remaining: self.countdown_secs,
                },
                kind: Some(NoticeKind::Forced),
                message: Some(event.message.clone()),
                reason: Some(event.reason),
                status: event.status,
                redirect_to: Some(event.redirect_to.clone()),
            };
        });
    }

    /// Hide without logging out.
    pub fn hide(&self) {
        self.update(|inner| inner.snapshot = NoticeSnapshot::hidden());
    }

    /// Advance the countdown by one second; logs out at zero.
    pub fn tick(&self) -> NoticeState {
        let mut expired = false;
        self.update(|inner| {
            if let NoticeState::Counting { remaining } = inner.snapshot.state {
                let remaining = remaining.saturating_sub(1);
                inner.snapshot.state = NoticeState::Counting { remaining };
                expired = remaining == 0;
            }
        });
        if expired {
            self.log_in_again();
        }
        self.state()
    }

    /// Stop the countdown; the notice stays visible.
    pub fn cancel(&self) {
        self.update(|inner| {
            if let NoticeState::Counting { remaining } = inner.snapshot.state {
                debug!(remaining, "Session notice countdown paused");
                inner.snapshot.state = NoticeState::Paused { remaining };
            }
        });
    }

    /// Try to keep the session. Only an advisory notice can be refreshed;
    /// after a forced logout there is nothing left to refresh with.
    pub async fn refresh(&self) -> Result<(), RefreshFailure> {
        let snap = self.snapshot();
        if snap.kind != Some(NoticeKind::Advisory) || !snap.state.is_visible() {
            return Err(RefreshFailure::MissingRefreshToken);
        }

        match self.coordinator.refresh().await {
            Ok(_) => {
                info!("Session renewed from notice");
                self.hide();
                Ok(())
            }
            Err(failure) => {
                // The coordinator's logout event turns this into a forced notice.
                warn!("Refresh from notice failed: {}", failure);
                Err(failure)
            }
        }
    }

    /// Leave now: same as the countdown reaching zero.
    pub fn log_in_again(&self) {
        let snap = self.snapshot();
        let target = match snap.kind {
            Some(NoticeKind::Advisory) => {
                let message = snap
                    .message
                    .clone()
                    .unwrap_or_else(|| "Your session has expired.".to_string());
                match self
                    .broadcaster
                    .force_logout(LogoutReason::TokenExpired, &message, None, None)
                {
                    LogoutOutcome::Performed(event) => {
                        if let Ok(mut inner) = self.inner.lock() {
                            inner.own_logouts.push(event.id);
                        }
                        Some(event.redirect_to)
                    }
                    LogoutOutcome::Suppressed => None,
                }
            }
            Some(NoticeKind::Forced) => snap.redirect_to.clone(),
            None => None,
        };

        let target =
            target.unwrap_or_else(|| self.broadcaster.redirects().default_path().to_string());
        // Without an attached notice the broadcaster has already navigated.
        if self.broadcaster.defers_redirect() {
            self.broadcaster.navigate(&target);
        }
        self.update(|inner| {
            inner.snapshot.state = NoticeState::LoggedOut;
            inner.snapshot.redirect_to = Some(target.clone());
        });
    }

    /// Apply one bus event.
    pub fn handle_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Expiring { message, .. } => self.show_advisory(message),
            SessionEvent::LoggedOut(event) => self.show_forced(event),
            SessionEvent::Refreshed { .. } => {
                let snap = self.snapshot();
                if snap.kind == Some(NoticeKind::Advisory) && snap.state.is_visible() {
                    self.hide();
                }
            }
            SessionEvent::LoggedIn { .. } => self.hide(),
        }
    }

    /// Listen to the bus and drive the countdown once per second.
    ///
    /// Takes over the post-logout redirect from the broadcaster.
    pub fn attach(self: &Arc<Self>, bus: &SessionBus) -> JoinHandle<()> {
        self.broadcaster.set_defer_redirect(true);
        let mut events = bus.subscribe();
        let notice = Arc::clone(self);

        tokio::spawn(async move {
            let mut deadline: Option<Instant> = None;
            loop {
                let counting = matches!(notice.state(), NoticeState::Counting { .. });
                deadline = match (counting, deadline) {
                    (false, _) => None,
                    (true, None) => Some(Instant::now() + TICK),
                    (true, Some(d)) => Some(d),
                };

                let sleep = async {
                    match deadline {
                        Some(d) => tokio::time::sleep_until(d).await,
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => notice.handle_event(&event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Session notice lagged, missed {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = sleep => {
                        deadline = deadline.map(|d| d + TICK);
                        notice.tick();
                    }
                }
            }
            notice.broadcaster.set_defer_redirect(false);
        })
    }

    fn update(&self, change: impl FnOnce(&mut NoticeInner)) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let before = inner.snapshot.clone();
        change(&mut inner);
        if inner.snapshot != before {
            debug!(state = ?inner.snapshot.state, "Session notice updated");
            self.tx.send_replace(inner.snapshot.clone());
        }
    }
}

impl std::fmt::Debug for SessionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionNotice")
            .field("state", &self.state())
            .field("countdown_secs", &self.countdown_secs)
            .finish_non_exhaustive()
    }
}
