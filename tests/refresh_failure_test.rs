//! What happens when the session cannot be saved.

mod common;

use std::time::Duration;

use common::{json, session, REFRESH_URL};
use futures::future::join_all;
use sessionkeep::adapters::mock::MockResponse;
use sessionkeep::auth::{CredentialPair, ExpiryHints, Identity};
use sessionkeep::error::{AuthError, RefreshFailure, SessionError};
use sessionkeep::session::{LogoutReason, NoticeKind, NoticeState, RefreshState, SessionEvent};
use sessionkeep::traits::HttpError;
use tokio::sync::broadcast::error::TryRecvError;

fn reject_everything(s: &common::TestSession) {
    s.http.set_handler(|request| {
        if request.url.starts_with(REFRESH_URL) {
            return None;
        }
        Some(MockResponse::Success(json(
            401,
            serde_json::json!({ "message": "Unauthorized" }),
        )))
    });
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_logs_out_once() {
    let s = session();
    s.manager.login(
        &CredentialPair::new("A1", "R1"),
        ExpiryHints::expires_in(3600),
        Some(Identity::new("u1", "admin")),
    );
    reject_everything(&s);
    s.http.respond_to(
        REFRESH_URL,
        json(401, serde_json::json!({ "message": "Refresh token revoked" })),
    );
    s.http.set_delay(REFRESH_URL, Duration::from_millis(100));
    let mut events = s.manager.subscribe();

    let client = s.manager.client();
    let results = join_all((0..3).map(|_| client.get("/orders"))).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Auth(AuthError::RefreshFailed {
                failure: RefreshFailure::Rejected { status: 401, .. }
            })
        ));
        assert!(err.requires_reauth());
    }

    match events.try_recv().unwrap() {
        SessionEvent::LoggedOut(event) => {
            assert_eq!(event.reason, LogoutReason::SessionInvalid);
            assert_eq!(event.status, Some(401));
            assert!(event.message.contains("Refresh token revoked"));
            assert_eq!(event.redirect_to, "/admin/login");
        }
        other => panic!("expected logout, got {:?}", other),
    }
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    assert!(s.storage.is_empty());
    assert_eq!(s.navigator.targets(), vec!["/admin/login".to_string()]);
    assert_eq!(s.manager.coordinator().state(), RefreshState::LoggedOut);
    assert_eq!(s.http.requests_to(REFRESH_URL).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_is_published_before_callers_see_the_error() {
    let s = session();
    s.manager.login(&CredentialPair::new("A1", "R1"), ExpiryHints::none(), None);
    reject_everything(&s);
    s.http.respond_to(REFRESH_URL, json(403, serde_json::json!({ "error": "revoked" })));
    let mut events = s.manager.subscribe();

    let _ = s.manager.client().get("/orders").await.unwrap_err();

    assert!(matches!(events.try_recv(), Ok(SessionEvent::LoggedOut(_))));
}

#[tokio::test(start_paused = true)]
async fn test_notice_counts_down_after_forced_logout() {
    let s = session();
    s.manager.login(&CredentialPair::new("A1", "R1"), ExpiryHints::none(), None);
    reject_everything(&s);
    s.http.respond_to(REFRESH_URL, json(401, serde_json::json!({ "message": "expired" })));

    let notice = s.manager.notice();
    let task = notice.attach(s.manager.bus());
    let mut rx = notice.subscribe();

    let _ = s.manager.client().get("/orders").await;
    rx.changed().await.unwrap();

    let snapshot = rx.borrow().clone();
    assert_eq!(snapshot.state, NoticeState::Counting { remaining: 10 });
    assert_eq!(snapshot.kind, Some(NoticeKind::Forced));
    assert_eq!(snapshot.reason, Some(LogoutReason::SessionInvalid));
    // The notice owns the redirect now.
    assert_eq!(s.navigator.count(), 0);

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    assert_eq!(notice.state(), NoticeState::Counting { remaining: 6 });
    notice.cancel();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(notice.state(), NoticeState::Paused { remaining: 6 });
    assert_eq!(s.navigator.count(), 0);

    notice.log_in_again();
    assert_eq!(s.navigator.targets(), vec!["/login".to_string()]);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_missing_refresh_token_logs_out_without_calling_the_server() {
    let s = session();
    reject_everything(&s);

    let err = s.manager.client().get("/orders").await.unwrap_err();

    assert!(matches!(
        err.as_auth(),
        Some(AuthError::RefreshFailed {
            failure: RefreshFailure::MissingRefreshToken
        })
    ));
    assert!(s.http.requests_to(REFRESH_URL).is_empty());
    assert_eq!(s.navigator.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_refresh_endpoint_ends_the_session() {
    let s = session();
    s.manager.login(&CredentialPair::new("A1", "R1"), ExpiryHints::none(), None);
    reject_everything(&s);
    s.http.set_response(
        REFRESH_URL,
        MockResponse::Error(HttpError::ConnectionFailed("refused".to_string())),
    );

    let err = s.manager.client().get("/orders").await.unwrap_err();

    assert!(matches!(
        err.as_auth(),
        Some(AuthError::RefreshFailed {
            failure: RefreshFailure::Unreachable { .. }
        })
    ));
    assert!(s.manager.session().is_empty());
    assert_eq!(s.http.requests_to(REFRESH_URL).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_message_skips_refresh() {
    let s = session();
    s.manager.login(&CredentialPair::new("A1", "R1"), ExpiryHints::none(), None);
    s.http.set_handler(|request| {
        if request.url.starts_with(REFRESH_URL) {
            return None;
        }
        Some(MockResponse::Success(json(
            401,
            serde_json::json!({ "message": "Invalid token" }),
        )))
    });
    let mut events = s.manager.subscribe();

    let err = s.manager.client().get("/orders").await.unwrap_err();

    assert!(matches!(
        err.as_auth(),
        Some(AuthError::SessionInvalidated {
            reason: LogoutReason::TokenRejected,
            ..
        })
    ));
    assert!(s.http.requests_to(REFRESH_URL).is_empty());
    match events.try_recv().unwrap() {
        SessionEvent::LoggedOut(event) => {
            assert_eq!(event.reason, LogoutReason::TokenRejected);
            assert_eq!(event.status, Some(401));
        }
        other => panic!("expected logout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_logout_episode_is_idempotent_within_cooldown() {
    let s = session();
    s.manager.login(&CredentialPair::new("A1", "R1"), ExpiryHints::none(), None);
    let mut events = s.manager.subscribe();

    assert!(s.manager.logout().is_performed());
    assert!(!s.manager.logout().is_performed());
    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(!s.manager.logout().is_performed());

    assert!(matches!(events.try_recv(), Ok(SessionEvent::LoggedOut(_))));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(s.navigator.count(), 1);

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(s.manager.logout().is_performed());
    assert_eq!(s.navigator.count(), 2);
}
