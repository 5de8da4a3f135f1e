//! Session credential lifecycle.
//!
//! The [`TokenManager`] owns the bearer token every remote call presents:
//! it obtains the token lazily from an external [`SessionStore`], refreshes
//! it proactively when less than [`REFRESH_MARGIN`] remains before expiry,
//! and terminates the session after a refresh failure on the 401 path.
//!
//! Refresh is single-flight: the token state lives behind one async mutex
//! that is held across the refresh await, so concurrent callers queue on
//! the lock and find a fresh token when they get it, instead of issuing
//! parallel refresh calls.

use crate::error::{OpsLinkError, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, Mutex};

/// Refresh a token when it is this close to expiry.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// An opaque bearer credential with its expiry and owning identity.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub user_id: String,
}

impl SessionToken {
    /// `true` when less than `margin` remains before expiry (or the token
    /// is already past it).
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expires_at.duration_since(SystemTime::now()) {
            Ok(remaining) => remaining < margin,
            Err(_) => true,
        }
    }
}

/// External session store supplying the initial and refreshed tokens.
///
/// `current_session` returning `Ok(None)` means the user has no session;
/// calls then fail fast with [`OpsLinkError::NoSession`] and nothing is
/// sent over the network.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn current_session(&self) -> Result<Option<SessionToken>>;
    async fn refresh_session(&self) -> Result<SessionToken>;
}

#[derive(Default)]
struct TokenState {
    token: Option<SessionToken>,
    terminal: bool,
}

/// Owns the current bearer credential for one session identity.
pub struct TokenManager {
    store: Arc<dyn SessionStore>,
    state: Mutex<TokenState>,
    expired_tx: broadcast::Sender<String>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let (expired_tx, _) = broadcast::channel(8);
        Self {
            store,
            state: Mutex::new(TokenState::default()),
            expired_tx,
        }
    }

    /// Subscribe to the session-expired broadcast. The payload is a
    /// human-readable reason for the hosting application's shell.
    pub fn subscribe_expired(&self) -> broadcast::Receiver<String> {
        self.expired_tx.subscribe()
    }

    /// A valid bearer token, refreshing proactively inside the expiry
    /// margin. Fails fast once the session is terminally expired.
    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.terminal {
            return Err(OpsLinkError::SessionExpired(
                "session terminated after failed refresh".to_string(),
            ));
        }
        if state.token.is_none() {
            debug!("[SESSION] No cached token, querying session store");
            state.token = self.store.current_session().await?;
        }
        match state.token.as_ref() {
            None => Err(OpsLinkError::NoSession(
                "no authenticated session available".to_string(),
            )),
            Some(token) if token.expires_within(REFRESH_MARGIN) => {
                debug!(
                    "[SESSION] Token for user {} inside refresh margin, refreshing",
                    token.user_id
                );
                let fresh = self.store.refresh_session().await?;
                let value = fresh.access_token.clone();
                state.token = Some(fresh);
                Ok(value)
            }
            Some(token) => Ok(token.access_token.clone()),
        }
    }

    /// Unconditional refresh after an authorization rejection. A failure
    /// here is terminal: the session is expired, the broadcast fires, and
    /// every later call fails fast.
    pub async fn force_refresh(&self, reason: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.terminal {
            return Err(OpsLinkError::SessionExpired(
                "session terminated after failed refresh".to_string(),
            ));
        }
        debug!("[SESSION] Forced refresh: {reason}");
        match self.store.refresh_session().await {
            Ok(fresh) => {
                let value = fresh.access_token.clone();
                state.token = Some(fresh);
                Ok(value)
            }
            Err(err) => {
                warn!("[SESSION] Refresh failed ({reason}): {err}");
                let message = "token refresh failed after authorization rejection";
                self.terminate_locked(&mut state, message);
                Err(OpsLinkError::SessionExpired(message.to_string()))
            }
        }
    }

    /// Terminally expire the session (e.g. a replayed request was rejected
    /// again). Emits exactly one session-expired broadcast.
    pub async fn terminate(&self, reason: &str) {
        let mut state = self.state.lock().await;
        self.terminate_locked(&mut state, reason);
    }

    fn terminate_locked(&self, state: &mut TokenState, reason: &str) {
        if state.terminal {
            return;
        }
        state.terminal = true;
        state.token = None;
        warn!("[SESSION] Session expired: {reason}");
        // No receivers is fine; the host may not have subscribed yet.
        let _ = self.expired_tx.send(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingStore {
        token_lifetime: Duration,
        current_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        fail_refresh: AtomicBool,
    }

    impl CountingStore {
        fn with_lifetime(token_lifetime: Duration) -> Self {
            Self {
                token_lifetime,
                current_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                fail_refresh: AtomicBool::new(false),
            }
        }

        fn token(&self, tag: &str, lifetime: Duration) -> SessionToken {
            SessionToken {
                access_token: format!("{tag}-token"),
                expires_at: SystemTime::now() + lifetime,
                user_id: "user-1".to_string(),
            }
        }
    }

    #[async_trait]
    impl SessionStore for CountingStore {
        async fn current_session(&self) -> Result<Option<SessionToken>> {
            self.current_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.token("current", self.token_lifetime)))
        }

        async fn refresh_session(&self) -> Result<SessionToken> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            // Simulated network latency so concurrent accessors overlap
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(OpsLinkError::ServerError {
                    status_code: 400,
                    message: "refresh rejected".to_string(),
                });
            }
            Ok(self.token("fresh", Duration::from_secs(3600)))
        }
    }

    #[tokio::test]
    async fn test_fresh_token_is_not_refreshed() {
        let store = Arc::new(CountingStore::with_lifetime(Duration::from_secs(3600)));
        let manager = TokenManager::new(store.clone());

        let token = manager.access_token().await.unwrap();
        assert_eq!(token, "current-token");
        assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_near_expiry_triggers_one_refresh() {
        let store = Arc::new(CountingStore::with_lifetime(Duration::from_secs(30)));
        let manager = TokenManager::new(store.clone());

        let token = manager.access_token().await.unwrap();
        assert_eq!(token, "fresh-token");
        assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 1);

        // Refreshed token is now far from expiry; no further refresh
        let token = manager.access_token().await.unwrap();
        assert_eq!(token, "fresh-token");
        assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_accesses_share_one_refresh() {
        let store = Arc::new(CountingStore::with_lifetime(Duration::from_secs(30)));
        let manager = Arc::new(TokenManager::new(store.clone()));

        let (a, b) = tokio::join!(manager.access_token(), manager.access_token());
        assert_eq!(a.unwrap(), "fresh-token");
        assert_eq!(b.unwrap(), "fresh-token");
        assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_forced_refresh_is_terminal() {
        let store = Arc::new(CountingStore::with_lifetime(Duration::from_secs(3600)));
        store.fail_refresh.store(true, Ordering::SeqCst);
        let manager = TokenManager::new(store.clone());
        let mut expired = manager.subscribe_expired();

        let err = manager.force_refresh("proxy returned 401").await.unwrap_err();
        assert!(matches!(err, OpsLinkError::SessionExpired(_)));
        assert!(expired.try_recv().is_ok());

        // Fail fast without touching the store again
        let calls_before = store.current_calls.load(Ordering::SeqCst);
        let err = manager.access_token().await.unwrap_err();
        assert!(matches!(err, OpsLinkError::SessionExpired(_)));
        assert_eq!(store.current_calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_terminate_broadcasts_once() {
        let store = Arc::new(CountingStore::with_lifetime(Duration::from_secs(3600)));
        let manager = TokenManager::new(store);
        let mut expired = manager.subscribe_expired();

        manager.terminate("rejected after refresh").await;
        manager.terminate("rejected after refresh").await;

        assert_eq!(expired.try_recv().unwrap(), "rejected after refresh");
        assert!(expired.try_recv().is_err());
    }

    struct EmptyStore;

    #[async_trait]
    impl SessionStore for EmptyStore {
        async fn current_session(&self) -> Result<Option<SessionToken>> {
            Ok(None)
        }

        async fn refresh_session(&self) -> Result<SessionToken> {
            Err(OpsLinkError::NoSession("nothing to refresh".to_string()))
        }
    }

    #[tokio::test]
    async fn test_no_session_fails_fast() {
        let manager = TokenManager::new(Arc::new(EmptyStore));
        let err = manager.access_token().await.unwrap_err();
        assert!(matches!(err, OpsLinkError::NoSession(_)));
    }
}
