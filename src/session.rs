use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::User;

/// Name of the cookie carrying the opaque session id.
pub const SESSION_COOKIE: &str = "session";

/// Name of the CSRF cookie. It is deliberately readable by client-side code:
/// the HTTP client echoes its value back in the `X-XSRF-TOKEN` header on every
/// mutating request, which is what proves same-origin provenance.
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// Session
///
/// The server-side principal for one signed-in browser context. The route guard
/// reads it (never writes it) during request evaluation; mutation happens only
/// through the dedicated store operations below. `verified` and `locale` are
/// snapshots taken from the user record at creation time and kept in sync by
/// `set_verified` / `set_locale`.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub verified: bool,
    pub locale: String,
    pub csrf_token: Uuid,
    pub created_at: DateTime<Utc>,
}

/// SessionStore Trait
///
/// Abstract contract for session persistence, mirroring the repository
/// abstraction: handlers and the dispatcher talk to `Arc<dyn SessionStore>`
/// and never to a concrete backend. Send + Sync + async_trait make the trait
/// object shareable across axum's task boundaries.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session for the given user and returns the full record,
    /// including the freshly minted id and CSRF token.
    async fn create(&self, user: &User, locale: String) -> Session;

    /// Returns a consistent snapshot of the session, or None when the id is
    /// unknown or the session has expired. One call per request: the guard
    /// must never observe a half-updated session.
    async fn get(&self, id: Uuid) -> Option<Session>;

    /// Destroys the session. Destroying an unknown id is a no-op: logout must
    /// be idempotent.
    async fn destroy(&self, id: Uuid);

    /// Updates the locale preference attached to the session.
    async fn set_locale(&self, id: Uuid, locale: String);

    /// Marks the session's principal as email-verified.
    async fn set_verified(&self, id: Uuid);
}

pub type SessionState = Arc<dyn SessionStore>;

// --- Cookie plumbing ---
// Session state travels exclusively through cookies, so reading and writing
// them lives next to the store rather than being scattered across handlers.

/// Extracts a single cookie value from the request's `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

/// Renders a `Set-Cookie` value. Session cookies are HttpOnly; the CSRF cookie
/// must stay readable by client code, so it is not.
pub fn build_cookie(name: &str, value: &str, http_only: bool, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; SameSite=Lax", name, value);
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Renders a `Set-Cookie` value that removes the cookie.
pub fn expire_cookie(name: &str) -> String {
    format!("{}=; Path=/; Max-Age=0", name)
}

/// InMemorySessionStore
///
/// The concrete store: a guarded map keyed by session id. Each `get` clones the
/// record out under the read lock, so a request evaluates against one snapshot
/// even if a concurrent request for the same principal writes afterwards
/// (last write wins).
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, user: &User, locale: String) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: user.id,
            email: user.email.clone(),
            verified: user.verified,
            locale,
            csrf_token: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        session
    }

    async fn get(&self, id: Uuid) -> Option<Session> {
        {
            let sessions = self.sessions.read().await;
            let session = sessions.get(&id)?;
            if Utc::now() - session.created_at <= self.ttl {
                return Some(session.clone());
            }
        }
        // An expired id reads as absent everywhere, so logout can never reach
        // it through destroy; evict it the moment expiry is observed or the
        // map grows without bound.
        self.sessions.write().await.remove(&id);
        None
    }

    async fn destroy(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    async fn set_locale(&self, id: Uuid, locale: String) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.locale = locale;
        }
    }

    async fn set_verified(&self, id: Uuid) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.verified = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            email: "t@example.com".to_string(),
            verified: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_snapshot() {
        let store = InMemorySessionStore::new(60);
        let session = store.create(&sample_user(), "en".to_string()).await;

        let fetched = store.get(session.id).await.unwrap();
        assert_eq!(fetched.user_id, session.user_id);
        assert_eq!(fetched.csrf_token, session.csrf_token);
        assert!(!fetched.verified);
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let store = InMemorySessionStore::new(60);
        let session = store.create(&sample_user(), "en".to_string()).await;

        store.destroy(session.id).await;
        store.destroy(session.id).await; // second destroy must not panic
        assert!(store.get(session.id).await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_read_absent_and_are_evicted() {
        let store = InMemorySessionStore::new(0);
        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(store.create(&sample_user(), "en".to_string()).await.id);
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        for id in ids {
            assert!(store.get(id).await.is_none());
        }
        // Observation evicts: nothing lingers for a long-running server to
        // accumulate.
        assert!(store.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn set_verified_updates_the_snapshot() {
        let store = InMemorySessionStore::new(60);
        let session = store.create(&sample_user(), "en".to_string()).await;

        store.set_verified(session.id).await;
        assert!(store.get(session.id).await.unwrap().verified);
    }
}
