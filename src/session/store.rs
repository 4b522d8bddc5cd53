use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderMap, HeaderValue};
use cookie::{Cookie, SameSite};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Session, SessionData, SessionStatus};
use crate::{config::SessionConfig, kv::KeyValueStore};

const SESSION_PREFIX: &str = "sess:";

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: SessionConfig) -> Self {
        Self { kv, config }
    }

    /// Resolve the request's session. Unknown, expired or unreadable
    /// sessions fall back to an anonymous one.
    pub async fn load(&self, headers: &HeaderMap) -> Session {
        let Some(id) = session_id_from_headers(headers, &self.config.cookie_name) else {
            return Session::anonymous();
        };

        match self.kv.get(&session_key(&id)).await {
            Ok(Some(raw)) => match serde_json::from_str::<SessionData>(&raw) {
                Ok(data) => Session::restored(id, data),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable session payload");
                    Session::anonymous()
                }
            },
            Ok(None) => {
                debug!("session cookie without stored session");
                Session::anonymous()
            }
            Err(e) => {
                warn!(error = %e, "session lookup failed");
                Session::anonymous()
            }
        }
    }

    /// Drop the stored session. The cookie is cleared on commit even when the
    /// store delete fails.
    pub async fn destroy(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(id) = session.mark_destroyed() {
            self.kv
                .del(&session_key(&id))
                .await
                .context("delete session")?;
        }
        Ok(())
    }

    /// Persist pending changes and return the `Set-Cookie` value, if any.
    pub async fn commit(&self, session: &Session) -> anyhow::Result<Option<HeaderValue>> {
        match session.status() {
            SessionStatus::Unchanged => Ok(None),
            SessionStatus::Destroyed => Ok(Some(header_value(self.removal_cookie())?)),
            SessionStatus::Modified => {
                let Some(user_id) = session.user_id() else {
                    return Ok(None);
                };
                let id = match session.id() {
                    Some(id) => id,
                    None => {
                        let id = Uuid::new_v4().simple().to_string();
                        session.assign_id(id.clone());
                        id
                    }
                };
                let payload = serde_json::to_string(&SessionData { user_id })?;
                self.kv
                    .set_ex(&session_key(&id), &payload, self.config.ttl_secs as u64)
                    .await
                    .context("store session")?;
                debug!(%user_id, "session stored");
                Ok(Some(header_value(self.session_cookie(id))?))
            }
        }
    }

    fn session_cookie(&self, id: String) -> Cookie<'static> {
        Cookie::build((self.config.cookie_name.clone(), id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.config.cookie_secure)
            .max_age(time::Duration::seconds(self.config.ttl_secs))
            .build()
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.config.cookie_name.clone(), ""))
            .path("/")
            .build();
        cookie.make_removal();
        cookie
    }
}

fn session_key(id: &str) -> String {
    format!("{SESSION_PREFIX}{id}")
}

fn header_value(cookie: Cookie<'_>) -> anyhow::Result<HeaderValue> {
    HeaderValue::from_str(&cookie.to_string()).context("encode Set-Cookie")
}

fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == cookie_name && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;

    fn config() -> SessionConfig {
        SessionConfig {
            cookie_name: "qid".into(),
            cookie_secure: false,
            ttl_secs: 3600,
        }
    }

    fn store_with(kv: Arc<MemoryStore>) -> SessionStore {
        SessionStore::new(kv, config())
    }

    fn cookie_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn finds_session_cookie_among_others() {
        let headers = cookie_headers("theme=dark; qid=abc123; lang=en");
        assert_eq!(
            session_id_from_headers(&headers, "qid").as_deref(),
            Some("abc123")
        );
        assert_eq!(session_id_from_headers(&headers, "other"), None);
    }

    #[tokio::test]
    async fn load_without_cookie_is_anonymous() {
        let store = store_with(Arc::new(MemoryStore::default()));
        let session = store.load(&HeaderMap::new()).await;
        assert_eq!(session.user_id(), None);
    }

    #[tokio::test]
    async fn load_restores_stored_user() {
        let kv = Arc::new(MemoryStore::default());
        kv.insert("sess:abc", r#"{"user_id":42}"#);
        let store = store_with(kv);
        let session = store.load(&cookie_headers("qid=abc")).await;
        assert_eq!(session.user_id(), Some(42));
        assert_eq!(session.id().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn load_ignores_garbage_payload() {
        let kv = Arc::new(MemoryStore::default());
        kv.insert("sess:abc", "not json");
        let store = store_with(kv);
        let session = store.load(&cookie_headers("qid=abc")).await;
        assert_eq!(session.user_id(), None);
    }

    #[tokio::test]
    async fn commit_after_login_persists_and_sets_cookie() {
        let kv = Arc::new(MemoryStore::default());
        let store = store_with(kv.clone());
        let session = Session::anonymous();
        session.login(5);

        let cookie = store.commit(&session).await.unwrap().expect("cookie");
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("qid="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));

        let id = session.id().expect("id assigned");
        let key = format!("sess:{id}");
        assert_eq!(
            kv.get(&key).await.unwrap().as_deref(),
            Some(r#"{"user_id":5}"#)
        );
        assert_eq!(kv.ttl(&key), Some(3600));
    }

    #[tokio::test]
    async fn commit_unchanged_session_is_silent() {
        let kv = Arc::new(MemoryStore::default());
        let store = store_with(kv.clone());
        let session = Session::restored("abc".into(), SessionData { user_id: 1 });
        assert!(store.commit(&session).await.unwrap().is_none());
        assert!(kv.keys_with_prefix("sess:").is_empty());
    }

    #[tokio::test]
    async fn destroy_deletes_entry_and_clears_cookie() {
        let kv = Arc::new(MemoryStore::default());
        kv.insert("sess:abc", r#"{"user_id":9}"#);
        let store = store_with(kv.clone());
        let session = store.load(&cookie_headers("qid=abc")).await;

        store.destroy(&session).await.unwrap();
        assert!(!kv.contains("sess:abc"));

        let cookie = store.commit(&session).await.unwrap().expect("removal cookie");
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("qid=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
