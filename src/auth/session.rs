use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::model::user::User;

/// A logged in user, as held in the cache.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user_id: i64,
    pub created_utc: OffsetDateTime,
    pub user: User,
    pub state: HashMap<String, String>,
}

impl Session {
    pub fn new(session_id: &str, user: User) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user.id,
            created_utc: OffsetDateTime::now_utc(),
            user,
            state: HashMap::new(),
        }
    }
}

/// Process-wide session map behind one lock. Entries are only removed on logout.
#[derive(Clone, Default)]
pub struct SessionCache {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionCache {
    pub async fn add(&self, session: Session) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.session_id.clone(), session);
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    pub async fn expire(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().await.remove(session_id)
    }

    /// Refreshes the cached copy of a user in every session it owns.
    pub async fn update_user(&self, user: &User) {
        let mut sessions = self.sessions.lock().await;
        for session in sessions.values_mut().filter(|s| s.user_id == user.id) {
            session.user = user.clone();
        }
    }

    pub async fn state_value(&self, session_id: &str, key: &str) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id)?.state.get(key).cloned()
    }

    /// Returns false when the session is no longer cached.
    pub async fn set_state_value(&self, session_id: &str, key: &str, value: String) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.state.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> User {
        let mut u = User::new("test@example.com");
        u.id = id;
        u
    }

    #[tokio::test]
    async fn add_get_expire() {
        let cache = SessionCache::default();
        cache.add(Session::new("abc", user(1))).await;
        assert!(cache.is_active("abc").await);
        assert_eq!(cache.get("abc").await.map(|s| s.user_id), Some(1));

        let removed = cache.expire("abc").await;
        assert!(removed.is_some());
        assert!(!cache.is_active("abc").await);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn state_round_trips_per_session() {
        let cache = SessionCache::default();
        cache.add(Session::new("one", user(1))).await;
        assert!(cache.set_state_value("one", "theme", "dark".into()).await);
        assert!(!cache.set_state_value("missing", "theme", "dark".into()).await);
        assert_eq!(cache.state_value("one", "theme").await.as_deref(), Some("dark"));
        assert_eq!(cache.state_value("one", "other").await, None);
    }

    #[tokio::test]
    async fn user_updates_reach_all_sessions() {
        let cache = SessionCache::default();
        cache.add(Session::new("a", user(7))).await;
        cache.add(Session::new("b", user(7))).await;
        let mut banned = user(7);
        banned.is_banned = true;
        cache.update_user(&banned).await;
        assert!(cache.get("a").await.unwrap().user.is_banned);
        assert!(cache.get("b").await.unwrap().user.is_banned);
    }
}
