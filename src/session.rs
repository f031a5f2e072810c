//! Conversation session management.
//!
//! Tracks per-session message history through the store and hands the
//! synthesizer a bounded window of recent turns. A chat turn is a
//! read-synthesize-append sequence; per-session async locks serialize that
//! sequence so concurrent messages in one session cannot interleave
//! histories, while distinct sessions proceed fully in parallel.
//!
//! Sessions are created implicitly on first message and scoped by exact
//! `(tenant_id, session_id)` match.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::models::Turn;
use crate::store::Store;

/// Per-session turn log over the store.
pub struct SessionManager {
    store: Arc<dyn Store>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock guarding a session's read-synthesize-append sequence.
    /// Callers hold it across the whole chat turn.
    pub async fn lock(&self, tenant_id: &str, session_id: &str) -> Arc<Mutex<()>> {
        let key = format!("{}\u{1f}{}", tenant_id, session_id);
        let mut locks = self.locks.lock().await;
        locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append a turn in arrival order.
    pub async fn append_turn(&self, tenant_id: &str, session_id: &str, turn: &Turn) -> Result<()> {
        self.store.append_turn(tenant_id, session_id, turn).await
    }

    /// The most recent `max_turns` turns, oldest first.
    pub async fn recent_turns(
        &self,
        tenant_id: &str,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<Turn>> {
        self.store
            .recent_turns(tenant_id, session_id, max_turns)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::store::memory::InMemoryStore;

    fn turn(text: &str) -> Turn {
        Turn {
            role: Role::User,
            text: text.to_string(),
            created_at: 0,
            cited_document_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn turns_append_in_order_and_window_is_a_suffix() {
        let sessions = SessionManager::new(Arc::new(InMemoryStore::new()));
        for i in 0..4 {
            sessions
                .append_turn("t", "s1", &turn(&format!("m{}", i)))
                .await
                .unwrap();
        }

        let recent = sessions.recent_turns("t", "s1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "m2");
        assert_eq!(recent[1].text, "m3");
    }

    #[tokio::test]
    async fn sessions_do_not_leak_across_ids_or_tenants() {
        let sessions = SessionManager::new(Arc::new(InMemoryStore::new()));
        sessions.append_turn("t", "s1", &turn("one")).await.unwrap();

        assert!(sessions.recent_turns("t", "s2", 10).await.unwrap().is_empty());
        assert!(sessions
            .recent_turns("other", "s1", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn same_session_shares_one_lock() {
        let sessions = SessionManager::new(Arc::new(InMemoryStore::new()));
        let a = sessions.lock("t", "s1").await;
        let b = sessions.lock("t", "s1").await;
        let c = sessions.lock("t", "s2").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
