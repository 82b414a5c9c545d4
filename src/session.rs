//! In-memory session state.
//!
//! One record per authenticated participant, keyed by a v4 UUID handed to
//! the browser at login. The record is strongly typed (identity, resolved
//! log paths, consent flag, conversation history) rather than a string-key
//! dictionary. Sessions are not persisted; the transcript and counter
//! files are the durable record of a run.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::llm_client::ChatMessage;
use crate::log_store::UserLogPaths;
use crate::users::UserIdentity;

/// Mutable state owned by one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub user: UserIdentity,
    pub paths: UserLogPaths,
    pub consented: bool,
    /// Append-only within the session's lifetime; grows without bound by
    /// design (the experiment never truncates or summarizes history).
    pub history: Vec<ChatMessage>,
}

/// Read snapshot handed to the turn pipeline. The pipeline works on the
/// cloned history and commits the whole updated sequence back in one step,
/// so an aborted turn leaves the stored history untouched.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub user: UserIdentity,
    pub paths: UserLogPaths,
    pub history: Vec<ChatMessage>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session seeded with the assistant's scripted greeting.
    pub async fn create(
        &self,
        user: UserIdentity,
        paths: UserLogPaths,
        greeting: ChatMessage,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let state = SessionState {
            user,
            paths,
            consented: false,
            history: vec![greeting],
        };
        self.sessions.write().await.insert(id, state);
        id
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<SessionSnapshot> {
        self.sessions.read().await.get(&id).map(|s| SessionSnapshot {
            user: s.user.clone(),
            paths: s.paths.clone(),
            history: s.history.clone(),
        })
    }

    /// Replace the stored history with the committed sequence from a
    /// completed turn. Returns false if the session disappeared meanwhile.
    pub async fn commit_history(&self, id: Uuid, history: Vec<ChatMessage>) -> bool {
        match self.sessions.write().await.get_mut(&id) {
            Some(state) => {
                state.history = history;
                true
            }
            None => false,
        }
    }

    pub async fn is_consented(&self, id: Uuid) -> Option<bool> {
        self.sessions.read().await.get(&id).map(|s| s.consented)
    }

    pub async fn record_consent(&self, id: Uuid, consented: bool) -> bool {
        match self.sessions.write().await.get_mut(&id) {
            Some(state) => {
                state.consented = consented;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
