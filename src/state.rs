//! Application state: the injected document store, the pool loader, the optional
//! image host and the registry of HTTP quiz sessions.
//!
//! The store is chosen once at startup:
//!   - QUIZ_STORE=firestore with FIRESTORE_PROJECT_ID set uses the hosted database
//!   - otherwise an in-memory store seeded from QUIZ_CONFIG_PATH or the built-in seeds
//!
//! HTTP sessions have no close event when the learner just leaves, so the
//! registry evicts entries idle longer than SESSION_IDLE_SECS.

use std::{collections::HashMap, sync::Arc, time::{Duration, Instant}};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::config::{
    load_content_bank_from_env, session_idle_from_env, store_backend_from_env, StoreBackend, DEFAULT_SESSION_IDLE_SECS,
};
use crate::error::ApiError;
use crate::logic::session_not_found;
use crate::pool::QuestionPoolLoader;
use crate::seeds::seed_bank;
use crate::session::QuizSession;
use crate::store::{DocumentStore, FirestoreStore, MemoryStore};
use crate::upload::ImageHost;

struct TrackedSession {
    session: QuizSession,
    touched: Instant,
}

/// HTTP quiz sessions by id. Every access refreshes the entry; an entry idle
/// for `idle_ttl` or longer is gone.
pub struct SessionRegistry {
    entries: RwLock<HashMap<Uuid, TrackedSession>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), idle_ttl }
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    fn is_idle(&self, tracked: &TrackedSession, now: Instant) -> bool {
        now.saturating_duration_since(tracked.touched) >= self.idle_ttl
    }

    pub async fn insert(&self, session: QuizSession) -> Uuid {
        let id = Uuid::new_v4();
        let tracked = TrackedSession { session, touched: Instant::now() };
        self.entries.write().await.insert(id, tracked);
        id
    }

    pub async fn remove(&self, id: Uuid) -> Option<QuizSession> {
        self.entries.write().await.remove(&id).map(|t| t.session)
    }

    /// Run `f` on a live session and mark it touched. Idle entries are dropped
    /// here even if the sweeper has not reached them yet.
    pub async fn with_session<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut QuizSession) -> Result<R, ApiError>,
    ) -> Result<R, ApiError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let idle = match entries.get(&id) {
            Some(tracked) => self.is_idle(tracked, now),
            None => return Err(session_not_found(id)),
        };
        if idle {
            entries.remove(&id);
            debug!(target: "quiz", %id, "Idle session expired on access");
            return Err(session_not_found(id));
        }
        let tracked = entries.get_mut(&id).ok_or_else(|| session_not_found(id))?;
        tracked.touched = now;
        f(&mut tracked.session)
    }

    /// Drop every idle entry; returns how many went.
    pub async fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, tracked| !self.is_idle(tracked, now));
        let evicted = before - entries.len();
        if evicted > 0 {
            info!(target: "quiz", evicted, remaining = entries.len(), "Evicted idle sessions");
        }
        evicted
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Periodic sweep of idle sessions, a few times per idle window.
pub fn spawn_idle_sweeper(registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    let period = (registry.idle_ttl() / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            registry.sweep_idle().await;
        }
    })
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub loader: QuestionPoolLoader,
    pub images: Option<ImageHost>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    /// Build state from env: pick the store backend, seed it if in-memory, init the image host.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let store: Arc<dyn DocumentStore> = match store_backend_from_env() {
            StoreBackend::Firestore => match FirestoreStore::from_env() {
                Some(fs) => {
                    info!(target: "nihongo_quiz", "Using Firestore document store");
                    Arc::new(fs)
                }
                None => {
                    error!(target: "nihongo_quiz", "QUIZ_STORE=firestore but FIRESTORE_PROJECT_ID is not set; using memory store");
                    Arc::new(memory_store_from_env())
                }
            },
            StoreBackend::Memory => Arc::new(memory_store_from_env()),
        };

        let images = ImageHost::from_env();
        if let Some(host) = &images {
            info!(target: "nihongo_quiz", cloud_name = %host.cloud_name(), "Image uploads enabled.");
        } else {
            info!(target: "nihongo_quiz", "Image uploads disabled (no CLOUDINARY_CLOUD_NAME / CLOUDINARY_UPLOAD_PRESET).");
        }

        let idle_ttl = session_idle_from_env();
        info!(target: "nihongo_quiz", idle_secs = idle_ttl.as_secs(), "HTTP sessions expire when idle");
        let state = Self::with_store(store, images).with_session_idle(idle_ttl);
        spawn_idle_sweeper(state.sessions.clone());
        state
    }

    pub fn with_store(store: Arc<dyn DocumentStore>, images: Option<ImageHost>) -> Self {
        Self {
            loader: QuestionPoolLoader::new(store.clone()),
            store,
            images,
            sessions: Arc::new(SessionRegistry::new(Duration::from_secs(DEFAULT_SESSION_IDLE_SECS))),
        }
    }

    /// Fresh registry with a different idle window.
    pub fn with_session_idle(self, idle_ttl: Duration) -> Self {
        Self { sessions: Arc::new(SessionRegistry::new(idle_ttl)), ..self }
    }

    #[instrument(level = "debug", skip(self, session), fields(category_id = %session.category().id))]
    pub async fn insert_session(&self, session: QuizSession) -> Uuid {
        self.sessions.insert(session).await
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn remove_session(&self, id: Uuid) -> Option<QuizSession> {
        self.sessions.remove(id).await
    }
}

fn memory_store_from_env() -> MemoryStore {
    match load_content_bank_from_env() {
        Some(bank) => MemoryStore::new(bank),
        None => {
            info!(target: "nihongo_quiz", "No content bank loaded; using built-in seeds");
            MemoryStore::new(seed_bank())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeds::seed_bank;
    use crate::testing::category;

    fn idle_state(idle_ttl: Duration) -> AppState {
        AppState::with_store(Arc::new(MemoryStore::new(seed_bank())), None).with_session_idle(idle_ttl)
    }

    #[tokio::test]
    async fn idle_sessions_are_swept() {
        let state = idle_state(Duration::ZERO);
        for _ in 0..5 {
            state.insert_session(QuizSession::new(category("k", "kotoba"), None)).await;
        }
        assert_eq!(state.sessions.len().await, 5);
        assert_eq!(state.sessions.sweep_idle().await, 5);
        assert_eq!(state.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn idle_session_is_gone_on_access() {
        let state = idle_state(Duration::ZERO);
        let id = state.insert_session(QuizSession::new(category("k", "kotoba"), None)).await;
        let err = state.sessions.with_session(id, |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(state.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn active_sessions_survive_a_sweep() {
        let state = idle_state(Duration::from_secs(3600));
        let id = state.insert_session(QuizSession::new(category("k", "kotoba"), None)).await;
        assert_eq!(state.sessions.sweep_idle().await, 0);
        let category_id = state.sessions.with_session(id, |s| Ok(s.category().id.clone())).await.unwrap();
        assert_eq!(category_id, "k");
        assert!(state.remove_session(id).await.is_some());
    }
}
