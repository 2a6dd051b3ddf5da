//! Session storage
//!
//! Sessions expire after a fixed inactivity window. Expiry is checked lazily
//! on access and by a periodic sweep (see [`super::spawn_sweeper`]). Every
//! successful access slides the window forward.

use super::clock::Clock;
use super::patch::{SessionPatch, TripLimits};
use super::types::{Role, Session};
use crate::error::{EngineError, EngineResult};
use crate::workflow::Flow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage for trip-planning sessions.
///
/// Missing and expired sessions are reported the same way: `None` from
/// [`SessionStore::get`], [`EngineError::NotFound`] elsewhere.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session with a fresh id at the flow's initial stage
    async fn create(&self, flow: Flow) -> Session;

    /// Fetch a live session, refreshing its last-accessed time
    async fn get(&self, id: &str) -> Option<Session>;

    /// Replace the given fields; `tripInfo` is merged key by key
    async fn update(&self, id: &str, patch: SessionPatch) -> EngineResult<Session>;

    /// Append one conversation entry
    async fn append_conversation(&self, id: &str, role: Role, content: String) -> EngineResult<Session>;

    /// Write back a whole session read earlier.
    ///
    /// Fails with [`EngineError::Conflict`] if the stored version moved on
    /// since `session` was read.
    async fn save(&self, session: Session) -> EngineResult<Session>;

    /// Administrative removal. Returns whether a session was removed.
    async fn remove(&self, id: &str) -> bool;

    /// Drop every expired session. Returns how many were removed.
    async fn sweep_expired(&self) -> usize;

    /// Number of sessions currently held, expired or not
    async fn session_count(&self) -> usize;
}

/// Single-process store backed by a map
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    limits: TripLimits,
}

impl InMemorySessionStore {
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>, limits: TripLimits) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
            limits,
        }
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_accessed > self.ttl
    }

    /// Look up a live session for mutation, evicting it if expired
    fn live_entry<'a>(
        &self,
        sessions: &'a mut HashMap<String, Session>,
        id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<&'a mut Session> {
        let expired = match sessions.get(id) {
            None => return Err(EngineError::NotFound(id.to_string())),
            Some(session) => self.is_expired(session, now),
        };
        if expired {
            sessions.remove(id);
            tracing::info!(session_id = %id, "Session expired on access");
            return Err(EngineError::NotFound(id.to_string()));
        }
        sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, flow: Flow) -> Session {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let session = Session::new(id.clone(), flow, now);
        sessions.insert(id, session.clone());
        tracing::info!(session_id = %session.id, ?flow, "Session created");
        session
    }

    async fn get(&self, id: &str) -> Option<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = self.live_entry(&mut sessions, id, now).ok()?;
        session.last_accessed = now;
        Some(session.clone())
    }

    async fn update(&self, id: &str, patch: SessionPatch) -> EngineResult<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = self.live_entry(&mut sessions, id, now)?;
        patch.apply_to(session, self.limits)?;
        session.version += 1;
        session.last_accessed = now;
        Ok(session.clone())
    }

    async fn append_conversation(&self, id: &str, role: Role, content: String) -> EngineResult<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = self.live_entry(&mut sessions, id, now)?;
        session.append_conversation(role, content, now);
        session.version += 1;
        session.last_accessed = now;
        Ok(session.clone())
    }

    async fn save(&self, mut session: Session) -> EngineResult<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let stored = self.live_entry(&mut sessions, &session.id, now)?;

        if stored.version != session.version {
            return Err(EngineError::Conflict {
                id: session.id.clone(),
                expected: session.version,
                actual: stored.version,
            });
        }
        if session.flow != stored.flow || session.created_at != stored.created_at {
            return Err(EngineError::validation("session identity fields cannot change"));
        }
        let history = stored.conversation_history();
        if !session.conversation_history().starts_with(history) {
            return Err(EngineError::validation("conversation history is append-only"));
        }
        if stored.final_plan().is_some() && stored.final_plan() != session.final_plan() {
            return Err(EngineError::validation("final plan has already been written"));
        }
        session.validate_references()?;

        session.version += 1;
        session.last_accessed = now;
        *stored = session;
        Ok(stored.clone())
    }

    async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Session removed");
        }
        removed
    }

    async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        before - sessions.len()
    }

    async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;
    use crate::session::patch::TripInfoPatch;
    use crate::session::types::Activity;
    use crate::workflow::{Actor, WorkflowStage};
    use std::collections::HashSet;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(30 * 60);

    fn store() -> (InMemorySessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = InMemorySessionStore::new(TTL, clock.clone(), TripLimits::default());
        (store, clock)
    }

    #[tokio::test]
    async fn test_create_returns_unique_ids() {
        let (store, _) = store();
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let session = store.create(Flow::Standard).await;
            assert_eq!(session.workflow_state(), WorkflowStage::InfoGathering);
            assert!(ids.insert(session.id));
        }
        assert_eq!(store.session_count().await, 50);
    }

    #[tokio::test]
    async fn test_get_refreshes_last_accessed() {
        let (store, clock) = store();
        let session = store.create(Flow::Standard).await;

        clock.advance(chrono::Duration::minutes(20));
        let fetched = store.get(&session.id).await.unwrap();
        assert!(fetched.last_accessed > session.last_accessed);

        // Sliding window: 40 minutes after creation but only 20 after last access
        clock.advance(chrono::Duration::minutes(20));
        assert!(store.get(&session.id).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_session_is_not_found() {
        let (store, clock) = store();
        let session = store.create(Flow::Standard).await;

        clock.advance(chrono::Duration::minutes(31));
        assert!(store.get(&session.id).await.is_none());
        assert_eq!(store.session_count().await, 0, "lazy expiry evicts");

        let err = store
            .append_conversation(&session.id, Role::User, "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_deep_merges_trip_info() {
        let (store, _) = store();
        let session = store.create(Flow::Standard).await;

        store
            .update(
                &session.id,
                SessionPatch::trip_info(TripInfoPatch {
                    preferences: Some(vec!["food".into()]),
                    ..TripInfoPatch::default()
                }),
            )
            .await
            .unwrap();
        let updated = store
            .update(
                &session.id,
                SessionPatch::trip_info(TripInfoPatch {
                    destination: Some("Lisbon".into()),
                    ..TripInfoPatch::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.trip_info.destination.as_deref(), Some("Lisbon"));
        assert_eq!(updated.trip_info.preferences, vec!["food".to_string()]);
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn test_update_missing_session() {
        let (store, _) = store();
        let err = store.update("nope", SessionPatch::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_detects_concurrent_write() {
        let (store, _) = store();
        let session = store.create(Flow::Standard).await;

        let mut first = store.get(&session.id).await.unwrap();
        let mut second = first.clone();

        first.suggested_activities.push(Activity::new("a1", "Belem Tower", "landmark"));
        store.save(first).await.unwrap();

        second.transition_to(WorkflowStage::InitialResearch, Actor::Automated).unwrap();
        let err = store.save(second).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict { expected: 0, actual: 1, .. }));

        let stored = store.get(&session.id).await.unwrap();
        assert_eq!(stored.workflow_state(), WorkflowStage::InfoGathering);
        assert_eq!(stored.suggested_activities.len(), 1);
    }

    #[tokio::test]
    async fn test_save_refuses_rewritten_history() {
        let (store, _) = store();
        let session = store.create(Flow::Standard).await;
        store
            .append_conversation(&session.id, Role::User, "first".into())
            .await
            .unwrap();

        let current = store.get(&session.id).await.unwrap();
        // Same version, but history replaced by an empty one
        let mut rewritten = Session::new(session.id.clone(), Flow::Standard, session.created_at);
        rewritten.version = current.version;
        let err = store.save(rewritten).await.unwrap_err();
        assert!(err.to_string().contains("append-only"));
    }

    #[tokio::test]
    async fn test_append_conversation_preserves_order() {
        let (store, _) = store();
        let session = store.create(Flow::Standard).await;
        store.append_conversation(&session.id, Role::User, "one".into()).await.unwrap();
        let updated = store
            .append_conversation(&session.id, Role::Assistant, "two".into())
            .await
            .unwrap();
        let contents: Vec<_> = updated.conversation_history().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (store, clock) = store();
        let old = store.create(Flow::Standard).await;
        clock.advance(chrono::Duration::minutes(20));
        let young = store.create(Flow::Legacy).await;
        clock.advance(chrono::Duration::minutes(15));

        assert_eq!(store.sweep_expired().await, 1);
        assert!(store.get(&old.id).await.is_none());
        assert!(store.get(&young.id).await.is_some());
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _) = store();
        let session = store.create(Flow::Standard).await;
        assert!(store.remove(&session.id).await);
        assert!(!store.remove(&session.id).await);
        assert!(store.get(&session.id).await.is_none());
    }
}
