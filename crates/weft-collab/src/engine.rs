//! The session engine: one table, one reader-writer guard.
//!
//! Operations are short (O(users in session)), so a single `RwLock` over the
//! whole table is sufficient. Every state-mutating call refreshes the
//! enclosing session's `updated_at`; the sweeper drops sessions idle past
//! the configured age.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};
use weft_core::{UserId, WorkflowId};

use crate::error::{CollabError, CollabResult};
use crate::palette::pick_colour;
use crate::session::{CursorPosition, EditSession, ElementKind, ElementLock, Presence};

/// What fell out of a [`SessionEngine::leave_session`] call, so the
/// WebSocket layer can emit the matching `lock_released` / `user_left`
/// frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Element ids whose locks the leaver held.
    pub released_locks: Vec<String>,
    /// Whether the session was destroyed because the last user left.
    pub session_removed: bool,
}

/// In-memory collaboration sessions keyed by graph.
#[derive(Debug, Default)]
pub struct SessionEngine {
    sessions: RwLock<HashMap<WorkflowId, EditSession>>,
}

impl SessionEngine {
    /// Create an empty session table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a graph's session, creating the session if absent.
    ///
    /// A returning user keeps their colour; a new user gets one from the
    /// palette. Returns the stored presence.
    pub fn join_session(
        &self,
        graph: WorkflowId,
        user: &UserId,
        user_name: &str,
    ) -> Presence {
        let mut sessions = self.write();
        let session = sessions.entry(graph).or_insert_with(EditSession::new);
        let now = Utc::now();
        let presence = session
            .users
            .entry(user.clone())
            .and_modify(|p| {
                p.user_name = user_name.to_owned();
                p.updated_at = now;
            })
            .or_insert_with(|| Presence {
                user_id: user.clone(),
                user_name: user_name.to_owned(),
                color: pick_colour().to_owned(),
                cursor: None,
                selection: None,
                joined_at: now,
                updated_at: now,
            })
            .clone();
        session.touch();
        debug!(%graph, %user, "user joined session");
        presence
    }

    /// Leave a session: drop presence, release every lock the user owns,
    /// and destroy the session if it has no users left.
    ///
    /// # Errors
    ///
    /// [`CollabError::SessionNotFound`] if the graph has no session.
    pub fn leave_session(&self, graph: WorkflowId, user: &UserId) -> CollabResult<LeaveOutcome> {
        let mut sessions = self.write();
        let session = sessions.get_mut(&graph).ok_or(CollabError::SessionNotFound)?;

        session.users.remove(user);
        let released: Vec<String> = session
            .locks
            .iter()
            .filter(|(_, lock)| &lock.owner == user)
            .map(|(element, _)| element.clone())
            .collect();
        for element in &released {
            session.locks.remove(element);
        }
        session.touch();

        let session_removed = session.users.is_empty();
        if session_removed {
            sessions.remove(&graph);
            debug!(%graph, "last user left, session destroyed");
        }
        debug!(%graph, %user, locks = released.len(), "user left session");
        Ok(LeaveOutcome {
            released_locks: released,
            session_removed,
        })
    }

    /// Update a user's cursor and/or selection.
    ///
    /// # Errors
    ///
    /// [`CollabError::SessionNotFound`] or [`CollabError::UserNotInSession`].
    pub fn update_presence(
        &self,
        graph: WorkflowId,
        user: &UserId,
        cursor: Option<CursorPosition>,
        selection: Option<Vec<String>>,
    ) -> CollabResult<Presence> {
        let mut sessions = self.write();
        let session = sessions.get_mut(&graph).ok_or(CollabError::SessionNotFound)?;
        let presence = session
            .users
            .get_mut(user)
            .ok_or_else(|| CollabError::UserNotInSession(user.clone()))?;

        if cursor.is_some() {
            presence.cursor = cursor;
        }
        if selection.is_some() {
            presence.selection = selection;
        }
        presence.updated_at = Utc::now();
        let snapshot = presence.clone();
        session.touch();
        Ok(snapshot)
    }

    /// Acquire an exclusive lock on a graph element.
    ///
    /// Re-acquiring a lock the caller already owns refreshes its timestamp.
    ///
    /// # Errors
    ///
    /// [`CollabError::LockHeld`] if another user owns the lock;
    /// [`CollabError::SessionNotFound`] / [`CollabError::UserNotInSession`]
    /// if the caller is unknown.
    pub fn acquire_lock(
        &self,
        graph: WorkflowId,
        user: &UserId,
        element_id: &str,
        element_kind: ElementKind,
    ) -> CollabResult<ElementLock> {
        let mut sessions = self.write();
        let session = sessions.get_mut(&graph).ok_or(CollabError::SessionNotFound)?;
        if !session.users.contains_key(user) {
            return Err(CollabError::UserNotInSession(user.clone()));
        }

        if let Some(existing) = session.locks.get(element_id)
            && &existing.owner != user
        {
            let owner_name = session
                .users
                .get(&existing.owner)
                .map_or_else(String::new, |p| p.user_name.clone());
            return Err(CollabError::LockHeld {
                element_id: element_id.to_owned(),
                owner: existing.owner.clone(),
                owner_name,
            });
        }

        let lock = ElementLock {
            element_id: element_id.to_owned(),
            element_kind,
            owner: user.clone(),
            acquired_at: Utc::now(),
        };
        session.locks.insert(element_id.to_owned(), lock.clone());
        session.touch();
        debug!(%graph, %user, element_id, "lock acquired");
        Ok(lock)
    }

    /// Release a lock. Releasing an element nobody holds is a no-op that
    /// returns `false`.
    ///
    /// # Errors
    ///
    /// [`CollabError::NotLockOwner`] if another user owns the lock;
    /// [`CollabError::SessionNotFound`] if the graph has no session.
    pub fn release_lock(
        &self,
        graph: WorkflowId,
        user: &UserId,
        element_id: &str,
    ) -> CollabResult<bool> {
        let mut sessions = self.write();
        let session = sessions.get_mut(&graph).ok_or(CollabError::SessionNotFound)?;

        match session.locks.get(element_id) {
            None => Ok(false),
            Some(lock) if &lock.owner != user => Err(CollabError::NotLockOwner {
                element_id: element_id.to_owned(),
            }),
            Some(_) => {
                session.locks.remove(element_id);
                session.touch();
                debug!(%graph, %user, element_id, "lock released");
                Ok(true)
            }
        }
    }

    /// Snapshot of every user in a graph's session. Empty if no session.
    #[must_use]
    pub fn get_active_users(&self, graph: WorkflowId) -> Vec<Presence> {
        self.read()
            .get(&graph)
            .map_or_else(Vec::new, |s| s.users.values().cloned().collect())
    }

    /// Snapshot of every live lock in a graph's session. Empty if no session.
    #[must_use]
    pub fn get_active_locks(&self, graph: WorkflowId) -> Vec<ElementLock> {
        self.read()
            .get(&graph)
            .map_or_else(Vec::new, |s| s.locks.values().cloned().collect())
    }

    /// Drop sessions idle for longer than `max_age`. Returns how many were
    /// removed.
    pub fn cleanup_inactive_sessions(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at > cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "swept idle collaboration sessions");
        }
        removed
    }

    /// Spawn the periodic idle sweeper.
    #[must_use]
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.cleanup_inactive_sessions(max_age);
            }
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<WorkflowId, EditSession>> {
        match self.sessions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<WorkflowId, EditSession>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        UserId::new(name)
    }

    #[test]
    fn join_assigns_a_palette_colour() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        let presence = engine.join_session(graph, &user("u1"), "Ada");
        assert!(crate::PRESENCE_PALETTE.contains(&presence.color.as_str()));
        assert_eq!(engine.get_active_users(graph).len(), 1);
    }

    #[test]
    fn rejoin_keeps_the_colour() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        let first = engine.join_session(graph, &user("u1"), "Ada");
        let second = engine.join_session(graph, &user("u1"), "Ada L.");
        assert_eq!(first.color, second.color);
        assert_eq!(second.user_name, "Ada L.");
        assert_eq!(engine.get_active_users(graph).len(), 1);
    }

    #[test]
    fn lock_contention_is_first_writer_wins() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        let (u1, u2) = (user("u1"), user("u2"));
        engine.join_session(graph, &u1, "Ada");
        engine.join_session(graph, &u2, "Grace");

        engine.acquire_lock(graph, &u1, "n1", ElementKind::Node).unwrap();
        let err = engine
            .acquire_lock(graph, &u2, "n1", ElementKind::Node)
            .unwrap_err();
        match err {
            CollabError::LockHeld { owner, owner_name, .. } => {
                assert_eq!(owner, u1);
                assert_eq!(owner_name, "Ada");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn same_user_reacquire_refreshes_the_timestamp() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        let u1 = user("u1");
        engine.join_session(graph, &u1, "Ada");

        let first = engine.acquire_lock(graph, &u1, "n1", ElementKind::Node).unwrap();
        let second = engine.acquire_lock(graph, &u1, "n1", ElementKind::Node).unwrap();
        assert_eq!(first.owner, second.owner);
        assert!(second.acquired_at >= first.acquired_at);
        assert_eq!(engine.get_active_locks(graph).len(), 1);
    }

    #[test]
    fn leave_releases_locks_and_destroys_empty_sessions() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        let (u1, u2) = (user("u1"), user("u2"));
        engine.join_session(graph, &u1, "Ada");
        engine.join_session(graph, &u2, "Grace");
        engine.acquire_lock(graph, &u1, "n1", ElementKind::Node).unwrap();
        engine.acquire_lock(graph, &u1, "e1", ElementKind::Edge).unwrap();

        let outcome = engine.leave_session(graph, &u1).unwrap();
        assert_eq!(outcome.released_locks.len(), 2);
        assert!(!outcome.session_removed);

        // u2 can now take the contested element.
        engine.acquire_lock(graph, &u2, "n1", ElementKind::Node).unwrap();

        let outcome = engine.leave_session(graph, &u2).unwrap();
        assert!(outcome.session_removed);
        assert!(engine.get_active_users(graph).is_empty());
    }

    #[test]
    fn release_by_non_owner_fails() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        let (u1, u2) = (user("u1"), user("u2"));
        engine.join_session(graph, &u1, "Ada");
        engine.join_session(graph, &u2, "Grace");
        engine.acquire_lock(graph, &u1, "n1", ElementKind::Node).unwrap();

        assert!(matches!(
            engine.release_lock(graph, &u2, "n1"),
            Err(CollabError::NotLockOwner { .. })
        ));
        // Releasing an unlocked element is a quiet no-op.
        assert!(!engine.release_lock(graph, &u2, "n2").unwrap());
    }

    #[test]
    fn presence_updates_require_membership() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        engine.join_session(graph, &user("u1"), "Ada");

        assert!(matches!(
            engine.update_presence(graph, &user("ghost"), None, None),
            Err(CollabError::UserNotInSession(_))
        ));

        let presence = engine
            .update_presence(
                graph,
                &user("u1"),
                Some(CursorPosition { x: 10.0, y: 20.0 }),
                Some(vec!["n1".to_owned()]),
            )
            .unwrap();
        assert_eq!(presence.cursor, Some(CursorPosition { x: 10.0, y: 20.0 }));
        assert_eq!(presence.selection.as_deref(), Some(&["n1".to_owned()][..]));
    }

    #[test]
    fn sweep_drops_only_idle_sessions() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        engine.join_session(graph, &user("u1"), "Ada");

        // Fresh session survives a generous cutoff.
        assert_eq!(engine.cleanup_inactive_sessions(Duration::from_secs(3600)), 0);
        // Zero max age sweeps everything.
        assert_eq!(engine.cleanup_inactive_sessions(Duration::ZERO), 1);
        assert!(engine.get_active_users(graph).is_empty());
    }

    #[test]
    fn operations_on_missing_sessions_fail() {
        let engine = SessionEngine::new();
        let graph = WorkflowId::new();
        assert_eq!(
            engine.leave_session(graph, &user("u1")),
            Err(CollabError::SessionNotFound)
        );
        assert!(matches!(
            engine.acquire_lock(graph, &user("u1"), "n1", ElementKind::Node),
            Err(CollabError::SessionNotFound)
        ));
    }
}
