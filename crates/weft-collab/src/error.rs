//! Collaboration error types.

use weft_core::UserId;

/// Errors from collaboration session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollabError {
    /// No session exists for the graph.
    #[error("no active session for this graph")]
    SessionNotFound,

    /// The acting user has not joined the session.
    #[error("user {0} is not in the session")]
    UserNotInSession(UserId),

    /// The element is locked by someone else.
    #[error("element {element_id} is locked by {owner_name}")]
    LockHeld {
        /// The contested element.
        element_id: String,
        /// The current owner.
        owner: UserId,
        /// The owner's display name, for client-facing messages.
        owner_name: String,
    },

    /// A release was attempted by a user who does not own the lock.
    #[error("lock on {element_id} is owned by another user")]
    NotLockOwner {
        /// The contested element.
        element_id: String,
    },
}

/// Result alias for collaboration operations.
pub type CollabResult<T> = Result<T, CollabError>;
