//! Session state: presence and element locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::UserId;

/// A cursor position on the editor canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Canvas x coordinate.
    pub x: f64,
    /// Canvas y coordinate.
    pub y: f64,
}

/// An editor's visible state inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// The user.
    pub user_id: UserId,
    /// Display name, as shown next to the cursor.
    pub user_name: String,
    /// Assigned palette colour.
    pub color: String,
    /// Last reported cursor position.
    pub cursor: Option<CursorPosition>,
    /// Element ids the user has selected.
    pub selection: Option<Vec<String>>,
    /// When the user joined.
    pub joined_at: DateTime<Utc>,
    /// Last presence change.
    pub updated_at: DateTime<Utc>,
}

/// What kind of graph element a lock covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A node.
    Node,
    /// An edge.
    Edge,
}

/// An exclusive claim on one graph element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementLock {
    /// The locked element.
    pub element_id: String,
    /// What kind of element it is.
    pub element_kind: ElementKind,
    /// The lock owner.
    pub owner: UserId,
    /// When the lock was taken or last refreshed.
    pub acquired_at: DateTime<Utc>,
}

/// One graph's edit session. Exists only while it has users.
#[derive(Debug)]
pub(crate) struct EditSession {
    pub(crate) users: std::collections::HashMap<UserId, Presence>,
    pub(crate) locks: std::collections::HashMap<String, ElementLock>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl EditSession {
    pub(crate) fn new() -> Self {
        Self {
            users: std::collections::HashMap::new(),
            locks: std::collections::HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
