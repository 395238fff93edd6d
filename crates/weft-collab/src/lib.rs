//! Weft Collab - In-memory collaboration sessions for concurrent graph editing.
//!
//! This crate provides:
//! - Per-graph edit sessions tracking who is editing and what they touch
//! - Presence (cursor, selection, palette colour) per user
//! - Exclusive, non-reentrant-across-users element locks
//! - Idle-session garbage collection with a background sweeper
//!
//! State is purely in-memory; sessions do not survive a restart. Deleting a
//! session does not notify clients; the WebSocket layer emits the
//! corresponding `user_left` / `lock_released` frames.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod engine;
mod error;
mod palette;
mod session;

pub use engine::{LeaveOutcome, SessionEngine};
pub use error::{CollabError, CollabResult};
pub use palette::PRESENCE_PALETTE;
pub use session::{CursorPosition, ElementKind, ElementLock, Presence};
