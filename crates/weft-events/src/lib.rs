//! Weft Events - Room-based fan-out hub and execution event broadcasting.
//!
//! This crate provides:
//! - The [`Hub`]: many-to-many message fan-out organised by rooms, with a
//!   bounded per-client buffer that drops frames for slow consumers only
//! - Typed [`ExecutionEvent`]s emitted by the graph executor
//! - The [`ExecutionBroadcaster`] adapter that encodes each event once and
//!   delivers it to the execution, workflow, and tenant rooms
//! - The WebSocket wire message shapes
//!
//! # Architecture
//!
//! All hub state (clients, room membership) is owned by a single task that
//! receives commands on an mpsc channel. Joins, leaves, and broadcasts are
//! serialized on that channel, so a broadcast sent after a join is delivered
//! to the joined client. The hub holds no history; a restart loses unread
//! frames and clients re-sync through the store.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod broadcaster;
mod event;
mod hub;
mod message;
pub mod room;

pub use broadcaster::ExecutionBroadcaster;
pub use event::{ExecutionEvent, ExecutionScope, StepEvent};
pub use hub::{ClientId, Hub, HubConfig, HubError, HubHandle, HubResult};
pub use message::{CollabMessage, CollabMessageType, ExecutionMessage, ProgressInfo, StepInfo};
