//! The event hub: many-to-many fan-out organised by rooms.
//!
//! One task owns the client and room tables and drains a command channel;
//! everything else talks to it through a cloneable [`HubHandle`]. Each client
//! owns a bounded frame buffer. A frame that would block is dropped for that
//! client only, with a `slow consumer` warning, so one stalled WebSocket peer
//! can never stall the executor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Errors from hub operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub task has shut down.
    #[error("hub is closed")]
    Closed,
}

/// Result alias for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Identifies one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Hub tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Outbound frames buffered per client before overflow drops.
    pub send_buffer_size: usize,
    /// Commands buffered on the hub's internal channel.
    pub command_buffer_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_buffer_size: 256,
            command_buffer_size: 1024,
        }
    }
}

enum Command {
    Register {
        reply: oneshot::Sender<(ClientId, mpsc::Receiver<Arc<str>>)>,
    },
    Unregister(ClientId),
    Join(ClientId, String),
    Leave(ClientId, String),
    Broadcast(String, Arc<str>),
    RoomSize {
        room: String,
        reply: oneshot::Sender<usize>,
    },
}

#[derive(Debug)]
struct ClientState {
    tx: mpsc::Sender<Arc<str>>,
    rooms: HashSet<String>,
    dropped_frames: u64,
}

/// The hub. Construct with [`Hub::spawn`], which returns the handle used by
/// every producer and subscriber.
#[derive(Debug)]
pub struct Hub {
    config: HubConfig,
    clients: HashMap<ClientId, ClientState>,
    rooms: HashMap<String, HashSet<ClientId>>,
}

impl Hub {
    /// Spawn the hub task and return a handle to it.
    #[must_use]
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (tx, mut rx) = mpsc::channel(config.command_buffer_size.max(1));
        let mut hub = Self {
            config,
            clients: HashMap::new(),
            rooms: HashMap::new(),
        };
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                hub.handle(command);
            }
            debug!("hub task stopping");
        });
        HubHandle { tx }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { reply } => {
                let id = ClientId(Uuid::new_v4());
                let (tx, client_rx) = mpsc::channel(self.config.send_buffer_size.max(1));
                // If the caller went away before the reply, drop the client
                // state again instead of leaking it.
                if reply.send((id, client_rx)).is_ok() {
                    self.clients.insert(
                        id,
                        ClientState {
                            tx,
                            rooms: HashSet::new(),
                            dropped_frames: 0,
                        },
                    );
                    trace!(client = %id, "client registered");
                }
            }
            Command::Unregister(id) => self.remove_client(id),
            Command::Join(id, room) => {
                let Some(client) = self.clients.get_mut(&id) else {
                    return;
                };
                client.rooms.insert(room.clone());
                self.rooms.entry(room.clone()).or_default().insert(id);
                trace!(client = %id, room = %room, "joined room");
            }
            Command::Leave(id, room) => {
                if let Some(client) = self.clients.get_mut(&id) {
                    client.rooms.remove(&room);
                }
                self.detach_from_room(id, &room);
            }
            Command::Broadcast(room, frame) => self.broadcast(&room, &frame),
            Command::RoomSize { room, reply } => {
                let size = self.rooms.get(&room).map_or(0, HashSet::len);
                let _ = reply.send(size);
            }
        }
    }

    fn broadcast(&mut self, room: &str, frame: &Arc<str>) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        let mut dead = Vec::new();
        for id in members {
            let Some(client) = self.clients.get_mut(id) else {
                continue;
            };
            match client.tx.try_send(Arc::clone(frame)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    client.dropped_frames += 1;
                    warn!(
                        client = %id,
                        room = %room,
                        dropped = client.dropped_frames,
                        "slow consumer, dropping frame"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        for id in dead {
            self.remove_client(id);
        }
    }

    fn remove_client(&mut self, id: ClientId) {
        if let Some(client) = self.clients.remove(&id) {
            for room in client.rooms {
                self.detach_from_room(id, &room);
            }
            trace!(client = %id, "client unregistered");
        }
    }

    fn detach_from_room(&mut self, id: ClientId, room: &str) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}

/// Cloneable handle to the hub task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
}

impl HubHandle {
    /// Register a client. Returns its id and the receiving end of its
    /// bounded frame buffer.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task is gone.
    pub async fn register(&self) -> HubResult<(ClientId, mpsc::Receiver<Arc<str>>)> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Register { reply })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Remove a client and drop it from all rooms.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task is gone.
    pub async fn unregister(&self, client: ClientId) -> HubResult<()> {
        self.send(Command::Unregister(client)).await
    }

    /// Add a client to a room.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task is gone.
    pub async fn join(&self, client: ClientId, room: impl Into<String>) -> HubResult<()> {
        self.send(Command::Join(client, room.into())).await
    }

    /// Remove a client from a room.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task is gone.
    pub async fn leave(&self, client: ClientId, room: impl Into<String>) -> HubResult<()> {
        self.send(Command::Leave(client, room.into())).await
    }

    /// Enqueue a frame onto the buffer of every client in the room.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task is gone.
    pub async fn broadcast(&self, room: impl Into<String>, frame: Arc<str>) -> HubResult<()> {
        self.send(Command::Broadcast(room.into(), frame)).await
    }

    /// Number of clients currently in a room. Primarily for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task is gone.
    pub async fn room_size(&self, room: impl Into<String>) -> HubResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::RoomSize {
                room: room.into(),
                reply,
            })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    async fn send(&self, command: Command) -> HubResult<()> {
        self.tx.send(command).await.map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> Arc<str> {
        Arc::from(text)
    }

    #[tokio::test]
    async fn broadcast_reaches_room_members_only() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, mut rx_a) = hub.register().await.unwrap();
        let (_b, mut rx_b) = hub.register().await.unwrap();
        hub.join(a, "execution:1").await.unwrap();

        hub.broadcast("execution:1", frame("hello")).await.unwrap();

        assert_eq!(&*rx_a.recv().await.unwrap(), "hello");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_before_broadcast_is_delivered() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, mut rx) = hub.register().await.unwrap();
        hub.join(a, "room").await.unwrap();
        hub.broadcast("room", frame("m1")).await.unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "m1");
    }

    #[tokio::test]
    async fn leave_stops_delivery() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, mut rx) = hub.register().await.unwrap();
        hub.join(a, "room").await.unwrap();
        hub.leave(a, "room").await.unwrap();
        hub.broadcast("room", frame("m1")).await.unwrap();
        // Serialize behind the broadcast to observe its effect.
        assert_eq!(hub.room_size("room").await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_drops_all_rooms() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, _rx) = hub.register().await.unwrap();
        hub.join(a, "r1").await.unwrap();
        hub.join(a, "r2").await.unwrap();
        hub.unregister(a).await.unwrap();
        assert_eq!(hub.room_size("r1").await.unwrap(), 0);
        assert_eq!(hub.room_size("r2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn slow_consumer_drops_frames_without_blocking() {
        let hub = Hub::spawn(HubConfig {
            send_buffer_size: 2,
            command_buffer_size: 64,
        });
        let (a, mut rx_a) = hub.register().await.unwrap();
        let (b, mut rx_b) = hub.register().await.unwrap();
        hub.join(a, "room").await.unwrap();
        hub.join(b, "room").await.unwrap();

        // Client a never reads. Flood well past its buffer; the hub must
        // stay live and keep serving b.
        for i in 0..50 {
            hub.broadcast("room", frame(&format!("m{i}"))).await.unwrap();
            // Keep b drained so only a overflows.
            while let Ok(f) = rx_b.try_recv() {
                drop(f);
            }
        }
        assert_eq!(hub.room_size("room").await.unwrap(), 2);

        // a still holds only its buffered prefix.
        let mut received = 0;
        while rx_a.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn broadcast_to_empty_room_is_a_noop() {
        let hub = Hub::spawn(HubConfig::default());
        hub.broadcast("nobody", frame("m")).await.unwrap();
        assert_eq!(hub.room_size("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_receiver_is_pruned_on_broadcast() {
        let hub = Hub::spawn(HubConfig::default());
        let (a, rx) = hub.register().await.unwrap();
        hub.join(a, "room").await.unwrap();
        drop(rx);
        hub.broadcast("room", frame("m")).await.unwrap();
        assert_eq!(hub.room_size("room").await.unwrap(), 0);
    }
}
