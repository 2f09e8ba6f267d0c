//! Named multicast groups over live connections.
//!
//! A room is nothing but the set of connection ids subscribed to it. Rooms are
//! created on first subscription and dropped as soon as they empty out, so the
//! membership map is a pure projection of the connections that are still open.

use crate::client_manager::{ClientId, ClientManager, Outbox};
use crate::store::Identity;
use log::{debug, error};
use shared::{Namespace, ServerEvent};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tokio::sync::RwLock;

pub fn race_room(track_id: &str) -> String {
    format!("race:{}", track_id)
}

pub fn chat_room(track_id: &str) -> String {
    format!("chat:{}", track_id)
}

pub struct RoomBroadcaster {
    clients: RwLock<ClientManager>,
    rooms: RwLock<HashMap<String, HashSet<ClientId>>>,
}

fn encode(event: &ServerEvent) -> Option<String> {
    match event.to_json() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to encode {} event: {}", event.name(), e);
            None
        }
    }
}

impl RoomBroadcaster {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: RwLock::new(ClientManager::new(max_clients)),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an authenticated connection. None when the server is full.
    pub async fn register(
        &self,
        identity: Identity,
        namespace: Namespace,
        addr: SocketAddr,
        outbox: Outbox,
    ) -> Option<ClientId> {
        let mut clients = self.clients.write().await;
        clients.add_client(identity, namespace, addr, outbox)
    }

    /// Drops a connection and every room subscription it held.
    pub async fn disconnect(&self, client_id: ClientId) {
        let removed = {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id)
        };
        if removed.is_none() {
            return;
        }

        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&client_id);
            !members.is_empty()
        });
    }

    pub async fn identity(&self, client_id: ClientId) -> Option<(Identity, Namespace)> {
        let clients = self.clients.read().await;
        clients
            .get(&client_id)
            .map(|client| (client.identity.clone(), client.namespace))
    }

    /// Subscribes a connection to a room. Idempotent; returns true on first join.
    ///
    /// The registry read guard is held across the insert so a concurrent
    /// `disconnect` either sees the new membership or blocks the join.
    pub async fn join(&self, client_id: ClientId, room: &str) -> bool {
        let clients = self.clients.read().await;
        if clients.get(&client_id).is_none() {
            return false;
        }
        let mut rooms = self.rooms.write().await;
        let joined = rooms.entry(room.to_string()).or_default().insert(client_id);
        if joined {
            debug!("Client {} joined room {}", client_id, room);
        }
        joined
    }

    pub async fn is_member(&self, client_id: ClientId, room: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|members| members.contains(&client_id))
            .unwrap_or(false)
    }

    pub async fn members(&self, room: &str) -> Vec<ClientId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Delivers an event to every member of the room, the sender included.
    pub async fn emit(&self, room: &str, event: &ServerEvent) -> usize {
        self.emit_filtered(room, None, event).await
    }

    /// Delivers an event to every member of the room except `exclude`.
    pub async fn emit_except(&self, room: &str, exclude: ClientId, event: &ServerEvent) -> usize {
        self.emit_filtered(room, Some(exclude), event).await
    }

    async fn emit_filtered(
        &self,
        room: &str,
        exclude: Option<ClientId>,
        event: &ServerEvent,
    ) -> usize {
        let members = self.members(room).await;
        if members.is_empty() {
            return 0;
        }
        let Some(frame) = encode(event) else {
            return 0;
        };

        let clients = self.clients.read().await;
        members
            .iter()
            .filter(|id| Some(**id) != exclude)
            .filter(|id| clients.send_to(id, &frame))
            .count()
    }

    /// Delivers an event to a single connection.
    pub async fn send(&self, client_id: ClientId, event: &ServerEvent) -> bool {
        let Some(frame) = encode(event) else {
            return false;
        };
        let clients = self.clients.read().await;
        clients.send_to(&client_id, &frame)
    }

    /// Namespace-wide broadcast that skips members of `skip_room`, who are
    /// expected to get the same event through the room itself.
    pub async fn emit_namespace(
        &self,
        namespace: Namespace,
        skip_room: Option<&str>,
        event: &ServerEvent,
    ) -> usize {
        let skipped: HashSet<ClientId> = match skip_room {
            Some(room) => self.members(room).await.into_iter().collect(),
            None => HashSet::new(),
        };
        let Some(frame) = encode(event) else {
            return 0;
        };

        let clients = self.clients.read().await;
        clients
            .ids_in_namespace(namespace)
            .iter()
            .filter(|id| !skipped.contains(*id))
            .filter(|id| clients.send_to(id, &frame))
            .count()
    }
}
