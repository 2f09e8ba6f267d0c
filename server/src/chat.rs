//! Per-track chat log with room fan-out.

use crate::client_manager::ClientId;
use crate::error::RaceError;
use crate::rooms::{chat_room, RoomBroadcaster};
use crate::store::{Identity, IdentityLookup};
use crate::utils::now_millis;
use shared::{ChatEntry, ServerEvent, TrackId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct ChatRelay {
    logs: RwLock<HashMap<TrackId, Vec<ChatEntry>>>,
    rooms: Arc<RoomBroadcaster>,
    identities: Arc<dyn IdentityLookup>,
}

impl ChatRelay {
    pub fn new(rooms: Arc<RoomBroadcaster>, identities: Arc<dyn IdentityLookup>) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            rooms,
            identities,
        }
    }

    /// Subscribes the connection and sends the whole log to the room.
    pub async fn join(&self, client_id: ClientId, track_id: &str) {
        self.rooms.join(client_id, &chat_room(track_id)).await;
        let log = {
            let mut logs = self.logs.write().await;
            logs.entry(track_id.to_string()).or_default().clone()
        };
        self.rooms
            .emit(&chat_room(track_id), &ServerEvent::JoinedChat(log))
            .await;
    }

    /// Appends a message and broadcasts the updated log.
    pub async fn post(
        &self,
        track_id: &str,
        author: &Identity,
        message: String,
    ) -> Result<ChatEntry, RaceError> {
        let name = self
            .identities
            .get_by_id(&author.id)
            .await?
            .map(|profile| profile.name)
            .unwrap_or_else(|| author.email.clone());
        let entry = ChatEntry {
            author: name,
            user_id: author.id.clone(),
            ts: now_millis(),
            message,
        };

        let log = {
            let mut logs = self.logs.write().await;
            let log = logs.entry(track_id.to_string()).or_default();
            log.push(entry.clone());
            log.clone()
        };
        self.rooms
            .emit(&chat_room(track_id), &ServerEvent::UpdateChat(log))
            .await;
        Ok(entry)
    }

    pub async fn history(&self, track_id: &str) -> Vec<ChatEntry> {
        let logs = self.logs.read().await;
        logs.get(track_id).cloned().unwrap_or_default()
    }
}
