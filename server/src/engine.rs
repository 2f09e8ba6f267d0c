//! Process-wide state manager.
//!
//! One `RaceEngine` owns the room registry, chat logs and clock registry and
//! hands collaborator handles to each component. Socket tasks only talk to the
//! engine: they register a connection, feed it decoded events and unregister it.

use crate::chat::ChatRelay;
use crate::client_manager::{ClientId, Outbox};
use crate::config::RaceConfig;
use crate::error::RaceError;
use crate::gate::ConnectionGate;
use crate::join::JoinCoordinator;
use crate::matchmaking::MatchmakingPool;
use crate::race_clock::{ClockContext, ClockRegistry, PrizePolicy, WinnerTakesAll};
use crate::rooms::{race_room, RoomBroadcaster};
use crate::store::{Collaborators, Identity};
use log::{debug, error, warn};
use shared::{ClientEvent, Namespace, ServerEvent, Strafe, TrackList};
use std::net::SocketAddr;
use std::sync::Arc;

pub struct RaceEngine {
    config: RaceConfig,
    gate: ConnectionGate,
    rooms: Arc<RoomBroadcaster>,
    pool: MatchmakingPool,
    joins: JoinCoordinator,
    clocks: Arc<ClockRegistry>,
    chat: ChatRelay,
}

impl RaceEngine {
    pub fn new(config: RaceConfig, collaborators: Collaborators) -> Self {
        let prizes: Arc<dyn PrizePolicy> = Arc::new(WinnerTakesAll {
            prize: config.prize,
        });
        Self::with_prize_policy(config, collaborators, prizes)
    }

    pub fn with_prize_policy(
        config: RaceConfig,
        collaborators: Collaborators,
        prizes: Arc<dyn PrizePolicy>,
    ) -> Self {
        let rooms = Arc::new(RoomBroadcaster::new(config.max_clients));
        let pool = MatchmakingPool::new(collaborators.tracks.clone(), config.list_limit);
        let clocks = Arc::new(ClockRegistry::new(
            ClockContext {
                tracks: collaborators.tracks.clone(),
                scores: collaborators.scores.clone(),
                identities: collaborators.identities.clone(),
                rooms: rooms.clone(),
                prizes,
            },
            config.tick_interval,
        ));
        let joins = JoinCoordinator::new(
            collaborators.tracks.clone(),
            collaborators.identities.clone(),
            rooms.clone(),
            clocks.clone(),
            pool.clone(),
            config.min_awaiting,
        );
        let chat = ChatRelay::new(rooms.clone(), collaborators.identities.clone());

        Self {
            gate: ConnectionGate::new(collaborators.auth),
            config,
            rooms,
            pool,
            joins,
            clocks,
            chat,
        }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn gate(&self) -> &ConnectionGate {
        &self.gate
    }

    pub fn rooms(&self) -> &Arc<RoomBroadcaster> {
        &self.rooms
    }

    pub fn clocks(&self) -> &Arc<ClockRegistry> {
        &self.clocks
    }

    pub fn chat(&self) -> &ChatRelay {
        &self.chat
    }

    /// Registers an authenticated connection. None when the server is full.
    pub async fn connect(
        &self,
        identity: Identity,
        namespace: Namespace,
        addr: SocketAddr,
        outbox: Outbox,
    ) -> Option<ClientId> {
        self.rooms.register(identity, namespace, addr, outbox).await
    }

    /// Track state is untouched; the player stays listed and may `loadTrack` later.
    pub async fn disconnect(&self, client_id: ClientId) {
        self.rooms.disconnect(client_id).await;
    }

    /// Decodes one text frame and dispatches it.
    pub async fn handle_text(&self, client_id: ClientId, text: &str) {
        match ClientEvent::from_json(text) {
            Ok(event) => self.handle_event(client_id, event).await,
            Err(e) => {
                debug!("Client {} sent a malformed frame: {}", client_id, e);
                self.report(client_id, RaceError::from(e)).await;
            }
        }
    }

    /// Runs one client event. Failures are answered on the requesting
    /// connection only, never broadcast to the room.
    pub async fn handle_event(&self, client_id: ClientId, event: ClientEvent) {
        let Some((identity, namespace)) = self.rooms.identity(client_id).await else {
            warn!("Event from unregistered client {}", client_id);
            return;
        };
        if !event.is_supported_on(namespace) {
            self.report(client_id, RaceError::UnsupportedEvent).await;
            return;
        }

        let result = match event {
            ClientEvent::GetTracks => self.list_tracks(client_id).await,
            ClientEvent::JoinTrack(request) => self
                .joins
                .join(client_id, &identity, request)
                .await
                .map(|_| ()),
            ClientEvent::LoadTrack(request) => self
                .joins
                .load(client_id, &request.track_id)
                .await
                .map(|_| ()),
            ClientEvent::MoveX(strafe) => self.relay_strafe(client_id, strafe).await,
            ClientEvent::JoinChat(request) => {
                self.chat.join(client_id, &request.track_id).await;
                Ok(())
            }
            ClientEvent::Message(post) => self
                .chat
                .post(&post.chat_id, &identity, post.message)
                .await
                .map(|_| ()),
        };

        if let Err(e) = result {
            self.report(client_id, e).await;
        }
    }

    async fn list_tracks(&self, client_id: ClientId) -> Result<(), RaceError> {
        let tracks = self
            .pool
            .ensure_awaiting_tracks(self.config.min_awaiting)
            .await?;
        self.rooms
            .send(client_id, &ServerEvent::InitTracks(TrackList { tracks }))
            .await;
        Ok(())
    }

    async fn relay_strafe(&self, client_id: ClientId, strafe: Strafe) -> Result<(), RaceError> {
        let room = race_room(&strafe.track_id);
        if !self.rooms.is_member(client_id, &room).await {
            return Err(RaceError::NotInRoom);
        }
        self.rooms.emit(&room, &ServerEvent::MoveXUpdate(strafe)).await;
        Ok(())
    }

    async fn report(&self, client_id: ClientId, err: RaceError) {
        if err.is_client_facing() {
            debug!("Client {} request rejected: {}", client_id, err);
        } else {
            error!("Client {} request failed: {}", client_id, err);
        }
        self.rooms
            .send(client_id, &ServerEvent::error(err.client_message()))
            .await;
    }

    /// Stops every race clock. Track records are left as they are.
    pub async fn shutdown(&self) {
        self.clocks.shutdown().await;
    }
}
