//! Player admission and the AWAITING to ACTIVE transition.
//!
//! The coordinator holds no lock across collaborator calls. The store's
//! `admit_player` is the only serialization point for a track, and exactly one
//! admission call can observe `activated`, so that call alone starts the clock.

use crate::client_manager::ClientId;
use crate::error::RaceError;
use crate::matchmaking::MatchmakingPool;
use crate::race_clock::ClockRegistry;
use crate::rooms::{race_room, RoomBroadcaster};
use crate::store::{Admission, Identity, IdentityLookup, PlayerSeed, TrackStore};
use crate::utils::pick_lane;
use log::{info, warn};
use shared::{
    default_fuel, Fuel, JoinRequest, Joined, Namespace, ServerEvent, Ship, Track, TrackList,
    TrackStatus,
};
use std::sync::Arc;

pub struct JoinCoordinator {
    tracks: Arc<dyn TrackStore>,
    identities: Arc<dyn IdentityLookup>,
    rooms: Arc<RoomBroadcaster>,
    clocks: Arc<ClockRegistry>,
    pool: MatchmakingPool,
    min_awaiting: usize,
}

impl JoinCoordinator {
    pub fn new(
        tracks: Arc<dyn TrackStore>,
        identities: Arc<dyn IdentityLookup>,
        rooms: Arc<RoomBroadcaster>,
        clocks: Arc<ClockRegistry>,
        pool: MatchmakingPool,
        min_awaiting: usize,
    ) -> Self {
        Self {
            tracks,
            identities,
            rooms,
            clocks,
            pool,
            min_awaiting,
        }
    }

    async fn player_seed(
        &self,
        identity: &Identity,
        fuel: Vec<Fuel>,
    ) -> Result<PlayerSeed, RaceError> {
        let profile = self.identities.get_by_id(&identity.id).await?;
        let (name, picture) = match profile {
            Some(profile) => (profile.name, profile.picture),
            None => (identity.email.clone(), None),
        };
        let x = pick_lane(&mut rand::thread_rng());
        Ok(PlayerSeed {
            identity: identity.clone(),
            name,
            picture,
            ship: Ship::default(),
            x,
            fuel: if fuel.is_empty() { default_fuel() } else { fuel },
        })
    }

    /// Admits a player to an AWAITING track and fans the result out.
    pub async fn join(
        &self,
        client_id: ClientId,
        identity: &Identity,
        request: JoinRequest,
    ) -> Result<Admission, RaceError> {
        let track = self
            .tracks
            .get_by_id(&request.track_id)
            .await?
            .ok_or(RaceError::TrackNotFound)?;
        if track.status != TrackStatus::Awaiting {
            return Err(RaceError::TrackNotJoinable(track.status));
        }

        let seed = self.player_seed(identity, request.fuel).await?;
        let admission = match self.tracks.admit_player(&track.id, seed).await {
            Ok(admission) => admission,
            Err(RaceError::AdmissionConflict(player)) => {
                self.resolve_conflict(&track.id, identity, player).await?
            }
            Err(e) => return Err(e),
        };

        let room = race_room(&track.id);
        self.rooms.join(client_id, &room).await;

        let player = admission
            .track
            .player(&identity.id)
            .cloned()
            .ok_or_else(|| {
                RaceError::CollaboratorUnavailable(format!(
                    "store did not list {} on track {}",
                    identity.id, track.id
                ))
            })?;
        let joined = ServerEvent::JoinedTrack(Joined {
            track_id: track.id.clone(),
            player,
        });
        if admission.admitted {
            info!(
                "Player {} admitted to track {} as #{}{}",
                identity.id,
                track.id,
                admission.track.players.len(),
                if admission.activated { ", race full" } else { "" }
            );
            self.rooms.emit(&room, &joined).await;
        } else {
            // Rejoin: resubscribe quietly, tell only the caller.
            self.rooms.send(client_id, &joined).await;
        }

        if admission.activated && self.clocks.start(&admission.track).await {
            self.rooms
                .emit(&room, &ServerEvent::Start(admission.track.start_descriptor()))
                .await;
        }

        self.publish_lobby(&room).await;
        Ok(admission)
    }

    /// The store reported a competing admission. Only a caller that ended up
    /// listed anyway gets an idempotent success.
    async fn resolve_conflict(
        &self,
        track_id: &str,
        identity: &Identity,
        player: String,
    ) -> Result<Admission, RaceError> {
        let current = self
            .tracks
            .get_by_id(track_id)
            .await?
            .ok_or(RaceError::TrackNotFound)?;
        if current.has_player(&identity.id) {
            return Ok(Admission {
                track: current,
                admitted: false,
                activated: false,
            });
        }
        Err(RaceError::AdmissionConflict(player))
    }

    async fn publish_lobby(&self, room: &str) {
        let tracks = match self.pool.ensure_awaiting_tracks(self.min_awaiting).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Could not refresh lobby after join: {}", e);
                return;
            }
        };
        let listing = ServerEvent::InitTracks(TrackList { tracks });
        self.rooms.emit(room, &listing).await;
        self.rooms
            .emit_namespace(Namespace::Tracks, Some(room), &listing)
            .await;
    }

    /// Late joiner or reconnect to an ACTIVE track: resubscribe and resend `start`.
    pub async fn load(&self, client_id: ClientId, track_id: &str) -> Result<Track, RaceError> {
        let track = self
            .tracks
            .get_by_id(track_id)
            .await?
            .ok_or(RaceError::TrackNotFound)?;
        if track.status != TrackStatus::Active {
            return Err(RaceError::TrackNotActive);
        }

        self.rooms.join(client_id, &race_room(&track.id)).await;
        self.rooms
            .send(client_id, &ServerEvent::Start(track.start_descriptor()))
            .await;
        Ok(track)
    }
}
