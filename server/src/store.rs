//! Interfaces of the collaborators the coordinator depends on.
//!
//! The durable track record, scoring, token verification and profile lookup all
//! live behind these traits. Every call is a suspension point: other handlers for
//! the same track may run while one of them is in flight.

use crate::error::RaceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{Fuel, Player, PlayerStat, SettledStanding, Ship, Track};
use std::sync::Arc;

/// Verified caller identity attached to a connection by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub picture: Option<String>,
}

/// Everything the store needs to admit a player except its position,
/// which the store assigns atomically.
#[derive(Debug, Clone)]
pub struct PlayerSeed {
    pub identity: Identity,
    pub name: String,
    pub picture: Option<String>,
    pub ship: Ship,
    pub x: f32,
    pub fuel: Vec<Fuel>,
}

impl PlayerSeed {
    pub fn into_player(self, position: usize) -> Player {
        Player {
            id: self.identity.id,
            email: self.identity.email,
            name: self.name,
            picture: self.picture,
            position,
            ship: self.ship,
            x: self.x,
            fuel: self.fuel,
        }
    }
}

/// Result of an admission attempt.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Track as it stood right after the admission step.
    pub track: Track,
    /// False when the identity was already listed.
    pub admitted: bool,
    /// True only for the call that flipped the track to ACTIVE.
    pub activated: bool,
}

#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn create(&self) -> Result<Track, RaceError>;

    async fn list(&self, limit: usize) -> Result<Vec<Track>, RaceError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Track>, RaceError>;

    /// Linearizable per track id: rejects duplicates as a no-op, appends with
    /// the next free position and flips to ACTIVE once the race is full.
    async fn admit_player(&self, id: &str, seed: PlayerSeed) -> Result<Admission, RaceError>;

    /// Marks the track FINISHED with its final standings. Returns whether this
    /// call performed the transition.
    async fn finish_track(&self, id: &str, results: Vec<SettledStanding>)
        -> Result<bool, RaceError>;
}

#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Per-player stats ranked by score, best first.
    async fn get_stats(&self, track_id: &str, at: u64) -> Result<Vec<PlayerStat>, RaceError>;
}

#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, RaceError>;
}

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Profile>, RaceError>;
}

/// Handles to every external collaborator, cloned into each component.
#[derive(Clone)]
pub struct Collaborators {
    pub tracks: Arc<dyn TrackStore>,
    pub scores: Arc<dyn ScoreProvider>,
    pub auth: Arc<dyn AuthVerifier>,
    pub identities: Arc<dyn IdentityLookup>,
}
