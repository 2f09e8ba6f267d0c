//! In-process collaborators backing the server binary and the test suites.

use crate::config::RaceConfig;
use crate::error::RaceError;
use crate::store::{
    Admission, AuthVerifier, Identity, IdentityLookup, PlayerSeed, Profile, ScoreProvider,
    TrackStore,
};
use crate::utils::{now_millis, race_progress};
use async_trait::async_trait;
use log::{debug, info};
use rand::Rng;
use serde::Deserialize;
use shared::{PlayerStat, SettledStanding, Track, TrackStatus};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub race_name: String,
    pub race_size: usize,
    pub race_duration: Duration,
}

impl From<&RaceConfig> for StoreSettings {
    fn from(config: &RaceConfig) -> Self {
        Self {
            race_name: config.race_name.clone(),
            race_size: config.race_size,
            race_duration: config.race_duration,
        }
    }
}

/// Track table guarded by a single async mutex, so every read-modify-write on
/// a track is linearizable.
pub struct MemoryTrackStore {
    settings: StoreSettings,
    tracks: Mutex<Vec<Track>>,
}

impl MemoryTrackStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            tracks: Mutex::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tracks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tracks.lock().await.is_empty()
    }
}

#[async_trait]
impl TrackStore for MemoryTrackStore {
    async fn create(&self) -> Result<Track, RaceError> {
        let track = Track::new(uuid::Uuid::new_v4().to_string(), &self.settings.race_name);
        self.tracks.lock().await.push(track.clone());
        info!("Created track {}", track.id);
        Ok(track)
    }

    async fn list(&self, limit: usize) -> Result<Vec<Track>, RaceError> {
        let tracks = self.tracks.lock().await;
        // Newest first so fresh joinable tracks stay inside the page
        Ok(tracks.iter().rev().take(limit).cloned().collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Track>, RaceError> {
        let tracks = self.tracks.lock().await;
        Ok(tracks.iter().find(|t| t.id == id).cloned())
    }

    async fn admit_player(&self, id: &str, seed: PlayerSeed) -> Result<Admission, RaceError> {
        let mut tracks = self.tracks.lock().await;
        let track = tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(RaceError::TrackNotFound)?;

        if track.has_player(&seed.identity.id) {
            return Ok(Admission {
                track: track.clone(),
                admitted: false,
                activated: false,
            });
        }
        if track.status != TrackStatus::Awaiting {
            return Err(RaceError::TrackNotJoinable(track.status));
        }

        let position = track.players.len();
        track.players.push(seed.into_player(position));

        let mut activated = false;
        if track.players.len() >= self.settings.race_size {
            let now = now_millis();
            track.status = TrackStatus::Active;
            track.start = now;
            track.end = now + self.settings.race_duration.as_millis() as u64;
            activated = true;
        }

        Ok(Admission {
            track: track.clone(),
            admitted: true,
            activated,
        })
    }

    async fn finish_track(
        &self,
        id: &str,
        results: Vec<SettledStanding>,
    ) -> Result<bool, RaceError> {
        let mut tracks = self.tracks.lock().await;
        let track = tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(RaceError::TrackNotFound)?;

        match track.status {
            TrackStatus::Finished => Ok(false),
            TrackStatus::Awaiting => Err(RaceError::TrackNotActive),
            TrackStatus::Active => {
                track.status = TrackStatus::Finished;
                track.results = results;
                Ok(true)
            }
        }
    }
}

/// Account record as loaded from a users file.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub token: String,
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Token table and profile directory in one place.
#[derive(Debug, Default)]
pub struct UserDirectory {
    by_token: HashMap<String, Identity>,
    profiles: HashMap<String, Profile>,
}

impl UserDirectory {
    pub fn new(records: Vec<UserRecord>) -> Self {
        let mut directory = Self::default();
        for record in records {
            directory.insert(record);
        }
        directory
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<UserRecord> = serde_json::from_str(&raw)?;
        Ok(Self::new(records))
    }

    /// Two demo accounts for local runs without a users file.
    pub fn demo() -> Self {
        Self::new(vec![
            UserRecord {
                token: "demo-alice".to_string(),
                id: "alice".to_string(),
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                picture: None,
            },
            UserRecord {
                token: "demo-bob".to_string(),
                id: "bob".to_string(),
                email: "bob@example.com".to_string(),
                name: "Bob".to_string(),
                picture: None,
            },
        ])
    }

    pub fn insert(&mut self, record: UserRecord) {
        self.by_token.insert(
            record.token,
            Identity {
                id: record.id.clone(),
                email: record.email,
            },
        );
        self.profiles.insert(
            record.id.clone(),
            Profile {
                id: record.id,
                name: record.name,
                picture: record.picture,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl AuthVerifier for UserDirectory {
    async fn verify(&self, token: &str) -> Result<Identity, RaceError> {
        self.by_token
            .get(token)
            .cloned()
            .ok_or_else(|| RaceError::Authentication("invalid or expired token".to_string()))
    }
}

#[async_trait]
impl IdentityLookup for UserDirectory {
    async fn get_by_id(&self, id: &str) -> Result<Option<Profile>, RaceError> {
        Ok(self.profiles.get(id).cloned())
    }
}

/// Scores each player by fuel carried times race progress, with a random
/// per-tick spread so standings move around during the race.
pub struct FuelScoreProvider {
    tracks: Arc<dyn TrackStore>,
}

impl FuelScoreProvider {
    pub fn new(tracks: Arc<dyn TrackStore>) -> Self {
        Self { tracks }
    }
}

fn rank_players(track: &Track, at: u64) -> Vec<PlayerStat> {
    let mut rng = rand::thread_rng();
    let progress = race_progress(track.start, track.end, at);
    let mut stats: Vec<PlayerStat> = track
        .players
        .iter()
        .map(|player| PlayerStat {
            player_id: player.id.clone(),
            score: player.fuel_total() * progress * rng.gen_range(0.5..1.5),
        })
        .collect();
    stats.sort_by(|a, b| b.score.total_cmp(&a.score));
    stats
}

#[async_trait]
impl ScoreProvider for FuelScoreProvider {
    async fn get_stats(&self, track_id: &str, at: u64) -> Result<Vec<PlayerStat>, RaceError> {
        let track = self
            .tracks
            .get_by_id(track_id)
            .await?
            .ok_or(RaceError::TrackNotFound)?;
        let stats = rank_players(&track, at);
        debug!("Ranked {} players on track {}", stats.len(), track_id);
        Ok(stats)
    }
}
