//! Per-track race clock: standings broadcast and one-time settlement.
//!
//! A clock is spawned by the join call that flipped its track to ACTIVE and
//! nobody else. Each clock is a single task, so its ticks never overlap; the
//! tick that settles the race is also the one that ends the task. Settling
//! happens inside that one tick and is never observable from outside.
//!
//! ```text
//! RUNNING --(now >= end)--> SETTLING --(persisted)--> STOPPED
//!    ^                          |
//!    +------(settle failed)-----+
//! ```

use crate::error::RaceError;
use crate::rooms::{race_room, RoomBroadcaster};
use crate::store::{IdentityLookup, ScoreProvider, TrackStore};
use crate::utils::now_millis;
use log::{debug, error, info, warn};
use shared::{PlayerStat, ServerEvent, SettledStanding, Standing, Track, TrackId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Maps a final rank to a payout.
pub trait PrizePolicy: Send + Sync {
    fn prize_for(&self, rank: usize) -> u64;
}

/// The winner takes a fixed prize, everybody else gets nothing.
pub struct WinnerTakesAll {
    pub prize: u64,
}

impl PrizePolicy for WinnerTakesAll {
    fn prize_for(&self, rank: usize) -> u64 {
        if rank == 0 {
            self.prize
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    Running,
    Stopped,
}

/// Shortest tick period a clock will run with.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Collaborators a clock needs, shared by every clock in the process.
#[derive(Clone)]
pub struct ClockContext {
    pub tracks: Arc<dyn TrackStore>,
    pub scores: Arc<dyn ScoreProvider>,
    pub identities: Arc<dyn IdentityLookup>,
    pub rooms: Arc<RoomBroadcaster>,
    pub prizes: Arc<dyn PrizePolicy>,
}

pub struct RaceClock {
    track_id: TrackId,
    room: String,
    end: u64,
    phase: ClockPhase,
    /// Set once a `finish_track` call from this clock failed; the store may
    /// still have persisted it.
    finish_failed: bool,
    ctx: ClockContext,
}

impl RaceClock {
    pub fn new(track: &Track, ctx: ClockContext) -> Self {
        Self {
            track_id: track.id.clone(),
            room: race_room(&track.id),
            end: track.end,
            phase: ClockPhase::Running,
            finish_failed: false,
            ctx,
        }
    }

    pub fn phase(&self) -> ClockPhase {
        self.phase
    }

    /// Runs one tick at time `now` (epoch millis) and returns the resulting phase.
    ///
    /// Collaborator failures skip the tick and leave the clock running, so a
    /// failed settlement is retried on the next tick.
    pub async fn tick(&mut self, now: u64) -> ClockPhase {
        if self.phase == ClockPhase::Stopped {
            return self.phase;
        }

        let stats = match self.ctx.scores.get_stats(&self.track_id, now).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Track {}: skipping tick, stats unavailable: {}", self.track_id, e);
                return self.phase;
            }
        };

        let standings: Vec<Standing> = stats
            .iter()
            .enumerate()
            .map(|(position, stat)| Standing {
                id: stat.player_id.clone(),
                position,
            })
            .collect();
        debug!("Track {}: {} standings", self.track_id, standings.len());
        self.ctx
            .rooms
            .emit(&self.room, &ServerEvent::PositionUpdate(standings))
            .await;

        if now < self.end {
            return self.phase;
        }

        self.phase = match self.settle(&stats).await {
            Ok(()) => ClockPhase::Stopped,
            Err(e) => {
                error!(
                    "Track {}: settlement failed, retrying next tick: {}",
                    self.track_id, e
                );
                ClockPhase::Running
            }
        };
        self.phase
    }

    async fn settle(&mut self, stats: &[PlayerStat]) -> Result<(), RaceError> {
        let mut results = Vec::with_capacity(stats.len());
        for (rank, stat) in stats.iter().enumerate() {
            let name = self
                .ctx
                .identities
                .get_by_id(&stat.player_id)
                .await?
                .map(|profile| profile.name)
                .unwrap_or_else(|| stat.player_id.clone());
            results.push(SettledStanding {
                id: stat.player_id.clone(),
                position: rank,
                name,
                score: stat.score,
                prize: self.ctx.prizes.prize_for(rank),
            });
        }

        let finished = match self
            .ctx
            .tracks
            .finish_track(&self.track_id, results.clone())
            .await
        {
            Ok(finished) => finished,
            Err(e) => {
                self.finish_failed = true;
                return Err(e);
            }
        };

        if finished {
            info!(
                "Track {} settled with {} ranked players",
                self.track_id,
                results.len()
            );
            self.ctx
                .rooms
                .emit(&self.room, &ServerEvent::Gameover(results))
                .await;
        } else if self.finish_failed {
            self.announce_stored_results().await?;
        } else {
            warn!("Track {} was already settled", self.track_id);
        }
        Ok(())
    }

    /// An earlier `finish_track` from this clock failed but was persisted
    /// anyway. Nobody broadcast it, so send what the store kept.
    async fn announce_stored_results(&self) -> Result<(), RaceError> {
        let track = self
            .ctx
            .tracks
            .get_by_id(&self.track_id)
            .await?
            .ok_or(RaceError::TrackNotFound)?;
        info!(
            "Track {} was settled by an unacknowledged write, announcing stored results",
            self.track_id
        );
        self.ctx
            .rooms
            .emit(&self.room, &ServerEvent::Gameover(track.results))
            .await;
        Ok(())
    }

    /// Ticks every `period` until the race is settled.
    pub async fn run(mut self, period: Duration) {
        let mut ticker = interval(period.max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.tick(now_millis()).await == ClockPhase::Stopped {
                break;
            }
        }
        info!("Race clock for track {} stopped", self.track_id);
    }
}

/// Live clock tasks keyed by track id.
pub struct ClockRegistry {
    ctx: ClockContext,
    period: Duration,
    clocks: Mutex<HashMap<TrackId, JoinHandle<()>>>,
}

impl ClockRegistry {
    pub fn new(ctx: ClockContext, period: Duration) -> Self {
        Self {
            ctx,
            period,
            clocks: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns the clock for a freshly activated track. Returns false if one is
    /// already live for it.
    pub async fn start(self: &Arc<Self>, track: &Track) -> bool {
        let mut clocks = self.clocks.lock().await;
        if clocks.contains_key(&track.id) {
            warn!("Race clock for track {} already running", track.id);
            return false;
        }

        let clock = RaceClock::new(track, self.ctx.clone());
        let registry = Arc::clone(self);
        let track_id = track.id.clone();
        let period = self.period;
        let handle = tokio::spawn(async move {
            clock.run(period).await;
            registry.release(&track_id).await;
        });
        clocks.insert(track.id.clone(), handle);
        info!("Race clock for track {} started, ends at {}", track.id, track.end);
        true
    }

    async fn release(&self, track_id: &str) {
        self.clocks.lock().await.remove(track_id);
    }

    pub async fn is_running(&self, track_id: &str) -> bool {
        self.clocks.lock().await.contains_key(track_id)
    }

    pub async fn len(&self) -> usize {
        self.clocks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clocks.lock().await.is_empty()
    }

    /// Aborts every live clock. Only used on process shutdown.
    pub async fn shutdown(&self) {
        let mut clocks = self.clocks.lock().await;
        for (track_id, handle) in clocks.drain() {
            info!("Aborting race clock for track {}", track_id);
            handle.abort();
        }
    }
}
