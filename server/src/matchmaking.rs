//! Keeps a floor of joinable tracks in the lobby.

use crate::error::RaceError;
use crate::store::TrackStore;
use log::info;
use shared::Track;
use std::sync::Arc;

#[derive(Clone)]
pub struct MatchmakingPool {
    tracks: Arc<dyn TrackStore>,
    list_limit: usize,
}

impl MatchmakingPool {
    pub fn new(tracks: Arc<dyn TrackStore>, list_limit: usize) -> Self {
        Self { tracks, list_limit }
    }

    /// Lists tracks and tops up AWAITING ones until at least `minimum` are visible.
    ///
    /// Concurrent callers may each create tracks and leave a surplus; a deficit
    /// is never returned.
    pub async fn ensure_awaiting_tracks(&self, minimum: usize) -> Result<Vec<Track>, RaceError> {
        let mut tracks = self.tracks.list(self.list_limit).await?;
        let mut awaiting = tracks.iter().filter(|t| t.is_awaiting()).count();

        if awaiting < minimum {
            info!(
                "Only {} awaiting tracks, creating {}",
                awaiting,
                minimum - awaiting
            );
        }
        while awaiting < minimum {
            let track = self.tracks.create().await?;
            tracks.insert(0, track);
            awaiting += 1;
        }

        Ok(tracks)
    }
}
