//! Runtime settings for the race coordinator.

use shared::DEFAULT_RACE_NAME;
use std::time::Duration;

/// Tunables shared by the matchmaking pool, the join coordinator and race clocks.
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Players needed before an awaiting track starts.
    pub race_size: usize,
    pub race_duration: Duration,
    /// Period between standings broadcasts.
    pub tick_interval: Duration,
    /// Floor of joinable tracks kept visible in the lobby.
    pub min_awaiting: usize,
    pub list_limit: usize,
    /// Payout for the winner under the default prize rule.
    pub prize: u64,
    pub race_name: String,
    pub max_clients: usize,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            race_size: 2,
            race_duration: Duration::from_secs(60),
            tick_interval: Duration::from_secs(3),
            min_awaiting: 2,
            list_limit: 50,
            prize: 100,
            race_name: DEFAULT_RACE_NAME.to_string(),
            max_clients: 1024,
        }
    }
}

impl RaceConfig {
    pub fn race_duration_ms(&self) -> u64 {
        self.race_duration.as_millis() as u64
    }
}
