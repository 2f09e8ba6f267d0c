use rand::seq::SliceRandom;
use rand::Rng;
use shared::LANE_OFFSETS;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Pick a starting lane for a newly admitted player
pub fn pick_lane<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    *LANE_OFFSETS.choose(rng).unwrap_or(&LANE_OFFSETS[0])
}

// Fraction of the race window that has elapsed at `at`, clamped to [0, 1]
pub fn race_progress(start: u64, end: u64, at: u64) -> f64 {
    if end <= start || at <= start {
        return 0.0;
    }
    ((at - start) as f64 / (end - start) as f64).min(1.0)
}
