use std::env;
use std::time::Duration;

/// Polling cadence shared by every sync task: the fast floor a task returns
/// to after a change or refresh, and the ceiling idle polling decays to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl Cadence {
    pub fn from_env() -> Self {
        let floor_ms: u64 = env::var("POLL_FLOOR_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let ceiling_ms: u64 = env::var("POLL_CEILING_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60_000);

        Self {
            floor: Duration::from_millis(floor_ms),
            // ceiling may never undercut the floor
            ceiling: Duration::from_millis(ceiling_ms.max(floor_ms)),
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Complete engine configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub cadence: Cadence,
    /// Displayed ask/bid level slots per book side
    pub book_depth: usize,
    /// Size of the most-recent-trades ring per book
    pub recent_trades: usize,
    /// Status log interval for the binary
    pub status_interval_secs: u64,
}

impl MirrorConfig {
    pub fn from_env() -> Self {
        let book_depth = env::var("BOOK_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(6);

        let recent_trades = env::var("RECENT_TRADES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(12);

        let status_interval_secs = env::var("STATUS_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Self {
            cadence: Cadence::from_env(),
            book_depth,
            recent_trades,
            status_interval_secs,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
