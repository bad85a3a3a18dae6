use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in nanoseconds since the epoch, the unit the
/// remote ledger uses for every timestamp (allowance expiry included).
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
