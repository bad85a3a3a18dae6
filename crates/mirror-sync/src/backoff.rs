use std::time::Duration;

use mirror_core::Cadence;

/// Pick the next poll delay. A changed iteration snaps back to the floor so
/// active entities are polled fast; an unchanged one doubles the previous
/// delay up to the ceiling, bounding steady-state request volume.
pub fn next(cadence: Cadence, changed: bool, prev: Duration) -> Duration {
    if changed {
        cadence.floor
    } else {
        prev.saturating_mul(2).min(cadence.ceiling)
    }
}
