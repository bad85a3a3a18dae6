use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use mirror_core::EventBus;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waited {
    TimedOut,
    Refreshed,
}

/// Idle for `delay` or until a `refresh` broadcast arrives, whichever comes
/// first. The refresh subscription is created on entry and dropped on exit,
/// so a refresh fired while the task is not waiting is simply missed — the
/// task picks the change up on its next poll instead.
pub async fn wait_for_refresh(bus: &EventBus, delay: Duration) -> Waited {
    let mut refresh = bus.subscribe_refresh();
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    tokio::select! {
        _ = &mut sleep => Waited::TimedOut,
        result = refresh.recv() => match result {
            // lagging just means refreshes were fired faster than we read
            Ok(()) | Err(RecvError::Lagged(_)) => Waited::Refreshed,
            Err(RecvError::Closed) => {
                sleep.await;
                Waited::TimedOut
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn times_out_when_nothing_fires() {
        let bus = EventBus::new();
        let waited = wait_for_refresh(&bus, Duration::from_secs(30)).await;
        assert_eq!(waited, Waited::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_wakes_the_wait_early() {
        let bus = std::sync::Arc::new(EventBus::new());
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { wait_for_refresh(&bus, Duration::from_secs(3600)).await })
        };
        // let the waiter subscribe before firing
        tokio::task::yield_now().await;
        bus.refresh();
        let waited = waiter.await.unwrap();
        assert_eq!(waited, Waited::Refreshed);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_fired_before_the_wait_is_missed() {
        let bus = EventBus::new();
        bus.refresh();
        let waited = wait_for_refresh(&bus, Duration::from_millis(10)).await;
        assert_eq!(waited, Waited::TimedOut);
    }
}
