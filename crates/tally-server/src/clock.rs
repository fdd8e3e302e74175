//! The counter clock: advances the counter and publishes each new value.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::websocket::broadcast::{Broadcaster, Delivery};

/// Sole writer of the shared counter.
pub struct CounterClock {
    broadcaster: Arc<Broadcaster>,
}

impl CounterClock {
    /// Create a clock publishing through `broadcaster`.
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Advance once and broadcast the new value.
    pub fn tick(&self) -> (u32, Delivery) {
        let counter = self.broadcaster.counter();
        self.broadcaster.publish_with(|| counter.advance())
    }

    /// Tick every `period` until `cancel` fires. The first tick happens one
    /// full period after start.
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let (count, delivery) = self.tick();
                    trace!(count, delivered = delivery.delivered, "tick");
                }
            }
        }
        debug!(
            count = self.broadcaster.counter().current(),
            "counter clock stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::{COUNTER_MAX, Counter};
    use crate::websocket::connection::{ClientConnection, Outbound};
    use crate::websocket::registry::ConnectionRegistry;
    use tokio::sync::mpsc;

    fn make_clock(start: u32) -> (CounterClock, Arc<Broadcaster>) {
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(Counter::starting_at(start)),
        ));
        (CounterClock::new(broadcaster.clone()), broadcaster)
    }

    fn next_text(rx: &mut mpsc::Receiver<Outbound>) -> Option<String> {
        match rx.try_recv().ok()? {
            Outbound::Text(t) => Some(t.as_str().to_string()),
            Outbound::Ping => None,
        }
    }

    #[test]
    fn tick_advances_and_publishes() {
        let (clock, broadcaster) = make_clock(0);
        let (tx, mut rx) = mpsc::channel(8);
        assert!(
            broadcaster
                .registry()
                .add(Arc::new(ClientConnection::new("c1".into(), tx)))
        );

        let (count, delivery) = clock.tick();
        assert_eq!(count, 1);
        assert_eq!(delivery.delivered, 1);
        assert_eq!(next_text(&mut rx).as_deref(), Some(r#"{"count":1}"#));
    }

    #[test]
    fn tick_wraps_at_max() {
        let (clock, broadcaster) = make_clock(COUNTER_MAX);
        assert_eq!(clock.tick().0, 0);
        assert_eq!(broadcaster.counter().current(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_once_per_period() {
        let (clock, broadcaster) = make_clock(0);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(clock.run(Duration::from_secs(1), cancel.clone()));

        time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(broadcaster.counter().current(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_after_cancel() {
        let (clock, broadcaster) = make_clock(0);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(clock.run(Duration::from_secs(1), cancel.clone()));

        time::sleep(Duration::from_millis(1_500)).await;
        cancel.cancel();
        handle.await.unwrap();
        let stopped_at = broadcaster.counter().current();

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(broadcaster.counter().current(), stopped_at);
        assert_eq!(stopped_at, 1);
    }
}
