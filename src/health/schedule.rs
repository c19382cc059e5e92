//! Check cycle scheduling.
//!
//! The health monitor asks a [`Schedule`] when to run the next cycle. In
//! production that is a fixed wall-clock interval; tests drive cycles by hand
//! with a [`ManualSchedule`].

use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Source of check cycle ticks.
pub trait Schedule: Send + 'static {
    /// Wait for the next cycle. Returns `false` once no more cycles will come.
    fn tick(&mut self) -> BoxFuture<'_, bool>;
}

/// Fires every `period`, starting one period from now.
pub struct IntervalSchedule {
    interval: Interval,
}

impl IntervalSchedule {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Schedule for IntervalSchedule {
    fn tick(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.interval.tick().await;
            true
        })
    }
}

/// Fires whenever the paired [`ManualTrigger`] is fired.
pub struct ManualSchedule {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Handle used to fire a [`ManualSchedule`]. Dropping every trigger ends the
/// schedule.
#[derive(Clone)]
pub struct ManualTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualSchedule {
    pub fn new() -> (Self, ManualTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTrigger { tx })
    }
}

impl ManualTrigger {
    /// Request one check cycle.
    pub fn fire(&self) {
        let _ = self.tx.send(());
    }
}

impl Schedule for ManualSchedule {
    fn tick(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.rx.recv().await.is_some() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_skips_immediate_tick() {
        let start = Instant::now();
        let mut schedule = IntervalSchedule::new(Duration::from_secs(5));

        assert!(schedule.tick().await);
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        assert!(schedule.tick().await);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_manual_schedule_ends_with_trigger() {
        let (mut schedule, trigger) = ManualSchedule::new();
        trigger.fire();
        assert!(schedule.tick().await);

        drop(trigger);
        assert!(!schedule.tick().await);
    }
}
