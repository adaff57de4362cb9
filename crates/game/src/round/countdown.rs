use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

pub const DEFAULT_COUNTDOWN_SECS: u8 = 3;

/// One-second pacing for the pre-round countdown. Each client runs its own;
/// the two displays may drift by the link latency.
#[derive(Debug)]
pub struct CountdownTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl CountdownTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    pub fn arm(&mut self) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub fn disarm(&mut self) {
        self.interval = None;
    }

    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Pending forever while disarmed. Cancel-safe.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
