use log::{debug, info};
use query_engine::interval::parse_interval;
use std::future;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Periodic refresh trigger. Disarmed timers never tick.
#[derive(Debug, Default)]
pub struct RefreshTimer {
    interval: Option<Interval>,
}

impl RefreshTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any running schedule. The first tick fires one full period
    /// after arming; tokens that do not parse leave the timer disarmed.
    pub fn arm(&mut self, token: &str) {
        self.interval = match parse_interval(token) {
            Some(period) => {
                info!("Refreshing every {}", token);
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(interval)
            }
            None => {
                if !token.is_empty() {
                    debug!("Refresh interval {:?} disables periodic refresh", token);
                }
                None
            }
        };
    }

    pub fn disarm(&mut self) {
        self.interval = None;
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    pub async fn tick(&mut self) {
        match &mut self.interval {
            Some(interval) => {
                interval.tick().await;
            }
            None => future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_one_period() {
        let mut timer = RefreshTimer::new();
        timer.arm("5s");
        let start = Instant::now();

        timer.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        timer.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_token_disarms() {
        let mut timer = RefreshTimer::new();
        timer.arm("5s");
        timer.arm("0s");
        assert!(!timer.is_armed());

        let ticked = time::timeout(Duration::from_secs(3600), timer.tick()).await;
        assert!(ticked.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm() {
        let mut timer = RefreshTimer::new();
        timer.arm("1m");
        assert!(timer.is_armed());

        timer.disarm();
        let ticked = time::timeout(Duration::from_secs(120), timer.tick()).await;
        assert!(ticked.is_err());
    }
}
