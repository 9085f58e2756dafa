use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Cadence for `pd-deal` lookups.
pub const DEAL_INTERVAL: Duration = Duration::from_secs(1);
/// Cadence for `pd-touch` read-modify-write cycles.
pub const TOUCH_INTERVAL: Duration = Duration::from_millis(333);

/// Holds each paced call to at least `interval`, measured from the start of
/// the call. A slow call is not followed by an extra sleep.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn pace<F: Future>(&self, fut: F) -> F::Output {
        let start = Instant::now();
        let out = fut.await;
        sleep_until(start + self.interval).await;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn fast_call_is_stretched_to_interval() {
        let pacer = Pacer::new(Duration::from_millis(333));
        let start = Instant::now();
        let out = pacer.pace(async { 7 }).await;
        assert_eq!(out, 7);
        assert_eq!(start.elapsed(), Duration::from_millis(333));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_gets_no_extra_delay() {
        let pacer = Pacer::new(DEAL_INTERVAL);
        let start = Instant::now();
        pacer.pace(sleep(Duration::from_millis(1500))).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_keeps_cadence() {
        let pacer = Pacer::new(DEAL_INTERVAL);
        let start = Instant::now();
        for ms in [100u64, 400, 900] {
            pacer.pace(sleep(Duration::from_millis(ms))).await;
        }
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
