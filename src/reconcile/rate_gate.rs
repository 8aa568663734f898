//! Pool-wide dispatch throttle.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// A single periodic timer shared by reference across all workers.
///
/// `acquire` consumes exactly one tick, so at most one new dispatch
/// attempt starts per period across the whole pool regardless of how
/// many workers exist. This protects the external accrual service; it
/// is not a per-worker throughput limit.
pub struct RateGate {
    interval: Mutex<Interval>,
}

impl RateGate {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        // Catch-up bursts after an idle stretch would defeat the throttle
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            interval: Mutex::new(interval),
        }
    }

    /// Wait for the next tick. Contending callers are served one per tick.
    pub async fn acquire(&self) {
        self.interval.lock().await.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_one_acquire_per_period() {
        let gate = RateGate::new(Duration::from_millis(800));
        let start = Instant::now();

        // First tick fires immediately, the rest are spaced by the period
        gate.acquire().await;
        gate.acquire().await;
        gate.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_gate_serializes_contending_workers() {
        let gate = Arc::new(RateGate::new(Duration::from_millis(100)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.acquire().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 4 acquires = first immediate tick + 3 full periods
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
