//! Sliding-window event rate tracking (spec §4.5: events/second over 1
//! min / 5 min / 1 h windows).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW_SECONDS: usize = 3_600;

pub struct EventRateTracker {
    started_at: Instant,
    buckets: Vec<AtomicU64>,
    last_bucket: Mutex<usize>,
}

impl EventRateTracker {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            buckets: (0..WINDOW_SECONDS).map(|_| AtomicU64::new(0)).collect(),
            last_bucket: Mutex::new(0),
        }
    }

    fn current_bucket(&self) -> usize {
        (self.started_at.elapsed().as_secs() as usize) % WINDOW_SECONDS
    }

    /// Record one event occurrence now.
    pub fn record(&self) {
        let bucket = self.current_bucket();
        self.clear_stale_since_last_write(bucket);
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Clears buckets that have rolled over since the last write, so a
    /// bucket from a previous lap of the ring doesn't leak into the count.
    fn clear_stale_since_last_write(&self, current: usize) {
        let mut last = self.last_bucket.lock().expect("event rate lock poisoned");
        if *last != current {
            self.buckets[current].store(0, Ordering::Relaxed);
            *last = current;
        }
    }

    /// Events-per-second averaged over the trailing `window`.
    pub fn rate_per_second(&self, window: Duration) -> f64 {
        let window_secs = window.as_secs().min(WINDOW_SECONDS as u64).max(1);
        let current = self.current_bucket();
        let mut total = 0u64;
        for offset in 0..window_secs {
            let idx = (current + WINDOW_SECONDS - offset as usize % WINDOW_SECONDS) % WINDOW_SECONDS;
            total += self.buckets[idx].load(Ordering::Relaxed);
        }
        total as f64 / window_secs as f64
    }
}

impl Default for EventRateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_increases_with_recorded_events() {
        let tracker = EventRateTracker::new();
        for _ in 0..10 {
            tracker.record();
        }
        assert!(tracker.rate_per_second(Duration::from_secs(60)) > 0.0);
    }

    #[test]
    fn no_events_yields_zero_rate() {
        let tracker = EventRateTracker::new();
        assert_eq!(tracker.rate_per_second(Duration::from_secs(60)), 0.0);
    }
}
