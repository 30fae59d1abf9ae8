//! Fixed-bucket latency histogram (spec §5: "histogram updates lock-free or
//! per-thread with periodic merge" — here, lock-free via atomic bucket
//! counters).

use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound (ms) of each bucket; the last bucket is an overflow catch-all.
const BOUNDS_MS: &[u64] = &[10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 60_000];

pub struct Histogram {
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    sum_ms: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: (0..=BOUNDS_MS.len()).map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
        }
    }

    pub fn record(&self, value_ms: u64) {
        let idx = BOUNDS_MS.iter().position(|b| value_ms <= *b).unwrap_or(BOUNDS_MS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(value_ms, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> Option<f64> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        Some(self.sum_ms.load(Ordering::Relaxed) as f64 / count as f64)
    }

    /// Approximate percentile (0.0..=1.0) from bucket boundaries.
    pub fn percentile_ms(&self, p: f64) -> Option<u64> {
        let total = self.count();
        if total == 0 {
            return None;
        }
        let target = (p.clamp(0.0, 1.0) * total as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (idx, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target {
                return Some(*BOUNDS_MS.get(idx).unwrap_or(&BOUNDS_MS[BOUNDS_MS.len() - 1]));
            }
        }
        BOUNDS_MS.last().copied()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
