//! Per-saga performance summary (spec §4.5).

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub slowest_step: Option<(String, u64)>,
    pub fastest_step: Option<(String, u64)>,
    pub average_step_duration_ms: Option<f64>,
    /// Steps completed per second of total saga wall-clock time.
    pub throughput_steps_per_sec: Option<f64>,
}

/// Pure summary computed from a saga's own `(step_name, duration_ms)` pairs
/// — the raw durations live in the audit trail (`sagaflow-audit`); this
/// aggregator stays a passive consumer of them, per spec §4.5.
pub fn performance_report(step_durations: &[(String, u64)], total_duration_ms: Option<u64>) -> PerformanceReport {
    if step_durations.is_empty() {
        return PerformanceReport {
            slowest_step: None,
            fastest_step: None,
            average_step_duration_ms: None,
            throughput_steps_per_sec: None,
        };
    }

    let slowest = step_durations.iter().max_by_key(|(_, d)| *d).cloned();
    let fastest = step_durations.iter().min_by_key(|(_, d)| *d).cloned();
    let average = step_durations.iter().map(|(_, d)| *d as f64).sum::<f64>() / step_durations.len() as f64;

    let throughput = total_duration_ms.filter(|d| *d > 0).map(|d| {
        step_durations.len() as f64 / (d as f64 / 1_000.0)
    });

    PerformanceReport {
        slowest_step: slowest,
        fastest_step: fastest,
        average_step_duration_ms: Some(average),
        throughput_steps_per_sec: throughput,
    }
}
