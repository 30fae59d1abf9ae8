//! Out-of-band alert delivery (spec §4.5: "alert delivery is out-of-band,
//! callback registration; the aggregator itself is strictly passive to
//! domain flow").

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    ErrorRateExceeded { saga_type: String, rate_pct: f64, threshold_pct: f64 },
    ActiveSagasExceeded { saga_type: String, active: u64, threshold: u64 },
    StepLatencyExceeded { saga_type: String, step: String, p95_ms: u64, bound_ms: u64 },
}

pub trait AlertSink: Send + Sync {
    fn on_alert(&self, alert: Alert);
}

impl<F> AlertSink for F
where
    F: Fn(Alert) + Send + Sync,
{
    fn on_alert(&self, alert: Alert) {
        self(alert)
    }
}
