//! Rolling counters, latency histograms, and alert thresholds per saga type
//! (spec §4.5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sagaflow_core::MetricsAlertConfig;

use crate::alert::{Alert, AlertSink};
use crate::histogram::Histogram;
use crate::rate::EventRateTracker;

struct TypeMetrics {
    sagas_started: AtomicU64,
    sagas_completed: AtomicU64,
    sagas_failed: AtomicU64,
    sagas_compensated: AtomicU64,
    active_sagas: AtomicI64,
    saga_duration: Histogram,
    step_durations: Mutex<HashMap<String, Histogram>>,
    event_rate: EventRateTracker,
}

impl TypeMetrics {
    fn new() -> Self {
        Self {
            sagas_started: AtomicU64::new(0),
            sagas_completed: AtomicU64::new(0),
            sagas_failed: AtomicU64::new(0),
            sagas_compensated: AtomicU64::new(0),
            active_sagas: AtomicI64::new(0),
            saga_duration: Histogram::new(),
            step_durations: Mutex::new(HashMap::new()),
            event_rate: EventRateTracker::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub sagas_started: u64,
    pub sagas_completed: u64,
    pub sagas_failed: u64,
    pub sagas_compensated: u64,
    pub active_sagas: i64,
}

/// Strictly passive to domain flow: callers tell it what happened, it
/// never calls back into coordinator/audit/log state (spec §9 design note:
/// "keep strictly one-way").
pub struct MetricsAggregator {
    per_type: Mutex<HashMap<String, Arc<TypeMetrics>>>,
    alert_config: MetricsAlertConfig,
    sinks: Mutex<Vec<Arc<dyn AlertSink>>>,
}

impl MetricsAggregator {
    pub fn new(alert_config: MetricsAlertConfig) -> Self {
        Self {
            per_type: Mutex::new(HashMap::new()),
            alert_config,
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn register_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        self.sinks.lock().expect("metrics sinks lock poisoned").push(sink);
    }

    fn type_metrics(&self, saga_type: &str) -> Arc<TypeMetrics> {
        let mut guard = self.per_type.lock().expect("metrics lock poisoned");
        Arc::clone(guard.entry(saga_type.to_string()).or_insert_with(|| Arc::new(TypeMetrics::new())))
    }

    pub fn saga_started(&self, saga_type: &str) {
        let metrics = self.type_metrics(saga_type);
        metrics.sagas_started.fetch_add(1, Ordering::Relaxed);
        let active = metrics.active_sagas.fetch_add(1, Ordering::Relaxed) + 1;
        self.maybe_alert_active_sagas(saga_type, &metrics, active);
    }

    pub fn saga_completed(&self, saga_type: &str, duration_ms: u64) {
        let metrics = self.type_metrics(saga_type);
        metrics.sagas_completed.fetch_add(1, Ordering::Relaxed);
        metrics.active_sagas.fetch_sub(1, Ordering::Relaxed);
        metrics.saga_duration.record(duration_ms);
        self.maybe_alert_error_rate(saga_type, &metrics);
    }

    pub fn saga_failed(&self, saga_type: &str, duration_ms: u64) {
        let metrics = self.type_metrics(saga_type);
        metrics.sagas_failed.fetch_add(1, Ordering::Relaxed);
        metrics.active_sagas.fetch_sub(1, Ordering::Relaxed);
        metrics.saga_duration.record(duration_ms);
        self.maybe_alert_error_rate(saga_type, &metrics);
    }

    pub fn saga_compensated(&self, saga_type: &str, duration_ms: u64) {
        let metrics = self.type_metrics(saga_type);
        metrics.sagas_compensated.fetch_add(1, Ordering::Relaxed);
        metrics.active_sagas.fetch_sub(1, Ordering::Relaxed);
        metrics.saga_duration.record(duration_ms);
        self.maybe_alert_error_rate(saga_type, &metrics);
    }

    pub fn step_duration(&self, saga_type: &str, step: &str, duration_ms: u64, latency_bound_ms: Option<u64>) {
        let metrics = self.type_metrics(saga_type);
        let mut histograms = metrics.step_durations.lock().expect("metrics step lock poisoned");
        let histogram = histograms.entry(step.to_string()).or_insert_with(Histogram::new);
        histogram.record(duration_ms);

        if let Some(bound) = latency_bound_ms {
            if let Some(p95) = histogram.percentile_ms(0.95) {
                if p95 > bound {
                    self.emit(Alert::StepLatencyExceeded {
                        saga_type: saga_type.to_string(),
                        step: step.to_string(),
                        p95_ms: p95,
                        bound_ms: bound,
                    });
                }
            }
        }
    }

    pub fn event_observed(&self, saga_type: &str) {
        self.type_metrics(saga_type).event_rate.record();
    }

    pub fn events_per_second(&self, saga_type: &str, window: Duration) -> f64 {
        self.type_metrics(saga_type).event_rate.rate_per_second(window)
    }

    pub fn snapshot(&self, saga_type: &str) -> Snapshot {
        let metrics = self.type_metrics(saga_type);
        Snapshot {
            sagas_started: metrics.sagas_started.load(Ordering::Relaxed),
            sagas_completed: metrics.sagas_completed.load(Ordering::Relaxed),
            sagas_failed: metrics.sagas_failed.load(Ordering::Relaxed),
            sagas_compensated: metrics.sagas_compensated.load(Ordering::Relaxed),
            active_sagas: metrics.active_sagas.load(Ordering::Relaxed),
        }
    }

    fn maybe_alert_active_sagas(&self, saga_type: &str, metrics: &TypeMetrics, active: i64) {
        let threshold = self.alert_config.active_sagas_threshold;
        if active >= 0 && active as u64 > threshold {
            self.emit(Alert::ActiveSagasExceeded {
                saga_type: saga_type.to_string(),
                active: active as u64,
                threshold,
            });
        }
        let _ = metrics;
    }

    fn maybe_alert_error_rate(&self, saga_type: &str, metrics: &TypeMetrics) {
        let started = metrics.sagas_started.load(Ordering::Relaxed);
        if started == 0 {
            return;
        }
        let failed_or_compensated =
            metrics.sagas_failed.load(Ordering::Relaxed) + metrics.sagas_compensated.load(Ordering::Relaxed);
        let rate_pct = (failed_or_compensated as f64 / started as f64) * 100.0;
        if rate_pct > self.alert_config.error_rate_threshold_pct {
            self.emit(Alert::ErrorRateExceeded {
                saga_type: saga_type.to_string(),
                rate_pct,
                threshold_pct: self.alert_config.error_rate_threshold_pct,
            });
        }
    }

    fn emit(&self, alert: Alert) {
        tracing::warn!(?alert, "metrics alert");
        for sink in self.sinks.lock().expect("metrics sinks lock poisoned").iter() {
            sink.on_alert(alert.clone());
        }
    }
}
