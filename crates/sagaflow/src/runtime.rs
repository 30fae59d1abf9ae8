//! Process bootstrap: builds the store/broker/audit/log/metrics stack from
//! a `CoordinatorConfig` and wires a `Coordinator` on top of it.
//!
//! This crate only *consumes* a `CoordinatorConfig`; reading one from
//! files/env/CLI flags is process bootstrap left to `main.rs`, per the
//! config type's own doc comment.

use std::sync::Arc;

use sagaflow_audit::AuditTrail;
use sagaflow_broker::{Backoff, InMemoryDeadLetterSink, InMemoryEventBus};
use sagaflow_core::CoordinatorConfig;
use sagaflow_coordinator::Coordinator;
use sagaflow_log::{JsonLinesFileSink, SagaLog};
use sagaflow_metrics::{Alert, MetricsAggregator};
use sagaflow_partner_onboarding::PartnerOnboardingSaga;
use sagaflow_store::{FileSnapshotSink, SagaStateStore};

/// The running process: the coordinator plus the components it needs kept
/// alive for as long as the process is up (broker dispatch thread, dead
/// letter sink).
pub struct Runtime {
    pub coordinator: Arc<Coordinator>,
    pub bus: Arc<InMemoryEventBus>,
    pub dead_letter: Arc<InMemoryDeadLetterSink>,
}

impl Runtime {
    /// Builds the stack, rehydrates non-terminal sagas from
    /// `config.state_snapshot_path` if set, registers the
    /// partner-onboarding saga type, and subscribes the coordinator to
    /// every topic.
    pub fn start(config: CoordinatorConfig) -> anyhow::Result<Self> {
        let dead_letter = Arc::new(InMemoryDeadLetterSink::new());
        let backoff = Backoff::new(
            std::time::Duration::from_millis(100),
            2,
            std::time::Duration::from_secs(5),
            config.broker.publish_max_retries,
        );
        let bus = Arc::new(InMemoryEventBus::with_backoff(1024, dead_letter.clone(), backoff));

        let snapshot_sink = match &config.state_snapshot_path {
            Some(path) => Some(Arc::new(FileSnapshotSink::open(path)?) as Arc<dyn sagaflow_store::SnapshotSink>),
            None => None,
        };
        let store = Arc::new(SagaStateStore::with_snapshot_sink(snapshot_sink));
        if let Some(path) = &config.state_snapshot_path {
            store.rehydrate(FileSnapshotSink::load_non_terminal(path)?);
        }

        let audit = Arc::new(match &config.audit.file_path {
            Some(path) => AuditTrail::with_file(path, config.audit.fsync_policy)?,
            None => AuditTrail::new(),
        });

        let log_sink = match &config.log.file_path {
            Some(path) => Some(Arc::new(JsonLinesFileSink::open(path)?) as Arc<dyn sagaflow_log::FileSink>),
            None => None,
        };
        let log = SagaLog::with_sink(config.log.max_in_memory, log_sink);

        let metrics = Arc::new(MetricsAggregator::new(config.metrics_alert));
        metrics.register_alert_sink(Arc::new(|alert: Alert| {
            tracing::warn!(?alert, "metrics alert");
        }));

        let coordinator = Coordinator::new(
            Arc::clone(&store),
            Arc::clone(&bus) as Arc<dyn sagaflow_broker::EventBus>,
            audit,
            log,
            metrics,
            config,
        );
        coordinator.register_saga_type(Arc::new(PartnerOnboardingSaga));
        coordinator.subscribe_all_topics();

        Ok(Self { coordinator, bus, dead_letter })
    }
}
