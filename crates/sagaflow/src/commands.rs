//! The Query & Command Surface (C8, spec §4.8): the five operations an
//! external front end is allowed to call, with no broker I/O on this path.

use serde_json::Value as JsonValue;

use sagaflow_core::{CorrelationId, ErrorKind, PartnerId, SagaId};
use sagaflow_coordinator::Coordinator;
use sagaflow_store::{ListFilters, SagaInstance};

/// Thin wrapper over `Coordinator` exposing exactly the operations spec
/// §4.8 names. `Coordinator` itself already has this shape; `Commands`
/// exists as the stable seam a front end (CLI here, an RPC layer
/// elsewhere) is written against instead of the coordinator's internals.
pub struct Commands<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> Commands<'a> {
    pub fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    pub fn start(
        &self,
        saga_type: &str,
        initial_payload: JsonValue,
        correlation_id: Option<CorrelationId>,
        partner_id: Option<PartnerId>,
    ) -> Result<SagaId, ErrorKind> {
        self.coordinator.start(saga_type, initial_payload, correlation_id, partner_id)
    }

    pub fn status(&self, saga_id: SagaId) -> Option<SagaInstance> {
        self.coordinator.status(saga_id)
    }

    /// Idempotent: re-issuing on an already-Compensating saga is a no-op
    /// (spec §5 "Cancellation & timeouts"); only valid while the saga is
    /// still in progress.
    pub fn compensate(&self, saga_id: SagaId, reason: impl Into<String>) -> Result<(), ErrorKind> {
        match self.coordinator.status(saga_id) {
            None => Err(ErrorKind::UnknownSaga(saga_id.to_string())),
            Some(saga) if matches!(saga.status, sagaflow_store::SagaStatus::Completed | sagaflow_store::SagaStatus::Failed | sagaflow_store::SagaStatus::Compensated) => {
                Err(ErrorKind::Fatal(format!("saga {saga_id} already reached a terminal state")))
            }
            Some(saga) if saga.status == sagaflow_store::SagaStatus::Compensating => Ok(()),
            Some(_) => self.coordinator.compensate(saga_id, reason),
        }
    }

    pub fn timeline(&self, saga_id: SagaId) -> Option<sagaflow_audit::Timeline> {
        self.coordinator.timeline(saga_id)
    }

    pub fn list(&self, filters: &ListFilters) -> Vec<SagaInstance> {
        self.coordinator.list(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sagaflow_core::CoordinatorConfig;
    use std::sync::Arc;

    fn coordinator() -> Arc<Coordinator> {
        Coordinator::new(
            Arc::new(sagaflow_store::SagaStateStore::new()),
            Arc::new(sagaflow_broker::InMemoryEventBus::new(16, Arc::new(sagaflow_broker::InMemoryDeadLetterSink::new()))),
            Arc::new(sagaflow_audit::AuditTrail::new()),
            sagaflow_log::SagaLog::new(100),
            Arc::new(sagaflow_metrics::MetricsAggregator::new(Default::default())),
            CoordinatorConfig::default(),
        )
    }

    #[test]
    fn compensate_rejects_unknown_saga() {
        let coordinator = coordinator();
        let commands = Commands::new(&coordinator);
        let result = commands.compensate(SagaId::new(), "test");
        assert!(matches!(result, Err(ErrorKind::UnknownSaga(_))));
    }
}
