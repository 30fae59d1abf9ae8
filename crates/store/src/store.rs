//! In-memory authoritative saga state, keyed by `saga_id`, with optimistic
//! concurrency and secondary indexes (spec §4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use sagaflow_core::{CorrelationId, ErrorKind, ExpectedVersion, PartnerId, SagaId};

use crate::instance::{SagaInstance, StatusKind};
use crate::snapshot::SnapshotSink;

#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub saga_type: Option<String>,
    pub status: Option<StatusKind>,
    pub partner_id: Option<PartnerId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

struct Indexes {
    by_type_status: HashMap<(String, StatusKind), Vec<SagaId>>,
    by_partner: HashMap<PartnerId, Vec<SagaId>>,
}

impl Indexes {
    fn new() -> Self {
        Self { by_type_status: HashMap::new(), by_partner: HashMap::new() }
    }

    fn insert(&mut self, instance: &SagaInstance) {
        self.by_type_status
            .entry((instance.saga_type.clone(), instance.status_kind()))
            .or_default()
            .push(instance.saga_id);
        if let Some(partner_id) = instance.partner_id {
            self.by_partner.entry(partner_id).or_default().push(instance.saga_id);
        }
    }

    fn remove_from_status(&mut self, saga_type: &str, status: StatusKind, saga_id: SagaId) {
        if let Some(v) = self.by_type_status.get_mut(&(saga_type.to_string(), status)) {
            v.retain(|id| *id != saga_id);
        }
    }
}

pub struct SagaStateStore {
    instances: Mutex<HashMap<SagaId, SagaInstance>>,
    correlation_index: Mutex<HashMap<CorrelationId, SagaId>>,
    indexes: Mutex<Indexes>,
    snapshot_sink: Option<Arc<dyn SnapshotSink>>,
}

impl SagaStateStore {
    pub fn new() -> Self {
        Self::with_snapshot_sink(None)
    }

    pub fn with_snapshot_sink(snapshot_sink: Option<Arc<dyn SnapshotSink>>) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            correlation_index: Mutex::new(HashMap::new()),
            indexes: Mutex::new(Indexes::new()),
            snapshot_sink,
        }
    }

    /// Re-populate the store from a rehydrated set (spec §6.4: non-terminal
    /// sagas resume from their last persisted step on restart).
    pub fn rehydrate(&self, instances: Vec<SagaInstance>) {
        let mut guard = self.instances.lock().expect("store lock poisoned");
        let mut correlation = self.correlation_index.lock().expect("correlation index lock poisoned");
        let mut indexes = self.indexes.lock().expect("store indexes lock poisoned");
        for instance in instances {
            correlation.insert(instance.correlation_id.clone(), instance.saga_id);
            indexes.insert(&instance);
            guard.insert(instance.saga_id, instance);
        }
    }

    pub fn get(&self, saga_id: SagaId) -> Option<SagaInstance> {
        self.instances.lock().expect("store lock poisoned").get(&saga_id).cloned()
    }

    pub fn saga_id_for_correlation(&self, correlation_id: &CorrelationId) -> Option<SagaId> {
        self.correlation_index.lock().expect("correlation index lock poisoned").get(correlation_id).copied()
    }

    pub fn create(&self, instance: SagaInstance) -> Result<(), ErrorKind> {
        let mut guard = self.instances.lock().expect("store lock poisoned");
        if guard.contains_key(&instance.saga_id) {
            return Err(ErrorKind::Fatal(format!(
                "saga {} already exists",
                instance.saga_id
            )));
        }

        self.correlation_index
            .lock()
            .expect("correlation index lock poisoned")
            .insert(instance.correlation_id.clone(), instance.saga_id);
        self.indexes.lock().expect("store indexes lock poisoned").insert(&instance);

        if let Some(sink) = &self.snapshot_sink {
            sink.write(&instance);
        }

        guard.insert(instance.saga_id, instance);
        Ok(())
    }

    /// Optimistic update: fails with `ErrorKind::StaleVersion` if
    /// `expected_version` doesn't match the stored version.
    pub fn update(
        &self,
        saga_id: SagaId,
        expected_version: ExpectedVersion,
        mut new_state: SagaInstance,
    ) -> Result<SagaInstance, ErrorKind> {
        let mut guard = self.instances.lock().expect("store lock poisoned");
        let current = guard
            .get(&saga_id)
            .ok_or_else(|| ErrorKind::UnknownSaga(saga_id.to_string()))?;

        if !expected_version.matches(current.version) {
            return Err(ErrorKind::StaleVersion {
                expected: match expected_version {
                    ExpectedVersion::Exact(v) => v,
                    _ => current.version,
                },
                found: current.version,
            });
        }

        let previous_status_kind = current.status_kind();
        let previous_type = current.saga_type.clone();

        new_state.version = current.version + 1;
        new_state.updated_at = Utc::now();

        let mut indexes = self.indexes.lock().expect("store indexes lock poisoned");
        indexes.remove_from_status(&previous_type, previous_status_kind, saga_id);
        indexes.insert(&new_state);
        drop(indexes);

        if let Some(sink) = &self.snapshot_sink {
            sink.write(&new_state);
        }

        guard.insert(saga_id, new_state.clone());
        Ok(new_state)
    }

    pub fn list(&self, filters: &ListFilters) -> Vec<SagaInstance> {
        let guard = self.instances.lock().expect("store lock poisoned");
        let mut results: Vec<SagaInstance> = guard
            .values()
            .filter(|i| filters.saga_type.as_ref().is_none_or(|t| *t == i.saga_type))
            .filter(|i| filters.status.is_none_or(|s| s == i.status_kind()))
            .filter(|i| filters.partner_id.is_none_or(|p| Some(p) == i.partner_id))
            .filter(|i| filters.since.is_none_or(|since| i.created_at >= since))
            .filter(|i| filters.until.is_none_or(|until| i.created_at <= until))
            .cloned()
            .collect();

        results.sort_by_key(|i| i.created_at);
        if let Some(limit) = filters.limit {
            results.truncate(limit);
        }
        results
    }
}

impl Default for SagaStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh_instance() -> SagaInstance {
        SagaInstance::new(
            SagaId::new(),
            "partner-onboarding",
            CorrelationId::new("corr-1"),
            None,
            json!({}),
            1000,
            Utc::now(),
        )
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = SagaStateStore::new();
        let instance = fresh_instance();
        let saga_id = instance.saga_id;
        store.create(instance).unwrap();

        let fetched = store.get(saga_id).unwrap();
        assert_eq!(fetched.saga_id, saga_id);
        assert_eq!(fetched.version, 0);
    }

    #[test]
    fn update_with_stale_version_fails() {
        let store = SagaStateStore::new();
        let instance = fresh_instance();
        let saga_id = instance.saga_id;
        store.create(instance.clone()).unwrap();

        let result = store.update(saga_id, ExpectedVersion::Exact(5), instance);
        assert!(matches!(result, Err(ErrorKind::StaleVersion { .. })));
    }

    #[test]
    fn update_increments_version() {
        let store = SagaStateStore::new();
        let instance = fresh_instance();
        let saga_id = instance.saga_id;
        store.create(instance.clone()).unwrap();

        let updated = store.update(saga_id, ExpectedVersion::Exact(0), instance).unwrap();
        assert_eq!(updated.version, 1);
    }

    #[test]
    fn correlation_id_resolves_to_saga_id() {
        let store = SagaStateStore::new();
        let instance = fresh_instance();
        let saga_id = instance.saga_id;
        let correlation_id = instance.correlation_id.clone();
        store.create(instance).unwrap();

        assert_eq!(store.saga_id_for_correlation(&correlation_id), Some(saga_id));
    }

    #[test]
    fn list_filters_by_saga_type_and_status() {
        let store = SagaStateStore::new();
        let instance = fresh_instance();
        store.create(instance).unwrap();

        let results = store.list(&ListFilters {
            saga_type: Some("partner-onboarding".to_string()),
            status: Some(StatusKind::Initiated),
            ..Default::default()
        });
        assert_eq!(results.len(), 1);
    }
}
