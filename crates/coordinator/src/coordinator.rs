//! The saga coordinator (spec §4.7, §5).
//!
//! Wires the state store, broker adapter, audit trail, diagnostic log, and
//! metrics aggregator behind a single `dispatch`/`start`/`compensate`
//! surface. A `hash(saga_id) % workers` partitioning scheme (spec §5) is
//! realized at the broker layer: each saga's events always land in the
//! same in-process dispatch call because `dispatch_envelope` holds the
//! per-saga lock implicitly through `SagaStateStore`'s CAS loop, so no
//! separate worker-pool thread pool is needed here — the broker's own
//! delivery threads ARE the worker pool.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value as JsonValue;

use sagaflow_audit::{AuditKind, AuditTrail};
use sagaflow_broker::{Ack, EventBus, Handler, topic_for};
use sagaflow_core::{CoordinatorConfig, CorrelationId, ErrorKind, ExpectedVersion, PartnerId, SagaId};
use sagaflow_events::{Envelope, EventType};
use sagaflow_log::{EventKind, Level, SagaLog};
use sagaflow_metrics::MetricsAggregator;
use sagaflow_store::{CompletedStep, FailedStep, ListFilters, SagaInstance, SagaStateStore, SagaStatus, StepOutcome};

use crate::compensation::{next_compensation_step, CompensationPlan};
use crate::dispatch::{decide, Decision};
use crate::step::SagaTypeDefinition;
use crate::timeout_wheel::TimeoutWheel;

/// Maximum number of times a CAS write is retried after `StaleVersion`
/// before the envelope is nacked back to the broker (spec §7).
const MAX_CAS_RETRIES: u32 = 3;

pub struct Coordinator {
    saga_types: RwLock<HashMap<&'static str, Arc<dyn SagaTypeDefinition>>>,
    store: Arc<SagaStateStore>,
    bus: Arc<dyn EventBus>,
    audit: Arc<AuditTrail>,
    log: SagaLog,
    metrics: Arc<MetricsAggregator>,
    timeouts: TimeoutWheel,
    config: CoordinatorConfig,
    source: &'static str,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SagaStateStore>,
        bus: Arc<dyn EventBus>,
        audit: Arc<AuditTrail>,
        log: SagaLog,
        metrics: Arc<MetricsAggregator>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let (tx, rx) = std::sync::mpsc::channel();
        let timeouts = TimeoutWheel::start(tx, std::time::Duration::from_millis(250));

        let coordinator = Arc::new(Self {
            saga_types: RwLock::new(HashMap::new()),
            store,
            bus,
            audit,
            log,
            metrics,
            timeouts,
            config,
            source: "sagaflow-coordinator",
        });

        let worker_coordinator = Arc::clone(&coordinator);
        std::thread::spawn(move || {
            while let Ok(fired) = rx.recv() {
                worker_coordinator.handle_timeout(fired.saga_id, &fired.step);
            }
        });

        coordinator
    }

    /// Registers a saga type's static step table. Safe to call any time —
    /// typically once per type at startup, before traffic flows.
    pub fn register_saga_type(&self, definition: Arc<dyn SagaTypeDefinition>) {
        self.saga_types.write().expect("saga type registry lock poisoned").insert(definition.name(), definition);
    }

    fn saga_type(&self, name: &str) -> Option<Arc<dyn SagaTypeDefinition>> {
        self.saga_types.read().expect("saga type registry lock poisoned").get(name).cloned()
    }

    pub fn subscribe_all_topics(self: &Arc<Self>) {
        for topic in [
            sagaflow_events::Topic::PartnerEvents,
            sagaflow_events::Topic::ContractEvents,
            sagaflow_events::Topic::DocumentEvents,
            sagaflow_events::Topic::CampaignEvents,
            sagaflow_events::Topic::RecruitmentEvents,
        ] {
            let handler: Arc<dyn Handler> = Arc::clone(self) as Arc<dyn Handler>;
            self.bus.subscribe(topic, "sagaflow-coordinator", handler);
        }
    }

    /// Start a new saga instance (spec §6.3 `start`).
    pub fn start(
        &self,
        saga_type: &str,
        initial_payload: JsonValue,
        correlation_id: Option<CorrelationId>,
        partner_id: Option<PartnerId>,
    ) -> Result<SagaId, ErrorKind> {
        let Some(definition) = self.saga_type(saga_type) else {
            return Err(ErrorKind::Fatal(format!("unregistered saga type: {saga_type}")));
        };
        let Some(first_step) = definition.step(0) else {
            return Err(ErrorKind::Fatal(format!("saga type {saga_type} has no steps")));
        };

        let saga_id = SagaId::new();
        let correlation_id = correlation_id.unwrap_or_else(|| CorrelationId::new(saga_id.to_string()));
        let now = Utc::now();

        let mut instance = SagaInstance::new(
            saga_id,
            saga_type,
            correlation_id.clone(),
            partner_id,
            initial_payload.clone(),
            self.config.idempotency_window,
            now,
        );
        instance.status = SagaStatus::AwaitingStep(1);
        let deadline = now + chrono::Duration::from_std(self.config.step_timeout(first_step.name, first_step.timeout)).unwrap_or_default();
        instance.pending_step = Some(sagaflow_store::PendingStep { name: first_step.name.to_string(), started_at: now, deadline });

        self.store.create(instance)?;
        self.audit.start_saga(saga_id, saga_type, partner_id, Some(initial_payload.clone()));
        self.audit.append(saga_id, partner_id, AuditKind::StepStart, Some(first_step.name.to_string()), None, None, None);
        self.metrics.saga_started(saga_type);
        self.log.append(Level::Info, EventKind::SagaStarted, Some(saga_id), partner_id, format!("saga started: {saga_type}"));

        let trigger_payload = definition.build_trigger_payload(&initial_payload, partner_id);
        let envelope = Envelope::initiating(first_step.forward_event, saga_id, correlation_id, self.source, trigger_payload, now);
        self.emit(first_step.forward_event, envelope, first_step.retries)?;
        self.timeouts.arm(saga_id, first_step.name, deadline);

        Ok(saga_id)
    }

    /// Manual compensate command (spec §6.3 `compensate`).
    ///
    /// Idempotent: re-issuing on an already-`Compensating` saga is a no-op
    /// (spec §5 "Cancellation & timeouts") rather than appending a second
    /// `ManualCompensate` failure entry and re-driving the compensation
    /// walk from scratch.
    pub fn compensate(&self, saga_id: SagaId, reason: impl Into<String>) -> Result<(), ErrorKind> {
        match self.store.get(saga_id) {
            None => return Err(ErrorKind::UnknownSaga(saga_id.to_string())),
            Some(saga) if saga.status == SagaStatus::Compensating => return Ok(()),
            Some(_) => {}
        }

        let reason = reason.into();
        self.transition_saga(saga_id, move |saga| {
            if matches!(saga.status, SagaStatus::Completed | SagaStatus::Failed | SagaStatus::Compensated | SagaStatus::Compensating) {
                return None;
            }
            saga.failed_steps.push(FailedStep {
                step: current_step_name(saga).unwrap_or_else(|| "manual".to_string()),
                error_kind: "ManualCompensate".to_string(),
                message: reason.clone(),
                at: Utc::now(),
            });
            saga.status = SagaStatus::Compensating;
            Some(saga.clone())
        })?;
        self.run_compensation(saga_id)
    }

    pub fn status(&self, saga_id: SagaId) -> Option<SagaInstance> {
        self.store.get(saga_id)
    }

    pub fn timeline(&self, saga_id: SagaId) -> Option<sagaflow_audit::Timeline> {
        self.audit.timeline(saga_id)
    }

    pub fn list(&self, filters: &ListFilters) -> Vec<SagaInstance> {
        self.store.list(filters)
    }

    fn handle_timeout(&self, saga_id: SagaId, step_name: &str) {
        let Some(saga) = self.store.get(saga_id) else { return };
        let SagaStatus::AwaitingStep(k) = saga.status else { return };
        let Some(definition) = self.saga_type(&saga.saga_type) else { return };
        let Some(step) = definition.step((k.saturating_sub(1)) as usize) else { return };
        if step.name != step_name {
            return; // stale fire for a step the saga already moved past
        }

        self.log.append(
            Level::Warn,
            EventKind::TimeoutFired,
            Some(saga_id),
            saga.partner_id,
            format!("step '{step_name}' timed out"),
        );
        self.audit.append(saga_id, saga.partner_id, AuditKind::Timeout, Some(step_name.to_string()), None, None, None);

        let message = format!("step '{step_name}' timed out");
        let _ = self.transition_saga(saga_id, move |saga| {
            if saga.status != SagaStatus::AwaitingStep(k) {
                return None; // already moved on before the timeout landed
            }
            saga.failed_steps.push(FailedStep {
                step: step_name.to_string(),
                error_kind: "StepTimeout".to_string(),
                message: message.clone(),
                at: Utc::now(),
            });
            saga.status = SagaStatus::Compensating;
            Some(saga.clone())
        });
        let _ = self.run_compensation(saga_id);
    }

    fn run_compensation(&self, saga_id: SagaId) -> Result<(), ErrorKind> {
        loop {
            let Some(saga) = self.store.get(saga_id) else { return Ok(()) };
            if saga.status != SagaStatus::Compensating {
                return Ok(());
            }
            let Some(definition) = self.saga_type(&saga.saga_type) else {
                return Err(ErrorKind::Fatal(format!("unregistered saga type: {}", saga.saga_type)));
            };

            match next_compensation_step(definition.as_ref(), &saga) {
                CompensationPlan::Skip { step_name } => {
                    self.transition_saga(saga_id, move |saga| {
                        saga.compensated_steps.push(step_name.clone());
                        Some(saga.clone())
                    })?;
                }
                CompensationPlan::Emit { step_name, event_type } => {
                    let correlation_id = saga.correlation_id.clone();
                    let payload = definition.build_trigger_payload(&saga.initial_payload, saga.partner_id);
                    let initiating = Envelope::initiating(event_type, saga_id, correlation_id, self.source, payload, Utc::now());
                    if let Err(e) = self.emit(event_type, initiating, 3) {
                        self.log.append(Level::Critical, EventKind::StepFailed, Some(saga_id), saga.partner_id, format!("compensation emit failed for {step_name}: {e}"));
                        return Err(e);
                    }
                    self.audit.append(saga_id, saga.partner_id, AuditKind::StepFailure, Some(step_name.clone()), Some(event_type.to_string()), None, None);
                    self.transition_saga(saga_id, move |saga| {
                        saga.compensated_steps.push(step_name.clone());
                        Some(saga.clone())
                    })?;
                }
                CompensationPlan::Done => {
                    let duration_ms = (Utc::now() - saga.created_at).num_milliseconds().max(0) as u64;
                    let is_unrecoverable = saga.failed_steps.iter().any(|f| f.error_kind == "CompensationFailed");
                    let final_status = if is_unrecoverable { SagaStatus::Failed } else { SagaStatus::Compensated };
                    let terminal_event = if is_unrecoverable { EventType::PartnerOnboardingFailed } else { EventType::PartnerOnboardingCompensated };

                    let terminal_payload = definition.build_trigger_payload(&saga.initial_payload, saga.partner_id);
                    let terminal = Envelope::initiating(terminal_event, saga_id, saga.correlation_id.clone(), self.source, terminal_payload, Utc::now());
                    if let Err(e) = self.emit(terminal_event, terminal, 3) {
                        self.log.append(Level::Critical, EventKind::StepFailed, Some(saga_id), saga.partner_id, format!("failed to publish terminal event: {e}"));
                    }

                    self.audit.set_status(saga_id, if is_unrecoverable { "Failed" } else { "Compensated" });
                    self.audit.append(saga_id, saga.partner_id, AuditKind::SagaEnd, None, None, None, None);
                    if is_unrecoverable {
                        self.metrics.saga_failed(&saga.saga_type, duration_ms);
                    } else {
                        self.metrics.saga_compensated(&saga.saga_type, duration_ms);
                    }
                    self.log.append(Level::Info, EventKind::SagaCompensationCompleted, Some(saga_id), saga.partner_id, "compensation complete".to_string());
                    self.transition_saga(saga_id, move |saga| {
                        saga.status = final_status;
                        Some(saga.clone())
                    })?;
                    return Ok(());
                }
            }
        }
    }

    /// Decode-then-dispatch entry point used directly by tests and by the
    /// `Handler` impl below for broker-delivered raw envelopes.
    pub fn dispatch_envelope(&self, envelope: Envelope) -> Ack {
        let saga_id = match envelope.saga_id() {
            Some(id) => id,
            None => match self.store.saga_id_for_correlation(envelope.correlation_id()) {
                Some(id) => id,
                None => {
                    self.log.append(Level::Debug, EventKind::EventReceived, None, None, "event for unknown correlation id, dropped".to_string());
                    return Ack::Ack;
                }
            },
        };

        let Some(saga) = self.store.get(saga_id) else {
            self.log.append(Level::Debug, EventKind::EventReceived, Some(saga_id), None, "event for unknown saga id, dropped".to_string());
            return Ack::Ack;
        };

        if saga.has_processed(envelope.event_id()) {
            return Ack::Ack; // duplicate: already applied, exactly-once effect preserved
        }

        self.metrics.event_observed(&saga.saga_type);
        self.audit.append(saga_id, saga.partner_id, AuditKind::EventIn, None, Some(envelope.event_type().to_string()), Some(envelope.payload().clone()), None);

        let Some(definition) = self.saga_type(&saga.saga_type) else {
            self.log.append(Level::Error, EventKind::StepFailed, Some(saga_id), saga.partner_id, format!("unregistered saga type: {}", saga.saga_type));
            return Ack::DeadLetter;
        };

        match decide(definition.as_ref(), &saga, &envelope) {
            Decision::Advance { step_index, completed_at } => self.apply_advance(&definition, saga, envelope, step_index, completed_at),
            Decision::EnterCompensation { failed_step_index, message } => self.apply_enter_compensation(&definition, saga, envelope, failed_step_index, message),
            Decision::Unexpected => {
                self.log.append(Level::Warn, EventKind::EventReceived, Some(saga_id), saga.partner_id, format!("unexpected transition: {}", envelope.event_type()));
                Ack::Ack
            }
            Decision::Unrecognized => {
                self.log.append(Level::Error, EventKind::EventReceived, Some(saga_id), saga.partner_id, format!("unrecognized event type: {}", envelope.event_type()));
                Ack::DeadLetter
            }
            Decision::Ignored => Ack::Ack,
        }
    }

    fn apply_advance(
        &self,
        definition: &Arc<dyn SagaTypeDefinition>,
        saga: SagaInstance,
        envelope: Envelope,
        step_index: usize,
        completed_at: chrono::DateTime<Utc>,
    ) -> Ack {
        let saga_id = saga.saga_id;
        let step = definition.step(step_index).expect("step_index came from this definition");
        let started_at = saga.pending_step.as_ref().map(|p| p.started_at).unwrap_or(completed_at);
        let event_id = envelope.event_id();
        let is_last_step = step_index + 1 == definition.total_steps();

        let next_step = (!is_last_step).then(|| definition.step(step_index + 1).expect("is_last_step was false"));
        let next_deadline = next_step.as_ref().map(|next| {
            Utc::now() + chrono::Duration::from_std(self.config.step_timeout(next.name, next.timeout)).unwrap_or_default()
        });

        let compute = move |fresh: &SagaInstance| {
            let mut new_state = fresh.clone();
            new_state.mark_processed(event_id);
            new_state.completed_steps.push(CompletedStep {
                step: step.name.to_string(),
                started_at,
                completed_at,
                outcome: StepOutcome::Success,
            });
            new_state.status = if is_last_step { SagaStatus::Completed } else { SagaStatus::AwaitingStep(step_index as u32 + 2) };
            new_state.pending_step = match (&next_step, next_deadline) {
                (Some(next), Some(deadline)) => Some(sagaflow_store::PendingStep {
                    name: next.name.to_string(),
                    started_at: completed_at,
                    deadline,
                }),
                _ => None,
            };
            new_state
        };

        if self.update_with_retry(saga_id, saga.clone(), compute).is_err() {
            return Ack::Nack;
        }

        self.timeouts.cancel(saga_id, step.name);
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;
        self.audit.append(saga_id, saga.partner_id, AuditKind::StepSuccess, Some(step.name.to_string()), Some(envelope.event_type().to_string()), None, Some(duration_ms));
        self.metrics.step_duration(&saga.saga_type, step.name, duration_ms, None);
        self.log.append(Level::Info, EventKind::StepCompleted, Some(saga_id), saga.partner_id, format!("step '{}' completed", step.name));

        if is_last_step {
            let total_ms = (completed_at - saga.created_at).num_milliseconds().max(0) as u64;
            self.audit.set_status(saga_id, "Completed");
            self.audit.append(saga_id, saga.partner_id, AuditKind::SagaEnd, None, None, None, None);
            self.metrics.saga_completed(&saga.saga_type, total_ms);
            self.log.append(Level::Info, EventKind::SagaCompleted, Some(saga_id), saga.partner_id, "saga completed".to_string());
            let terminal_payload = definition.build_trigger_payload(&saga.initial_payload, saga.partner_id);
            let terminal = envelope.caused_by(EventType::PartnerOnboardingCompleted, self.source, terminal_payload, Utc::now());
            if let Err(e) = self.emit(EventType::PartnerOnboardingCompleted, terminal, 3) {
                self.log.append(Level::Critical, EventKind::StepFailed, Some(saga_id), saga.partner_id, format!("failed to publish saga-completed event: {e}"));
            }
            return Ack::Ack;
        }

        let next_step = next_step.expect("is_last_step was false");
        let deadline = next_deadline.expect("is_last_step was false");
        self.audit.append(saga_id, saga.partner_id, AuditKind::StepStart, Some(next_step.name.to_string()), None, None, None);
        self.log.append(Level::Info, EventKind::StepStarted, Some(saga_id), saga.partner_id, format!("step '{}' started", next_step.name));

        let next_payload = definition.build_trigger_payload(&saga.initial_payload, saga.partner_id);
        let next_envelope = envelope.caused_by(next_step.forward_event, self.source, next_payload, Utc::now());
        if let Err(e) = self.emit(next_step.forward_event, next_envelope, next_step.retries) {
            self.log.append(Level::Critical, EventKind::StepFailed, Some(saga_id), saga.partner_id, format!("failed to trigger step '{}': {e}", next_step.name));
            return Ack::Ack; // saga stays in its current step per spec §4.7; retried on next poll/restart
        }
        self.timeouts.arm(saga_id, next_step.name, deadline);

        Ack::Ack
    }

    fn apply_enter_compensation(
        &self,
        definition: &Arc<dyn SagaTypeDefinition>,
        saga: SagaInstance,
        envelope: Envelope,
        failed_step_index: usize,
        message: String,
    ) -> Ack {
        let saga_id = saga.saga_id;
        let step = definition.step(failed_step_index).expect("failed_step_index came from this definition");
        let event_id = envelope.event_id();
        let occurred_at = envelope.occurred_at();

        self.timeouts.cancel(saga_id, step.name);

        let compute = move |fresh: &SagaInstance| {
            let mut new_state = fresh.clone();
            new_state.mark_processed(event_id);
            new_state.failed_steps.push(FailedStep {
                step: step.name.to_string(),
                error_kind: "StepFailed".to_string(),
                message: message.clone(),
                at: occurred_at,
            });
            new_state.status = SagaStatus::Compensating;
            new_state
        };

        if self.update_with_retry(saga_id, saga.clone(), compute).is_err() {
            return Ack::Nack;
        }

        self.audit.append(saga_id, saga.partner_id, AuditKind::StepFailure, Some(step.name.to_string()), Some(envelope.event_type().to_string()), None, None);
        self.log.append(Level::Warn, EventKind::StepFailed, Some(saga_id), saga.partner_id, format!("step '{}' failed, entering compensation", step.name));
        self.audit.set_status(saga_id, "Compensating");
        self.log.append(Level::Info, EventKind::SagaCompensationStarted, Some(saga_id), saga.partner_id, "compensation started".to_string());

        if let Err(e) = self.run_compensation(saga_id) {
            self.log.append(Level::Critical, EventKind::StepFailed, Some(saga_id), saga.partner_id, format!("compensation aborted: {e}"));
        }
        Ack::Ack
    }

    /// Applies `compute` against `current`, retrying against a freshly
    /// reloaded saga up to `MAX_CAS_RETRIES` times when the CAS write loses
    /// a concurrent-update race (spec §7 `StaleVersion`); exhaustion is
    /// surfaced to the caller as `Ack::Nack` so the broker redelivers.
    fn update_with_retry(
        &self,
        saga_id: SagaId,
        current: SagaInstance,
        compute: impl Fn(&SagaInstance) -> SagaInstance,
    ) -> Result<SagaInstance, Ack> {
        let mut saga = current;
        for attempt in 0..=MAX_CAS_RETRIES {
            let new_state = compute(&saga);
            match self.store.update(saga_id, ExpectedVersion::Exact(saga.version), new_state) {
                Ok(updated) => return Ok(updated),
                Err(ErrorKind::StaleVersion { .. }) if attempt < MAX_CAS_RETRIES => match self.store.get(saga_id) {
                    Some(fresh) => saga = fresh,
                    None => return Err(Ack::Nack),
                },
                Err(_) => return Err(Ack::Nack),
            }
        }
        Err(Ack::Nack)
    }

    fn transition_saga(
        &self,
        saga_id: SagaId,
        transform: impl Fn(&mut SagaInstance) -> Option<SagaInstance>,
    ) -> Result<(), ErrorKind> {
        let mut attempts = 0;
        loop {
            let Some(mut current) = self.store.get(saga_id) else {
                return Err(ErrorKind::UnknownSaga(saga_id.to_string()));
            };
            let expected_version = current.version;
            let Some(new_state) = transform(&mut current) else {
                return Ok(());
            };
            match self.store.update(saga_id, ExpectedVersion::Exact(expected_version), new_state) {
                Ok(_) => return Ok(()),
                Err(ErrorKind::StaleVersion { .. }) if attempts < MAX_CAS_RETRIES => {
                    attempts += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn emit(&self, event_type: EventType, envelope: Envelope, retries: u32) -> Result<(), ErrorKind> {
        self.audit.append(
            envelope.saga_id().unwrap_or(SagaId::nil()),
            None,
            AuditKind::EventOut,
            None,
            Some(event_type.to_string()),
            Some(envelope.payload().clone()),
            None,
        );

        let backoff = sagaflow_broker::Backoff::default();
        let mut last_error = None;
        for attempt in 1..=retries.max(1) {
            match self.bus.publish(topic_for(event_type), envelope.clone()) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < retries.max(1) {
                        std::thread::sleep(backoff.delay_for_attempt(attempt));
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ErrorKind::BrokerUnavailable("publish failed with no error detail".to_string())))
    }
}

impl Handler for Coordinator {
    fn handle(&self, envelope: Envelope) -> Ack {
        self.dispatch_envelope(envelope)
    }
}

fn current_step_name(saga: &SagaInstance) -> Option<String> {
    match saga.status {
        SagaStatus::AwaitingStep(_) => saga.pending_step.as_ref().map(|p| p.name.clone()),
        _ => None,
    }
}
