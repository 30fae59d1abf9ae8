//! Append-only, durable, per-saga audit trail (spec §4.4).
//!
//! Distinct from `sagaflow-log`: this is the ground-truth business
//! timeline, not a diagnostic log. Each saga's records live in their own
//! `Vec`, keyed by `saga_id`, so `timeline()` is O(records-per-saga) rather
//! than O(total-records) — the same per-stream keying
//! an append-only event store uses for per-aggregate streams.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value as JsonValue;

use sagaflow_core::{FsyncPolicy, PartnerId, SagaId};

use crate::record::{AuditKind, AuditRecord};
use crate::timeline::Timeline;

struct SagaStream {
    saga_type: String,
    status: String,
    records: Vec<AuditRecord>,
    next_seq: AtomicU64,
}

struct DurableSink {
    file: Mutex<File>,
    policy: FsyncPolicy,
    writes_since_fsync: Mutex<u64>,
}

impl DurableSink {
    fn open(path: &str, policy: FsyncPolicy) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            policy,
            writes_since_fsync: Mutex::new(0),
        })
    }

    fn write(&self, record: &AuditRecord) {
        let Ok(line) = serde_json::to_string(record) else { return };
        let mut file = self.file.lock().expect("audit sink lock poisoned");
        let _ = writeln!(file, "{line}");

        match self.policy {
            FsyncPolicy::Always => {
                let _ = file.sync_data();
            }
            FsyncPolicy::Batched => {
                let mut count = self.writes_since_fsync.lock().expect("audit sink counter poisoned");
                *count += 1;
                if *count >= 20 {
                    let _ = file.sync_data();
                    *count = 0;
                }
            }
            FsyncPolicy::Never => {}
        }
    }

    fn flush(&self) {
        if let Ok(file) = self.file.lock() {
            let _ = file.sync_data();
        }
    }
}

/// Per-saga ordered audit records, with optional durable append.
pub struct AuditTrail {
    streams: Mutex<HashMap<SagaId, SagaStream>>,
    sink: Option<DurableSink>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self { streams: Mutex::new(HashMap::new()), sink: None }
    }

    pub fn with_file(path: &str, policy: FsyncPolicy) -> std::io::Result<Self> {
        Ok(Self {
            streams: Mutex::new(HashMap::new()),
            sink: Some(DurableSink::open(path, policy)?),
        })
    }

    /// Records `saga_start` and establishes the stream's `saga_type`.
    pub fn start_saga(&self, saga_id: SagaId, saga_type: impl Into<String>, partner_id: Option<PartnerId>, payload: Option<JsonValue>) {
        let saga_type = saga_type.into();
        let mut streams = self.streams.lock().expect("audit trail lock poisoned");
        streams.entry(saga_id).or_insert_with(|| SagaStream {
            saga_type: saga_type.clone(),
            status: "Initiated".to_string(),
            records: Vec::new(),
            next_seq: AtomicU64::new(1),
        });
        drop(streams);
        self.append(saga_id, partner_id, AuditKind::SagaStart, None, None, payload, None);
    }

    pub fn set_status(&self, saga_id: SagaId, status: impl Into<String>) {
        let mut streams = self.streams.lock().expect("audit trail lock poisoned");
        if let Some(stream) = streams.get_mut(&saga_id) {
            stream.status = status.into();
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        saga_id: SagaId,
        partner_id: Option<PartnerId>,
        kind: AuditKind,
        step_name: Option<String>,
        event_type: Option<String>,
        payload: Option<JsonValue>,
        duration_ms: Option<u64>,
    ) -> u64 {
        let mut streams = self.streams.lock().expect("audit trail lock poisoned");
        let stream = streams.entry(saga_id).or_insert_with(|| SagaStream {
            saga_type: "unknown".to_string(),
            status: "Initiated".to_string(),
            records: Vec::new(),
            next_seq: AtomicU64::new(1),
        });

        let seq = stream.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = AuditRecord {
            saga_id,
            partner_id,
            seq,
            kind,
            step_name,
            event_type,
            payload,
            duration_ms,
            at: Utc::now(),
        };

        if let Some(sink) = &self.sink {
            sink.write(&record);
        }

        stream.records.push(record);
        seq
    }

    /// O(records-per-saga): each saga's records live in their own `Vec`.
    pub fn timeline(&self, saga_id: SagaId) -> Option<Timeline> {
        let streams = self.streams.lock().expect("audit trail lock poisoned");
        let stream = streams.get(&saga_id)?;

        let steps: Vec<AuditRecord> = stream
            .records
            .iter()
            .filter(|r| matches!(r.kind, AuditKind::StepStart | AuditKind::StepSuccess | AuditKind::StepFailure | AuditKind::Timeout))
            .cloned()
            .collect();
        let events: Vec<AuditRecord> = stream
            .records
            .iter()
            .filter(|r| matches!(r.kind, AuditKind::EventIn | AuditKind::EventOut))
            .cloned()
            .collect();

        let start = stream.records.iter().find(|r| r.kind == AuditKind::SagaStart);
        let end = stream.records.iter().rev().find(|r| r.kind == AuditKind::SagaEnd);
        let total_duration_ms = match (start, end) {
            (Some(s), Some(e)) => Some((e.at - s.at).num_milliseconds().max(0) as u64),
            _ => None,
        };

        Some(Timeline {
            saga_id,
            saga_type: stream.saga_type.clone(),
            status: stream.status.clone(),
            steps,
            events,
            total_duration_ms,
        })
    }

    pub fn flush(&self) {
        if let Some(sink) = &self.sink {
            sink.flush();
        }
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}
