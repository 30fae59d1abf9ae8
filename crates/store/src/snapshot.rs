//! Optional snapshot-on-change durable persistence + rehydration
//! (spec §4.6, §6.4).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::sync::Mutex;

use sagaflow_core::SagaId;

use crate::instance::SagaInstance;

pub trait SnapshotSink: Send + Sync {
    fn write(&self, instance: &SagaInstance);
}

/// Append-only JSON-lines snapshot file; the latest line per `saga_id` is
/// the effective snapshot, mirroring how an append-only log fakes
/// overwrite-in-place without needing random access writes.
pub struct FileSnapshotSink {
    file: Mutex<std::fs::File>,
}

impl FileSnapshotSink {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Replays the file, keeping only the most recent record per saga,
    /// and returns the non-terminal ones for rehydration (spec §6.4).
    pub fn load_non_terminal(path: &str) -> std::io::Result<Vec<SagaInstance>> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut latest: HashMap<SagaId, SagaInstance> = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(instance) = serde_json::from_str::<SagaInstance>(&line) {
                latest.insert(instance.saga_id, instance);
            }
        }

        Ok(latest
            .into_values()
            .filter(|i| {
                !matches!(
                    i.status,
                    crate::instance::SagaStatus::Completed
                        | crate::instance::SagaStatus::Failed
                        | crate::instance::SagaStatus::Compensated
                )
            })
            .collect())
    }
}

impl SnapshotSink for FileSnapshotSink {
    fn write(&self, instance: &SagaInstance) {
        let Ok(line) = serde_json::to_string(instance) else { return };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}
