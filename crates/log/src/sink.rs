//! Optional durable spillover for the Saga Log (spec §4.3).

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::entry::LogEntry;

pub trait FileSink: Send + Sync {
    fn write(&self, entry: &LogEntry);
}

/// Appends one JSON line per entry. Best-effort: write errors are swallowed
/// since the Saga Log is diagnostic, not the ground-truth timeline (that is
/// `sagaflow-audit`, which has its own fsync policy).
pub struct JsonLinesFileSink {
    file: Mutex<std::fs::File>,
}

impl JsonLinesFileSink {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl FileSink for JsonLinesFileSink {
    fn write(&self, entry: &LogEntry) {
        let Ok(line) = serde_json::to_string(entry) else { return };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}
