use crate::backend::BackendKind;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Receives successful decodes. Fire-and-forget: implementations must not
/// block and cannot fail the session.
pub trait ResultSink: Send + Sync {
    fn record(&self, value: &str, backend: BackendKind, timestamp: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEntry {
    pub id: Uuid,
    pub value: String,
    /// Display label of the backend that decoded the value
    pub scanner: String,
    pub timestamp: DateTime<Utc>,
}

/// In-memory history, newest entry first
#[derive(Debug, Default)]
pub struct ScanHistory {
    entries: Mutex<Vec<ScanEntry>>,
}

impl ScanHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ScanEntry> {
        self.entries.lock().clone()
    }

    pub fn latest(&self) -> Option<ScanEntry> {
        self.entries.lock().first().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let removed = {
            let mut entries = self.entries.lock();
            let removed = entries.len();
            entries.clear();
            removed
        };
        info!("Scan history cleared ({} entries)", removed);
    }
}

impl ResultSink for ScanHistory {
    fn record(&self, value: &str, backend: BackendKind, timestamp: DateTime<Utc>) {
        let entry = ScanEntry {
            id: Uuid::new_v4(),
            value: value.to_string(),
            scanner: backend.label().to_string(),
            timestamp,
        };
        debug!("History entry {} from {}", entry.id, entry.scanner);
        self.entries.lock().insert(0, entry);
    }
}
