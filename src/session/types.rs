use crate::backend::BackendKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Lifecycle of one scan session:
/// `Idle -> Acquiring -> Streaming -> Detecting -> {Detected | Failed}`, with
/// `Detected/Failed -> Acquiring` on scan again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Acquiring,
    Streaming,
    Detecting,
    Detected,
    Failed,
}

impl SessionState {
    /// Detected and Failed end a run; only an explicit restart leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Detected | SessionState::Failed)
    }

    /// States in which a run holds, or is about to hold, the camera
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SessionState::Acquiring | SessionState::Streaming | SessionState::Detecting
        )
    }

    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle) || self.is_terminal()
    }
}

/// Mutable record of one backend's scanning session
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    pub backend: BackendKind,
    pub state: SessionState,
    pub zoom_level: f64,
    /// Lowest level the track accepts; never below 1
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub supports_zoom: bool,
    pub miss_count: u32,
    pub last_miss_at: Option<Instant>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    /// Last engine error reported while scanning continued
    pub engine_error: Option<String>,
}

impl ScanSession {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            state: SessionState::Idle,
            zoom_level: 1.0,
            min_zoom: 1.0,
            max_zoom: 1.0,
            supports_zoom: false,
            miss_count: 0,
            last_miss_at: None,
            result: None,
            error_message: None,
            engine_error: None,
        }
    }
}

/// A successful decode, forwarded once to the result sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub value: String,
    pub backend: BackendKind,
    pub timestamp: DateTime<Utc>,
}
