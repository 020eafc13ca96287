use super::platform::{
    CameraPlatform, MediaStream, StreamRequest, TrackCapabilities, VideoFrame, VideoTrack, ZoomRange,
};
use crate::error::{CameraError, ZoomApplyError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Counters shared by a simulated camera and every track it hands out
#[derive(Debug, Default)]
pub struct CameraStats {
    pub requests: AtomicU64,
    pub tracks_started: AtomicU64,
    pub tracks_stopped: AtomicU64,
    pub frames_captured: AtomicU64,
    pub zoom_rejections: AtomicU64,
    applied_zooms: Mutex<Vec<f64>>,
    last_request: Mutex<Option<StreamRequest>>,
}

impl CameraStats {
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn tracks_started(&self) -> u64 {
        self.tracks_started.load(Ordering::SeqCst)
    }

    pub fn tracks_stopped(&self) -> u64 {
        self.tracks_stopped.load(Ordering::SeqCst)
    }

    pub fn active_tracks(&self) -> u64 {
        self.tracks_started() - self.tracks_stopped()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::SeqCst)
    }

    pub fn zoom_rejections(&self) -> u64 {
        self.zoom_rejections.load(Ordering::SeqCst)
    }

    /// Zoom levels accepted by tracks, in order
    pub fn applied_zooms(&self) -> Vec<f64> {
        self.applied_zooms.lock().clone()
    }

    pub fn last_request(&self) -> Option<StreamRequest> {
        self.last_request.lock().clone()
    }
}

/// Behaviour of a simulated camera
#[derive(Debug, Clone)]
pub struct SimulatedCameraOptions {
    /// Reported zoom range; `None` means no zoom control
    pub zoom: Option<ZoomRange>,
    /// Fail every acquisition with this error
    pub failure: Option<CameraError>,
    /// Reject every zoom constraint
    pub reject_zoom: bool,
}

impl Default for SimulatedCameraOptions {
    fn default() -> Self {
        Self {
            zoom: Some(ZoomRange {
                min: 1.0,
                max: 3.0,
                step: 0.1,
            }),
            failure: None,
            reject_zoom: false,
        }
    }
}

/// In-process camera platform used by the harness binary and the tests
pub struct SimulatedCamera {
    options: Mutex<SimulatedCameraOptions>,
    stats: Arc<CameraStats>,
    gate: watch::Sender<bool>,
    next_stream: AtomicU64,
}

impl SimulatedCamera {
    pub fn new(options: SimulatedCameraOptions) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            options: Mutex::new(options),
            stats: Arc::new(CameraStats::default()),
            gate,
            next_stream: AtomicU64::new(1),
        }
    }

    pub fn without_zoom() -> Self {
        Self::new(SimulatedCameraOptions {
            zoom: None,
            ..SimulatedCameraOptions::default()
        })
    }

    pub fn denying_permission() -> Self {
        Self::new(SimulatedCameraOptions {
            failure: Some(CameraError::PermissionDenied {
                details: "Permission denied".to_string(),
            }),
            ..SimulatedCameraOptions::default()
        })
    }

    pub fn stats(&self) -> Arc<CameraStats> {
        Arc::clone(&self.stats)
    }

    pub fn set_options(&self, options: SimulatedCameraOptions) {
        *self.options.lock() = options;
    }

    /// Park acquisitions until `open_gate` is called, like a pending
    /// permission prompt
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(SimulatedCameraOptions::default())
    }
}

#[async_trait]
impl CameraPlatform for SimulatedCamera {
    async fn get_user_media(&self, request: &StreamRequest) -> Result<MediaStream, CameraError> {
        self.stats.requests.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_request.lock() = Some(request.clone());

        let mut gate = self.gate.subscribe();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        if !opened {
            return Err(CameraError::Unavailable {
                details: "camera platform shut down".to_string(),
            });
        }

        let options = self.options.lock().clone();
        if let Some(failure) = options.failure {
            debug!("Simulated camera refusing request: {}", failure);
            return Err(failure);
        }

        let stream_id = self.next_stream.fetch_add(1, Ordering::SeqCst);
        let initial_zoom = options
            .zoom
            .map(|range| request.zoom_ideal.clamp(range.min, range.max))
            .unwrap_or(1.0);
        let track = SimulatedTrack {
            id: format!("sim-track-{}", stream_id),
            zoom_range: options.zoom,
            reject_zoom: options.reject_zoom,
            zoom: Mutex::new(initial_zoom),
            live: AtomicBool::new(true),
            sequence: AtomicU64::new(0),
            stats: Arc::clone(&self.stats),
        };
        self.stats.tracks_started.fetch_add(1, Ordering::SeqCst);

        Ok(MediaStream::new(
            format!("sim-stream-{}", stream_id),
            vec![Arc::new(track) as Arc<dyn VideoTrack>],
        ))
    }
}

struct SimulatedTrack {
    id: String,
    zoom_range: Option<ZoomRange>,
    reject_zoom: bool,
    zoom: Mutex<f64>,
    live: AtomicBool,
    sequence: AtomicU64,
    stats: Arc<CameraStats>,
}

#[async_trait]
impl VideoTrack for SimulatedTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> TrackCapabilities {
        TrackCapabilities {
            zoom: self.zoom_range,
        }
    }

    async fn apply_zoom(&self, level: f64) -> Result<(), ZoomApplyError> {
        let reject = |details: &str| {
            self.stats.zoom_rejections.fetch_add(1, Ordering::SeqCst);
            Err(ZoomApplyError {
                level,
                details: details.to_string(),
            })
        };

        if !self.is_live() {
            return reject("track ended");
        }
        if self.reject_zoom {
            return reject("constraint rejected by hardware");
        }
        let range = match self.zoom_range {
            Some(range) => range,
            None => return reject("zoom not supported"),
        };

        let applied = level.clamp(range.min, range.max);
        *self.zoom.lock() = applied;
        self.stats.applied_zooms.lock().push(applied);
        trace!("Track {} zoom set to {:.1}", self.id, applied);
        Ok(())
    }

    fn capture_frame(&self) -> Option<VideoFrame> {
        if !self.is_live() {
            return None;
        }
        self.stats.frames_captured.fetch_add(1, Ordering::SeqCst);
        Some(VideoFrame {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            track_id: self.id.clone(),
            zoom: *self.zoom.lock(),
            captured_at: SystemTime::now(),
        })
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.stats.tracks_stopped.fetch_add(1, Ordering::SeqCst);
            debug!("Track {} stopped", self.id);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}
