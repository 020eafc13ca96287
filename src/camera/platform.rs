use crate::error::{CameraError, ZoomApplyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Which physical camera to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Environment,
    User,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

/// Video-only stream request: `{ facingMode, zoom: { ideal } }`
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub facing_mode: FacingMode,
    pub zoom_ideal: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Track capabilities; `zoom` is absent on cameras without zoom control
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCapabilities {
    pub zoom: Option<ZoomRange>,
}

/// One captured frame as handed to a polling detector
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub sequence: u64,
    pub track_id: String,
    pub zoom: f64,
    pub captured_at: SystemTime,
}

/// A live video track of an acquired stream
#[async_trait]
pub trait VideoTrack: Send + Sync {
    fn id(&self) -> &str;

    /// Capabilities as reported by the hardware
    fn capabilities(&self) -> TrackCapabilities;

    /// Apply a zoom constraint. Takes effect on a later frame.
    async fn apply_zoom(&self, level: f64) -> Result<(), ZoomApplyError>;

    /// Grab the current frame, or `None` while the track has no data yet
    fn capture_frame(&self) -> Option<VideoFrame>;

    /// Stop the track and free the hardware. Idempotent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn VideoTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn VideoTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn video_tracks(&self) -> &[Arc<dyn VideoTrack>] {
        &self.tracks
    }

    pub fn primary_track(&self) -> Option<Arc<dyn VideoTrack>> {
        self.tracks.first().cloned()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field(
                "tracks",
                &self.tracks.iter().map(|t| t.id().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Host camera API (`getUserMedia`)
#[async_trait]
pub trait CameraPlatform: Send + Sync {
    async fn get_user_media(&self, request: &StreamRequest) -> Result<MediaStream, CameraError>;
}
