use super::platform::{CameraPlatform, FacingMode, MediaStream, StreamRequest, TrackCapabilities, VideoTrack};
use crate::error::CameraError;
use crate::zoom::ZoomCapability;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exclusive owner of one acquired media stream
pub struct CameraHandle {
    id: u64,
    stream: MediaStream,
    capability: ZoomCapability,
    binding: Option<String>,
    released: bool,
    live_handles: Arc<AtomicUsize>,
}

impl CameraHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    pub fn track(&self) -> Option<Arc<dyn VideoTrack>> {
        self.stream.primary_track()
    }

    /// Zoom capability captured once at acquisition
    pub fn capability(&self) -> ZoomCapability {
        self.capability
    }

    /// Attach the stream to a render target (video element or container)
    pub fn bind(&mut self, element_id: &str) {
        self.binding = Some(element_id.to_string());
    }

    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    fn stop_tracks(&mut self) {
        for track in self.stream.video_tracks() {
            track.stop();
        }
        self.binding = None;
        if !self.released {
            self.released = true;
            self.live_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Camera handle {} dropped without release; stopping its tracks",
                self.id
            );
            self.stop_tracks();
        }
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("id", &self.id)
            .field("stream", &self.stream)
            .field("capability", &self.capability)
            .field("binding", &self.binding)
            .finish()
    }
}

/// Issues camera handles and is the only path that frees camera hardware
pub struct CameraResourceManager {
    platform: Arc<dyn CameraPlatform>,
    next_id: AtomicU64,
    live_handles: Arc<AtomicUsize>,
}

impl CameraResourceManager {
    pub fn new(platform: Arc<dyn CameraPlatform>) -> Self {
        Self {
            platform,
            next_id: AtomicU64::new(1),
            live_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Request a video-only stream and read its zoom capability once
    pub async fn acquire(
        &self,
        facing_mode: FacingMode,
        desired_zoom: f64,
    ) -> Result<CameraHandle, CameraError> {
        let request = StreamRequest {
            facing_mode,
            zoom_ideal: desired_zoom,
        };
        debug!(
            "Requesting {} camera stream (ideal zoom {:.1})",
            facing_mode.as_str(),
            desired_zoom
        );

        let stream = self.platform.get_user_media(&request).await?;
        let capability = stream
            .primary_track()
            .map(|track| derive_capability(&track.capabilities()))
            .unwrap_or_else(ZoomCapability::unsupported);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let live = self.live_handles.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Camera handle {} acquired (stream {}, {} track(s), zoom supported: {}, live handles: {})",
            id,
            stream.id(),
            stream.video_tracks().len(),
            capability.supported,
            live
        );

        Ok(CameraHandle {
            id,
            stream,
            capability,
            binding: None,
            released: false,
            live_handles: Arc::clone(&self.live_handles),
        })
    }

    /// Stop every track and clear the render binding
    pub fn release(&self, mut handle: CameraHandle) {
        let tracks = handle.stream.video_tracks().len();
        handle.stop_tracks();
        info!("Camera handle {} released ({} track(s) stopped)", handle.id, tracks);
    }

    /// Handles acquired and not yet released
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }
}

fn derive_capability(capabilities: &TrackCapabilities) -> ZoomCapability {
    match capabilities.zoom {
        Some(range) => ZoomCapability {
            supported: true,
            min: range.min,
            max: range.max,
            step: range.step,
        },
        None => ZoomCapability::unsupported(),
    }
}
