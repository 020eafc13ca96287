mod manager;
mod platform;
mod simulated;
mod slot;
#[cfg(test)]
mod tests;

pub use manager::{CameraHandle, CameraResourceManager};
pub use platform::{
    CameraPlatform, FacingMode, MediaStream, StreamRequest, TrackCapabilities, VideoFrame,
    VideoTrack, ZoomRange,
};
pub use simulated::{CameraStats, SimulatedCamera, SimulatedCameraOptions};
pub use slot::{AcquiredCamera, CameraSlot};
