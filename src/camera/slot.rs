use super::manager::{CameraHandle, CameraResourceManager};
use super::platform::{FacingMode, MediaStream, VideoTrack};
use crate::error::CameraError;
use crate::zoom::ZoomCapability;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a successful acquisition hands back to the caller
#[derive(Debug, Clone)]
pub struct AcquiredCamera {
    pub stream: MediaStream,
    pub capability: ZoomCapability,
}

/// Holds the single camera handle of one session run.
///
/// Acquisition runs detached so its completion is always observed: a handle
/// that arrives after the run was cancelled is released on the spot instead
/// of being stored.
#[derive(Clone)]
pub struct CameraSlot {
    manager: Arc<CameraResourceManager>,
    handle: Arc<Mutex<Option<CameraHandle>>>,
    token: CancellationToken,
}

impl CameraSlot {
    pub fn new(manager: Arc<CameraResourceManager>, token: CancellationToken) -> Self {
        Self {
            manager,
            handle: Arc::new(Mutex::new(None)),
            token,
        }
    }

    /// Acquire a stream bound to `binding`. Resolves with `Abandoned` if the
    /// run is cancelled before the platform answers.
    pub async fn acquire(
        &self,
        facing_mode: FacingMode,
        desired_zoom: f64,
        binding: &str,
    ) -> Result<AcquiredCamera, CameraError> {
        if self.handle.lock().is_some() {
            return Err(CameraError::AlreadyAcquired);
        }

        let (tx, rx) = oneshot::channel();
        let manager = Arc::clone(&self.manager);
        let slot = Arc::clone(&self.handle);
        let token = self.token.clone();
        let binding = binding.to_string();

        tokio::spawn(async move {
            let outcome = match manager.acquire(facing_mode, desired_zoom).await {
                Ok(mut handle) => {
                    let mut held = slot.lock();
                    if token.is_cancelled() {
                        drop(held);
                        info!(
                            "Camera handle {} arrived after session stopped; releasing",
                            handle.id()
                        );
                        manager.release(handle);
                        Err(CameraError::Abandoned)
                    } else if held.is_some() {
                        drop(held);
                        manager.release(handle);
                        Err(CameraError::AlreadyAcquired)
                    } else {
                        handle.bind(&binding);
                        let acquired = AcquiredCamera {
                            stream: handle.stream().clone(),
                            capability: handle.capability(),
                        };
                        *held = Some(handle);
                        Ok(acquired)
                    }
                }
                Err(e) => Err(e),
            };
            if tx.send(outcome).is_err() {
                debug!("Camera acquisition outcome had no listener");
            }
        });

        rx.await.unwrap_or(Err(CameraError::Abandoned))
    }

    /// Release the held handle, if any. Safe to call repeatedly.
    pub fn release(&self) -> bool {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => {
                self.manager.release(handle);
                true
            }
            None => false,
        }
    }

    pub fn is_held(&self) -> bool {
        self.handle.lock().is_some()
    }

    pub fn track(&self) -> Option<Arc<dyn VideoTrack>> {
        self.handle.lock().as_ref().and_then(|handle| handle.track())
    }

    pub fn capability(&self) -> Option<ZoomCapability> {
        self.handle.lock().as_ref().map(|handle| handle.capability())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
