use super::{ComponentState, ScannerHarness};
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl ScannerHarness {
    /// Unmount the active view and release the camera
    pub async fn shutdown(&self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Interrupt pending waits and signal handlers
        self.cancellation_token.cancel();

        let mut exit_code = 0;
        let mut active = self.active.lock().await;
        if let Some(controller) = active.take() {
            let backend = controller.backend();
            self.set_view_state(backend, ComponentState::Stopping).await;

            match timeout(STOP_TIMEOUT, controller.stop()).await {
                Ok(()) => {
                    self.set_view_state(backend, ComponentState::Stopped).await;
                    info!("{} view stopped", backend);
                }
                Err(_) => {
                    self.set_view_state(backend, ComponentState::Failed).await;
                    error!("{} view stop timeout", backend);
                    exit_code = 1;
                }
            }
        }

        let live = self.camera.live_handles();
        if live > 0 {
            error!("{} camera handle(s) still live after shutdown", live);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
