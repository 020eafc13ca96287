use super::types::ComponentState;
use crate::backend::{BackendKind, EngineSuite};
use crate::camera::{CameraPlatform, CameraResourceManager};
use crate::config::ScanbenchConfig;
use crate::error::Result;
use crate::events::{EventBus, EventFilter, EventReceiver};
use crate::history::{ResultSink, ScanHistory};
use crate::session::{ScanSession, ScanSessionController};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Tabbed scanner harness: one scanner view is mounted at a time and every
/// decode lands in a shared history.
pub struct ScannerHarness {
    pub(super) config: ScanbenchConfig,
    pub(super) engines: EngineSuite,
    pub(super) camera: Arc<CameraResourceManager>,
    pub(super) history: Arc<ScanHistory>,
    pub(super) event_bus: EventBus,

    // Active view
    pub(super) active: Mutex<Option<ScanSessionController>>,

    // Lifecycle management
    pub(super) view_states: Arc<Mutex<HashMap<BackendKind, ComponentState>>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ScannerHarness {
    /// Fails when `config` does not pass `ScanbenchConfig::validate`
    pub fn new(
        config: ScanbenchConfig,
        engines: EngineSuite,
        platform: Arc<dyn CameraPlatform>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engines,
            camera: Arc::new(CameraResourceManager::new(platform)),
            history: Arc::new(ScanHistory::new()),
            event_bus: EventBus::default(),
            active: Mutex::new(None),
            view_states: Arc::new(Mutex::new(HashMap::new())),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn history(&self) -> &Arc<ScanHistory> {
        &self.history
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn camera_manager(&self) -> &Arc<CameraResourceManager> {
        &self.camera
    }

    /// Notifications from every view the harness mounts, narrowed by `filter`
    pub fn subscribe_events(&self, filter: EventFilter, name: impl Into<String>) -> EventReceiver {
        EventReceiver::new(self.event_bus.subscribe(), filter, name.into())
    }

    /// Switch the mounted scanner view. Selecting the active backend is a
    /// no-op; otherwise the current session is fully stopped before the
    /// next one is created.
    pub async fn select(&self, backend: BackendKind) -> Result<()> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.backend() == backend {
                return Ok(());
            }
        }

        if let Some(previous) = active.take() {
            let kind = previous.backend();
            self.set_view_state(kind, ComponentState::Stopping).await;
            previous.stop().await;
            drop(previous);
            self.set_view_state(kind, ComponentState::Stopped).await;
            info!("{} view unmounted", kind);
        }

        self.set_view_state(backend, ComponentState::Starting).await;
        let controller = ScanSessionController::new(
            self.engines.adapter(backend, &self.config),
            Arc::clone(&self.camera),
            self.config.clone(),
            Arc::clone(&self.history) as Arc<dyn ResultSink>,
            self.event_bus.clone(),
        );
        controller.mark_target_ready();

        if let Err(e) = controller.start().await {
            self.set_view_state(backend, ComponentState::Failed).await;
            return Err(e.into());
        }

        *active = Some(controller);
        self.set_view_state(backend, ComponentState::Running).await;
        info!("{} view mounted", backend);
        Ok(())
    }

    /// Restart the active session after a result or failure
    pub async fn scan_again(&self) -> Result<()> {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(controller) => Ok(controller.scan_again().await?),
            None => Err(crate::error::ScanbenchError::system(
                "No scanner view is mounted",
            )),
        }
    }

    pub async fn active_backend(&self) -> Option<BackendKind> {
        self.active.lock().await.as_ref().map(|c| c.backend())
    }

    pub async fn active_snapshot(&self) -> Option<ScanSession> {
        self.active.lock().await.as_ref().map(|c| c.snapshot())
    }

    /// Wait for the mounted session to reach Detected or Failed. Resolves
    /// with `None` if no view is mounted or the view is replaced first.
    pub async fn wait_until_settled(&self) -> Option<ScanSession> {
        let mut updates = {
            let active = self.active.lock().await;
            active.as_ref()?.subscribe()
        };
        let settled = updates
            .wait_for(|session| session.state.is_terminal())
            .await
            .map(|session| session.clone());
        settled.ok()
    }

    /// "Clear All" on the history list
    pub fn clear_history(&self) {
        self.history.clear();
    }
}
