use super::{ComponentState, ScannerHarness};
use crate::backend::BackendKind;
use std::collections::HashMap;
use tracing::debug;

impl ScannerHarness {
    /// Update the lifecycle state of a backend's scanner view
    pub async fn set_view_state(&self, backend: BackendKind, state: ComponentState) {
        let mut states = self.view_states.lock().await;
        states.insert(backend, state.clone());
        debug!("{} view state changed to: {:?}", backend, state);
    }

    pub async fn view_state(&self, backend: BackendKind) -> Option<ComponentState> {
        let states = self.view_states.lock().await;
        states.get(&backend).cloned()
    }

    pub async fn view_states(&self) -> HashMap<BackendKind, ComponentState> {
        let states = self.view_states.lock().await;
        states.clone()
    }
}
