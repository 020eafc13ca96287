mod html5qrcode;
mod native;
mod quagga;
mod registry;
mod scripted;
mod zxing;

#[cfg(test)]
mod tests;

pub use html5qrcode::{
    Html5ErrorCallback, Html5QrcodeAdapter, Html5QrcodeEngine, Html5QrcodeProvider,
    Html5ScanConfig, Html5SuccessCallback,
};
pub use native::{BarcodeDetector, BarcodeDetectorApi, DetectedBarcode, NativeAdapter};
pub use quagga::{
    CodeResult, QuaggaAdapter, QuaggaEngine, QuaggaHandler, QuaggaInit, QuaggaInputStream,
    QuaggaLocator, QuaggaProvider, QuaggaResult, ScanArea,
};
pub use registry::EngineSuite;
pub use scripted::{DecodeScript, ScriptStep, ScriptedProvider};
pub use zxing::{VideoBinding, ZxingAdapter, ZxingCallback, ZxingException, ZxingProvider, ZxingReader};

use crate::camera::{CameraSlot, FacingMode, MediaStream, VideoFrame};
use crate::error::{BackendError, ScanbenchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// The five decoding engines under comparison
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Native,
    Zxing,
    Quagga,
    Quagga2,
    Html5Qrcode,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Native,
        BackendKind::Zxing,
        BackendKind::Quagga,
        BackendKind::Quagga2,
        BackendKind::Html5Qrcode,
    ];

    /// Stable lowercase key used in configuration
    pub fn key(&self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Zxing => "zxing",
            BackendKind::Quagga => "quagga",
            BackendKind::Quagga2 => "quagga2",
            BackendKind::Html5Qrcode => "html5qrcode",
        }
    }

    /// Name recorded in the scan history
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Native => "Native",
            BackendKind::Zxing => "ZXing",
            BackendKind::Quagga => "Quagga",
            BackendKind::Quagga2 => "Quagga2",
            BackendKind::Html5Qrcode => "HTML5-QRCode",
        }
    }

    /// Id of the element the backend renders into
    pub fn element_id(&self) -> &'static str {
        match self {
            BackendKind::Native => "native-video",
            BackendKind::Zxing => "zxing-video",
            BackendKind::Quagga => "quagga-container",
            BackendKind::Quagga2 => "quagga2-container",
            BackendKind::Html5Qrcode => "html5-qrcode-reader",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Symbologies every backend is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    Ean13,
    Ean8,
}

impl Symbology {
    pub const SUPPORTED: [Symbology; 2] = [Symbology::Ean13, Symbology::Ean8];
}

/// Who opens the camera for a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// The session acquires the stream and hands it to the adapter
    SessionStream,
    /// The adapter acquires with its own constraints through the session's slot
    EngineManaged,
}

/// Where the camera image comes from for an adapter
pub enum TargetSource {
    Stream(MediaStream),
    Camera {
        slot: CameraSlot,
        facing_mode: FacingMode,
        desired_zoom: f64,
    },
}

/// Render target handed to an adapter on start
pub struct ScanTarget {
    pub element_id: String,
    pub source: TargetSource,
}

impl ScanTarget {
    pub fn stream(&self) -> Option<&MediaStream> {
        match &self.source {
            TargetSource::Stream(stream) => Some(stream),
            TargetSource::Camera { .. } => None,
        }
    }
}

/// One completed decode attempt as reported by an engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReport {
    Decoded(String),
    Miss,
    Error(String),
}

/// Result/error callback pair given to callback-driven adapters
#[derive(Clone)]
pub struct DetectionCallbacks {
    tx: mpsc::UnboundedSender<EngineReport>,
    live: CancellationToken,
}

impl DetectionCallbacks {
    pub fn new(live: CancellationToken) -> (Self, mpsc::UnboundedReceiver<EngineReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, live }, rx)
    }

    pub fn on_detect(&self, value: impl Into<String>) {
        self.report(EngineReport::Decoded(value.into()));
    }

    pub fn on_miss(&self) {
        self.report(EngineReport::Miss);
    }

    pub fn on_error(&self, message: impl Into<String>) {
        self.report(EngineReport::Error(message.into()));
    }

    pub fn is_live(&self) -> bool {
        !self.live.is_cancelled()
    }

    fn report(&self, report: EngineReport) {
        if self.live.is_cancelled() {
            trace!("Dropping stale engine report: {:?}", report);
            return;
        }
        // A closed receiver means the run already ended
        let _ = self.tx.send(report);
    }
}

/// Frame-driven detector; the session calls `detect` once per display refresh
#[async_trait]
pub trait PollingAdapter: Send {
    fn kind(&self) -> BackendKind;

    /// Fails when the underlying capability is absent on this host
    fn check_support(&self) -> Result<(), BackendError>;

    async fn start(&mut self, target: &ScanTarget) -> Result<(), ScanbenchError>;

    /// Zero or one decoded value for this frame
    async fn detect(&mut self, frame: &VideoFrame) -> Option<String>;

    /// Release decoder resources. Safe from any state.
    async fn stop(&mut self);
}

/// Engine that decodes at its own cadence and reports through callbacks
#[async_trait]
pub trait CallbackAdapter: Send {
    fn kind(&self) -> BackendKind;

    fn camera_mode(&self) -> CameraMode;

    fn check_support(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn start(
        &mut self,
        target: ScanTarget,
        callbacks: DetectionCallbacks,
    ) -> Result<(), ScanbenchError>;

    /// Release engine instances, workers and canvases. Safe from any state,
    /// including before `start` completed.
    async fn stop(&mut self);
}

/// Uniform start/stop/detect contract over the decoding engines.
///
/// A [`PollingAdapter`] is handed frames by the session and answers each
/// with zero or one decoded value. A [`CallbackAdapter`] drives its engine
/// at the engine's own cadence and reports through [`DetectionCallbacks`],
/// which are gated by a liveness token captured at start.
pub enum BackendAdapter {
    Polling(Box<dyn PollingAdapter>),
    Callback(Box<dyn CallbackAdapter>),
}

impl BackendAdapter {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendAdapter::Polling(adapter) => adapter.kind(),
            BackendAdapter::Callback(adapter) => adapter.kind(),
        }
    }

    pub fn camera_mode(&self) -> CameraMode {
        match self {
            BackendAdapter::Polling(_) => CameraMode::SessionStream,
            BackendAdapter::Callback(adapter) => adapter.camera_mode(),
        }
    }

    pub fn check_support(&self) -> Result<(), BackendError> {
        match self {
            BackendAdapter::Polling(adapter) => adapter.check_support(),
            BackendAdapter::Callback(adapter) => adapter.check_support(),
        }
    }

    pub async fn stop(&mut self) {
        match self {
            BackendAdapter::Polling(adapter) => adapter.stop().await,
            BackendAdapter::Callback(adapter) => adapter.stop().await,
        }
    }
}
