use super::{
    BackendKind, CallbackAdapter, CameraMode, DetectionCallbacks, ScanTarget, Symbology,
    TargetSource,
};
use crate::camera::{FacingMode, MediaStream};
use crate::config::QuaggaConfig;
use crate::error::{BackendError, ScanbenchError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Inset of the scan area from each edge of the container, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanArea {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl ScanArea {
    pub fn inset(percent: u32) -> Self {
        Self {
            top: percent,
            right: percent,
            bottom: percent,
            left: percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuaggaInputStream {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub target: String,
    pub facing_mode: FacingMode,
    pub area: ScanArea,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuaggaLocator {
    pub patch_size: String,
    pub half_sample: bool,
}

/// Argument to `Quagga.init`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuaggaInit {
    pub input_stream: QuaggaInputStream,
    pub locator: QuaggaLocator,
    pub readers: Vec<&'static str>,
    pub locate: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeResult {
    pub code: Option<String>,
    pub format: Option<String>,
}

/// Payload of an `onDetected` notification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuaggaResult {
    pub code_result: Option<CodeResult>,
}

impl QuaggaResult {
    pub fn code(&self) -> Option<&str> {
        self.code_result
            .as_ref()
            .and_then(|result| result.code.as_deref())
            .filter(|code| !code.is_empty())
    }
}

pub type QuaggaHandler = Box<dyn Fn(QuaggaResult) + Send + Sync>;

/// The global `Quagga` object; Quagga and Quagga2 share this shape
#[async_trait]
pub trait QuaggaEngine: Send {
    async fn init(&mut self, config: QuaggaInit, stream: MediaStream) -> Result<(), String>;
    fn start(&mut self);
    fn on_detected(&mut self, handler: QuaggaHandler);
    fn off_detected(&mut self);
    fn off_processed(&mut self);
    fn stop(&mut self);
}

pub trait QuaggaProvider: Send + Sync {
    fn instance(&self) -> Box<dyn QuaggaEngine>;
}

fn reader_name(symbology: Symbology) -> &'static str {
    match symbology {
        Symbology::Ean13 => "ean_reader",
        Symbology::Ean8 => "ean_8_reader",
    }
}

/// Drives either Quagga flavour; `kind` selects which one is reported
pub struct QuaggaAdapter {
    kind: BackendKind,
    provider: Arc<dyn QuaggaProvider>,
    config: QuaggaConfig,
    engine: Option<Box<dyn QuaggaEngine>>,
}

impl QuaggaAdapter {
    pub fn new(kind: BackendKind, provider: Arc<dyn QuaggaProvider>, config: QuaggaConfig) -> Self {
        Self {
            kind,
            provider,
            config,
            engine: None,
        }
    }

    pub fn init_config(&self, target: &str, facing_mode: FacingMode) -> QuaggaInit {
        QuaggaInit {
            input_stream: QuaggaInputStream {
                name: "Live",
                kind: "LiveStream",
                target: target.to_string(),
                facing_mode,
                area: ScanArea::inset(self.config.area_inset_percent),
            },
            locator: QuaggaLocator {
                patch_size: self.config.patch_size.clone(),
                half_sample: self.config.half_sample,
            },
            readers: Symbology::SUPPORTED.map(reader_name).to_vec(),
            locate: true,
        }
    }
}

#[async_trait]
impl CallbackAdapter for QuaggaAdapter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn camera_mode(&self) -> CameraMode {
        CameraMode::EngineManaged
    }

    async fn start(
        &mut self,
        target: ScanTarget,
        callbacks: DetectionCallbacks,
    ) -> Result<(), ScanbenchError> {
        let (slot, facing_mode, desired_zoom) = match &target.source {
            TargetSource::Camera {
                slot,
                facing_mode,
                desired_zoom,
            } => (slot.clone(), *facing_mode, *desired_zoom),
            TargetSource::Stream(_) => {
                return Err(BackendError::init(self.kind, "expects to open its own camera").into())
            }
        };

        let camera = slot
            .acquire(facing_mode, desired_zoom, &target.element_id)
            .await?;
        let init = self.init_config(&target.element_id, facing_mode);

        let kind = self.kind;
        let engine = self.engine.insert(self.provider.instance());
        engine
            .init(init, camera.stream)
            .await
            .map_err(|e| BackendError::init(kind, e))?;

        engine.on_detected(Box::new(move |result| match result.code() {
            Some(code) => callbacks.on_detect(code),
            None => callbacks.on_miss(),
        }));
        engine.start();
        info!("{} started in {}", kind, target.element_id);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.off_detected();
            engine.off_processed();
            engine.stop();
            debug!("{} stopped", self.kind);
        }
    }
}
