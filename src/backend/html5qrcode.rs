use super::{
    BackendKind, CallbackAdapter, CameraMode, DetectionCallbacks, ScanTarget, Symbology,
    TargetSource,
};
use crate::camera::MediaStream;
use crate::config::Html5QrcodeConfig;
use crate::error::{BackendError, ScanbenchError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NOT_FOUND: &str = "NotFoundException";

#[derive(Debug, Clone, PartialEq)]
pub struct Html5ScanConfig {
    pub fps: u32,
    pub qrbox: (u32, u32),
    pub formats: Vec<&'static str>,
}

pub type Html5SuccessCallback = Box<dyn Fn(String) + Send + Sync>;
pub type Html5ErrorCallback = Box<dyn Fn(String) + Send + Sync>;

/// An `Html5Qrcode` scanner bound to one element
#[async_trait]
pub trait Html5QrcodeEngine: Send {
    async fn start(
        &mut self,
        stream: MediaStream,
        config: Html5ScanConfig,
        on_success: Html5SuccessCallback,
        on_error: Html5ErrorCallback,
    ) -> Result<(), String>;

    async fn stop(&mut self) -> Result<(), String>;
}

pub trait Html5QrcodeProvider: Send + Sync {
    fn new_scanner(&self, element_id: &str) -> Box<dyn Html5QrcodeEngine>;
}

fn format_name(symbology: Symbology) -> &'static str {
    match symbology {
        Symbology::Ean13 => "EAN_13",
        Symbology::Ean8 => "EAN_8",
    }
}

pub struct Html5QrcodeAdapter {
    provider: Arc<dyn Html5QrcodeProvider>,
    config: Html5QrcodeConfig,
    scanner: Option<Box<dyn Html5QrcodeEngine>>,
}

impl Html5QrcodeAdapter {
    pub fn new(provider: Arc<dyn Html5QrcodeProvider>, config: Html5QrcodeConfig) -> Self {
        Self {
            provider,
            config,
            scanner: None,
        }
    }

    fn scan_config(&self) -> Html5ScanConfig {
        Html5ScanConfig {
            fps: self.config.fps,
            qrbox: (self.config.qrbox_width, self.config.qrbox_height),
            formats: Symbology::SUPPORTED.map(format_name).to_vec(),
        }
    }
}

#[async_trait]
impl CallbackAdapter for Html5QrcodeAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Html5Qrcode
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
                return Err(BackendError::init(
                    BackendKind::Html5Qrcode,
                    "expects to open its own camera",
                )
                .into())
            }
        };

        let camera = slot
            .acquire(facing_mode, desired_zoom, &target.element_id)
            .await?;
        let config = self.scan_config();
        let scanner = self
            .scanner
            .insert(self.provider.new_scanner(&target.element_id));

        let on_hit = callbacks.clone();
        let on_success: Html5SuccessCallback = Box::new(move |text| on_hit.on_detect(text));
        let on_error: Html5ErrorCallback = Box::new(move |message| {
            if message.contains(NOT_FOUND) {
                callbacks.on_miss();
            } else {
                warn!("html5-qrcode scan error: {}", message);
                callbacks.on_error(message);
            }
        });

        scanner
            .start(camera.stream, config, on_success, on_error)
            .await
            .map_err(|e| BackendError::init(BackendKind::Html5Qrcode, e))?;
        info!("html5-qrcode scanner started in {}", target.element_id);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut scanner) = self.scanner.take() {
            // A scanner that never reached the scanning state refuses to stop
            if let Err(e) = scanner.stop().await {
                debug!("html5-qrcode stop reported: {}", e);
            }
        }
    }
}
