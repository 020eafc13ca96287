use super::{BackendKind, CallbackAdapter, CameraMode, DetectionCallbacks, ScanTarget, Symbology};
use crate::camera::MediaStream;
use crate::error::{BackendError, ScanbenchError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exception raised by a ZXing decode pass
#[derive(Debug, Clone, PartialEq)]
pub struct ZxingException {
    pub name: String,
    pub message: String,
}

impl ZxingException {
    pub const NOT_FOUND: &'static str = "NotFoundException";

    pub fn not_found() -> Self {
        Self {
            name: Self::NOT_FOUND.to_string(),
            message: "No MultiFormat Readers were able to detect the code.".to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.name == Self::NOT_FOUND
    }
}

/// Video element the reader decodes from
#[derive(Debug, Clone)]
pub struct VideoBinding {
    pub element_id: String,
    pub stream: MediaStream,
}

pub type ZxingCallback = Box<dyn Fn(Result<String, ZxingException>) + Send + Sync>;

/// `BrowserMultiFormatReader` shape: continuous decode with a per-attempt callback
pub trait ZxingReader: Send {
    fn decode_from_video(
        &mut self,
        video: &VideoBinding,
        formats: &[&'static str],
        callback: ZxingCallback,
    ) -> Result<(), String>;

    /// Stop decoding and release reader internals
    fn reset(&mut self);
}

pub trait ZxingProvider: Send + Sync {
    fn new_reader(&self) -> Box<dyn ZxingReader>;
}

fn format_name(symbology: Symbology) -> &'static str {
    match symbology {
        Symbology::Ean13 => "EAN_13",
        Symbology::Ean8 => "EAN_8",
    }
}

pub struct ZxingAdapter {
    provider: Arc<dyn ZxingProvider>,
    reader: Option<Box<dyn ZxingReader>>,
}

impl ZxingAdapter {
    pub fn new(provider: Arc<dyn ZxingProvider>) -> Self {
        Self {
            provider,
            reader: None,
        }
    }
}

#[async_trait]
impl CallbackAdapter for ZxingAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Zxing
    }

    fn camera_mode(&self) -> CameraMode {
        CameraMode::SessionStream
    }

    async fn start(
        &mut self,
        target: ScanTarget,
        callbacks: DetectionCallbacks,
    ) -> Result<(), ScanbenchError> {
        let stream = target
            .stream()
            .cloned()
            .ok_or_else(|| BackendError::init(BackendKind::Zxing, "no video stream bound"))?;
        let binding = VideoBinding {
            element_id: target.element_id.clone(),
            stream,
        };

        // Stored first so stop() reaches the reader even if decoding fails to start
        let reader = self.reader.insert(self.provider.new_reader());
        let formats = Symbology::SUPPORTED.map(format_name);
        let callback: ZxingCallback = Box::new(move |outcome| match outcome {
            Ok(text) => callbacks.on_detect(text),
            Err(e) if e.is_not_found() => callbacks.on_miss(),
            Err(e) => {
                warn!("ZXing decode error: {}: {}", e.name, e.message);
                callbacks.on_error(e.message);
            }
        });

        reader
            .decode_from_video(&binding, &formats, callback)
            .map_err(|e| BackendError::init(BackendKind::Zxing, e))?;
        info!("ZXing reader decoding from {}", binding.element_id);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.reset();
            debug!("ZXing reader reset");
        }
    }
}
