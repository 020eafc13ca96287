use super::{BackendKind, PollingAdapter, ScanTarget, Symbology};
use crate::camera::VideoFrame;
use crate::error::{BackendError, ScanbenchError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedBarcode {
    pub raw_value: String,
    pub format: String,
}

/// A `BarcodeDetector` instance bound to a set of formats
#[async_trait]
pub trait BarcodeDetector: Send {
    async fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<DetectedBarcode>, String>;
}

/// Host-provided `BarcodeDetector` global
pub trait BarcodeDetectorApi: Send + Sync {
    fn is_available(&self) -> bool;

    fn create(&self, formats: &[&'static str]) -> Result<Box<dyn BarcodeDetector>, String>;
}

fn format_name(symbology: Symbology) -> &'static str {
    match symbology {
        Symbology::Ean13 => "ean_13",
        Symbology::Ean8 => "ean_8",
    }
}

pub struct NativeAdapter {
    api: Arc<dyn BarcodeDetectorApi>,
    detector: Option<Box<dyn BarcodeDetector>>,
}

impl NativeAdapter {
    pub fn new(api: Arc<dyn BarcodeDetectorApi>) -> Self {
        Self {
            api,
            detector: None,
        }
    }
}

#[async_trait]
impl PollingAdapter for NativeAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn check_support(&self) -> Result<(), BackendError> {
        if self.api.is_available() {
            Ok(())
        } else {
            Err(BackendError::Unsupported {
                backend: BackendKind::Native,
                details: "BarcodeDetector is not available".to_string(),
            })
        }
    }

    async fn start(&mut self, target: &ScanTarget) -> Result<(), ScanbenchError> {
        self.check_support()?;
        if target.stream().is_none() {
            return Err(BackendError::init(BackendKind::Native, "no video stream bound").into());
        }

        let formats = Symbology::SUPPORTED.map(format_name);
        let detector = self
            .api
            .create(&formats)
            .map_err(|e| BackendError::init(BackendKind::Native, e))?;
        self.detector = Some(detector);
        info!("Native detector created for {}", target.element_id);
        Ok(())
    }

    async fn detect(&mut self, frame: &VideoFrame) -> Option<String> {
        let detector = self.detector.as_mut()?;
        match detector.detect(frame).await {
            Ok(barcodes) => barcodes.into_iter().next().map(|barcode| barcode.raw_value),
            Err(e) => {
                trace!("Native detect failed on frame {}: {}", frame.sequence, e);
                None
            }
        }
    }

    async fn stop(&mut self) {
        if self.detector.take().is_some() {
            debug!("Native detector released");
        }
    }
}
