use super::html5qrcode::{Html5QrcodeAdapter, Html5QrcodeProvider};
use super::native::{BarcodeDetectorApi, NativeAdapter};
use super::quagga::{QuaggaAdapter, QuaggaProvider};
use super::scripted::{DecodeScript, ScriptedProvider};
use super::zxing::{ZxingAdapter, ZxingProvider};
use super::{BackendAdapter, BackendKind};
use crate::config::ScanbenchConfig;
use std::sync::Arc;
use tracing::debug;

/// One provider per decoding library
#[derive(Clone)]
pub struct EngineSuite {
    pub native: Arc<dyn BarcodeDetectorApi>,
    pub zxing: Arc<dyn ZxingProvider>,
    pub quagga: Arc<dyn QuaggaProvider>,
    pub quagga2: Arc<dyn QuaggaProvider>,
    pub html5qrcode: Arc<dyn Html5QrcodeProvider>,
}

impl EngineSuite {
    /// Every library backed by the same scripted engine
    pub fn scripted(script: DecodeScript) -> Self {
        let provider = Arc::new(ScriptedProvider::new(script));
        Self {
            native: provider.clone(),
            zxing: provider.clone(),
            quagga: provider.clone(),
            quagga2: provider.clone(),
            html5qrcode: provider,
        }
    }

    /// Build a fresh adapter for `kind`
    pub fn adapter(&self, kind: BackendKind, config: &ScanbenchConfig) -> BackendAdapter {
        debug!("Building {} adapter", kind);
        match kind {
            BackendKind::Native => {
                BackendAdapter::Polling(Box::new(NativeAdapter::new(Arc::clone(&self.native))))
            }
            BackendKind::Zxing => {
                BackendAdapter::Callback(Box::new(ZxingAdapter::new(Arc::clone(&self.zxing))))
            }
            BackendKind::Quagga => BackendAdapter::Callback(Box::new(QuaggaAdapter::new(
                BackendKind::Quagga,
                Arc::clone(&self.quagga),
                config.quagga.clone(),
            ))),
            BackendKind::Quagga2 => BackendAdapter::Callback(Box::new(QuaggaAdapter::new(
                BackendKind::Quagga2,
                Arc::clone(&self.quagga2),
                config.quagga.clone(),
            ))),
            BackendKind::Html5Qrcode => BackendAdapter::Callback(Box::new(
                Html5QrcodeAdapter::new(Arc::clone(&self.html5qrcode), config.html5qrcode.clone()),
            )),
        }
    }
}
