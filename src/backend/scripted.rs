use super::html5qrcode::{
    Html5ErrorCallback, Html5QrcodeEngine, Html5QrcodeProvider, Html5ScanConfig,
    Html5SuccessCallback,
};
use super::native::{BarcodeDetector, BarcodeDetectorApi, DetectedBarcode};
use super::quagga::{CodeResult, QuaggaEngine, QuaggaHandler, QuaggaInit, QuaggaProvider, QuaggaResult};
use super::zxing::{VideoBinding, ZxingCallback, ZxingException, ZxingProvider, ZxingReader};
use crate::camera::{MediaStream, VideoFrame};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Miss,
    Decode(String),
    /// Engine-level error that is not a plain "nothing found"
    Fail(String),
}

struct ScriptState {
    steps: Mutex<VecDeque<ScriptStep>>,
    cadence: Duration,
    native_available: AtomicBool,
    init_failure: Mutex<Option<String>>,
    attempts: AtomicU64,
    instances_created: AtomicU64,
    live_instances: AtomicUsize,
    engine_stops: AtomicU64,
}

/// Queue of outcomes shared by every engine instance built from it.
///
/// Once the queue runs dry every further attempt is a miss. Callback engines
/// emit one outcome per cadence tick until stopped; the polling detector pops
/// one per frame. Instance counters make leaked decoders visible.
#[derive(Clone)]
pub struct DecodeScript {
    state: Arc<ScriptState>,
}

impl DecodeScript {
    /// Empty script: callback engines attempt a decode every `cadence`
    pub fn new(cadence: Duration) -> Self {
        Self {
            state: Arc::new(ScriptState {
                steps: Mutex::new(VecDeque::new()),
                cadence,
                native_available: AtomicBool::new(true),
                init_failure: Mutex::new(None),
                attempts: AtomicU64::new(0),
                instances_created: AtomicU64::new(0),
                live_instances: AtomicUsize::new(0),
                engine_stops: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_misses(self, count: usize) -> Self {
        self.push_misses(count);
        self
    }

    pub fn with_decode(self, value: impl Into<String>) -> Self {
        self.push(ScriptStep::Decode(value.into()));
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(ScriptStep::Fail(message.into()));
        self
    }

    /// Hosts without a `BarcodeDetector` global
    pub fn without_native_detector(self) -> Self {
        self.state.native_available.store(false, Ordering::SeqCst);
        self
    }

    /// Make every engine refuse to initialize
    pub fn failing_init(self, message: impl Into<String>) -> Self {
        *self.state.init_failure.lock() = Some(message.into());
        self
    }

    pub fn push(&self, step: ScriptStep) {
        self.state.steps.lock().push_back(step);
    }

    pub fn push_misses(&self, count: usize) {
        let mut steps = self.state.steps.lock();
        steps.extend(std::iter::repeat(ScriptStep::Miss).take(count));
    }

    pub fn cadence(&self) -> Duration {
        self.state.cadence
    }

    /// Decode attempts performed so far, across all instances
    pub fn attempts(&self) -> u64 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn instances_created(&self) -> u64 {
        self.state.instances_created.load(Ordering::SeqCst)
    }

    /// Decoder instances not yet released
    pub fn live_instances(&self) -> usize {
        self.state.live_instances.load(Ordering::SeqCst)
    }

    /// Engine-level stop/reset calls that found a running decoder
    pub fn engine_stops(&self) -> u64 {
        self.state.engine_stops.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.state.steps.lock().len()
    }

    fn next_step(&self) -> ScriptStep {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        self.state
            .steps
            .lock()
            .pop_front()
            .unwrap_or(ScriptStep::Miss)
    }

    fn init_failure(&self) -> Option<String> {
        self.state.init_failure.lock().clone()
    }

    fn record_stop(&self) {
        self.state.engine_stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts one live decoder instance for as long as it exists
struct InstanceLease {
    script: DecodeScript,
}

impl InstanceLease {
    fn new(script: &DecodeScript) -> Self {
        script.state.instances_created.fetch_add(1, Ordering::SeqCst);
        script.state.live_instances.fetch_add(1, Ordering::SeqCst);
        Self {
            script: script.clone(),
        }
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        self.script
            .state
            .live_instances
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Background decode loop of a callback engine; halts when dropped
struct Emitter {
    token: CancellationToken,
}

impl Emitter {
    fn spawn<F>(script: DecodeScript, deliver: F) -> Self
    where
        F: Fn(ScriptStep) + Send + 'static,
    {
        let token = CancellationToken::new();
        let halted = token.clone();

        tokio::spawn(async move {
            let mut ticker = interval(script.cadence());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = halted.cancelled() => break,
                    _ = ticker.tick() => deliver(script.next_step()),
                }
            }
            trace!("Scripted emitter halted");
        });

        Self { token }
    }
}

impl Drop for Emitter {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Hands out scripted engines for every backend library
#[derive(Clone)]
pub struct ScriptedProvider {
    script: DecodeScript,
}

impl ScriptedProvider {
    pub fn new(script: DecodeScript) -> Self {
        Self { script }
    }

    pub fn script(&self) -> &DecodeScript {
        &self.script
    }
}

struct ScriptedDetector {
    script: DecodeScript,
    _lease: InstanceLease,
}

#[async_trait]
impl BarcodeDetector for ScriptedDetector {
    async fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<DetectedBarcode>, String> {
        match self.script.next_step() {
            ScriptStep::Decode(value) => Ok(vec![DetectedBarcode {
                raw_value: value,
                format: "ean_13".to_string(),
            }]),
            ScriptStep::Miss => Ok(Vec::new()),
            ScriptStep::Fail(message) => Err(message),
        }
    }
}

impl BarcodeDetectorApi for ScriptedProvider {
    fn is_available(&self) -> bool {
        self.script.state.native_available.load(Ordering::SeqCst)
    }

    fn create(&self, _formats: &[&'static str]) -> Result<Box<dyn BarcodeDetector>, String> {
        if let Some(failure) = self.script.init_failure() {
            return Err(failure);
        }
        Ok(Box::new(ScriptedDetector {
            script: self.script.clone(),
            _lease: InstanceLease::new(&self.script),
        }))
    }
}

struct ScriptedZxingReader {
    script: DecodeScript,
    emitter: Option<Emitter>,
    _lease: InstanceLease,
}

impl ZxingReader for ScriptedZxingReader {
    fn decode_from_video(
        &mut self,
        _video: &VideoBinding,
        _formats: &[&'static str],
        callback: ZxingCallback,
    ) -> Result<(), String> {
        if let Some(failure) = self.script.init_failure() {
            return Err(failure);
        }
        self.emitter = Some(Emitter::spawn(self.script.clone(), move |step| {
            match step {
                ScriptStep::Decode(value) => callback(Ok(value)),
                ScriptStep::Miss => callback(Err(ZxingException::not_found())),
                ScriptStep::Fail(message) => callback(Err(ZxingException {
                    name: "ChecksumException".to_string(),
                    message,
                })),
            }
        }));
        Ok(())
    }

    fn reset(&mut self) {
        if self.emitter.take().is_some() {
            self.script.record_stop();
        }
    }
}

impl ZxingProvider for ScriptedProvider {
    fn new_reader(&self) -> Box<dyn ZxingReader> {
        Box::new(ScriptedZxingReader {
            script: self.script.clone(),
            emitter: None,
            _lease: InstanceLease::new(&self.script),
        })
    }
}

struct ScriptedQuagga {
    script: DecodeScript,
    initialized: bool,
    handler: Arc<Mutex<Option<QuaggaHandler>>>,
    emitter: Option<Emitter>,
    _lease: InstanceLease,
}

#[async_trait]
impl QuaggaEngine for ScriptedQuagga {
    async fn init(&mut self, config: QuaggaInit, stream: MediaStream) -> Result<(), String> {
        if let Some(failure) = self.script.init_failure() {
            return Err(failure);
        }
        trace!(
            "Scripted Quagga bound to {} ({} readers, stream {})",
            config.input_stream.target,
            config.readers.len(),
            stream.id()
        );
        self.initialized = true;
        Ok(())
    }

    fn start(&mut self) {
        if !self.initialized {
            return;
        }
        let handler = Arc::clone(&self.handler);
        self.emitter = Some(Emitter::spawn(self.script.clone(), move |step| {
            let result = match step {
                ScriptStep::Decode(code) => QuaggaResult {
                    code_result: Some(CodeResult {
                        code: Some(code),
                        format: Some("ean_13".to_string()),
                    }),
                },
                ScriptStep::Miss | ScriptStep::Fail(_) => QuaggaResult::default(),
            };
            if let Some(handler) = handler.lock().as_ref() {
                handler(result);
            }
        }));
    }

    fn on_detected(&mut self, handler: QuaggaHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn off_detected(&mut self) {
        self.handler.lock().take();
    }

    fn off_processed(&mut self) {}

    fn stop(&mut self) {
        if self.emitter.take().is_some() {
            self.script.record_stop();
        }
        self.initialized = false;
    }
}

impl QuaggaProvider for ScriptedProvider {
    fn instance(&self) -> Box<dyn QuaggaEngine> {
        Box::new(ScriptedQuagga {
            script: self.script.clone(),
            initialized: false,
            handler: Arc::new(Mutex::new(None)),
            emitter: None,
            _lease: InstanceLease::new(&self.script),
        })
    }
}

struct ScriptedHtml5Scanner {
    script: DecodeScript,
    emitter: Option<Emitter>,
    _lease: InstanceLease,
}

#[async_trait]
impl Html5QrcodeEngine for ScriptedHtml5Scanner {
    async fn start(
        &mut self,
        _stream: MediaStream,
        config: Html5ScanConfig,
        on_success: Html5SuccessCallback,
        on_error: Html5ErrorCallback,
    ) -> Result<(), String> {
        if let Some(failure) = self.script.init_failure() {
            return Err(failure);
        }
        trace!("Scripted html5-qrcode scanning at {} fps", config.fps);
        self.emitter = Some(Emitter::spawn(self.script.clone(), move |step| {
            match step {
                ScriptStep::Decode(value) => on_success(value),
                ScriptStep::Miss => on_error(
                    "QR code parse error, error = NotFoundException: No MultiFormat Readers were able to detect the code."
                        .to_string(),
                ),
                ScriptStep::Fail(message) => on_error(message),
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), String> {
        match self.emitter.take() {
            Some(_) => {
                self.script.record_stop();
                Ok(())
            }
            None => Err("Cannot stop, scanner is not running or paused.".to_string()),
        }
    }
}

impl Html5QrcodeProvider for ScriptedProvider {
    fn new_scanner(&self, _element_id: &str) -> Box<dyn Html5QrcodeEngine> {
        Box::new(ScriptedHtml5Scanner {
            script: self.script.clone(),
            emitter: None,
            _lease: InstanceLease::new(&self.script),
        })
    }
}
