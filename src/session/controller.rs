use super::types::{DetectionEvent, ScanSession, SessionState};
use crate::backend::{
    BackendAdapter, BackendKind, CameraMode, DetectionCallbacks, EngineReport, PollingAdapter,
    ScanTarget, TargetSource,
};
use crate::camera::{AcquiredCamera, CameraResourceManager, CameraSlot, FacingMode};
use crate::config::ScanbenchConfig;
use crate::error::{CameraError, ScanbenchError, SessionError, UserMessage};
use crate::events::{EventBus, ScanEvent};
use crate::history::ResultSink;
use crate::zoom::{AdaptiveZoom, MissOutcome, ZoomCapability};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Liveness token and camera slot of one run. Cancelling the token is the
/// only cancellation signal a run observes.
#[derive(Clone)]
struct RunContext {
    id: u64,
    token: CancellationToken,
    slot: CameraSlot,
}

enum RunEnd {
    Detected(String),
    Failed(String),
    Cancelled,
}

struct SessionInner {
    session: ScanSession,
    run: Option<RunContext>,
    task: Option<JoinHandle<BackendAdapter>>,
    /// Parked here between runs; a running task owns it
    adapter: Option<BackendAdapter>,
    next_run: u64,
}

struct SessionShared {
    backend: BackendKind,
    config: ScanbenchConfig,
    zoom: AdaptiveZoom,
    camera: Arc<CameraResourceManager>,
    sink: Arc<dyn ResultSink>,
    events: EventBus,
    inner: Mutex<SessionInner>,
    snapshots: watch::Sender<ScanSession>,
    target_ready: watch::Sender<bool>,
}

/// Drives one backend through acquire, detect and teardown.
///
/// Each start spawns a run task that owns the adapter until the run ends.
/// The task always finishes by stopping the adapter once and releasing the
/// camera slot, then hands the adapter back for the next run.
pub struct ScanSessionController {
    shared: Arc<SessionShared>,
    ops: tokio::sync::Mutex<()>,
}

impl ScanSessionController {
    pub fn new(
        adapter: BackendAdapter,
        camera: Arc<CameraResourceManager>,
        config: ScanbenchConfig,
        sink: Arc<dyn ResultSink>,
        events: EventBus,
    ) -> Self {
        let backend = adapter.kind();
        let session = ScanSession::new(backend);
        let (snapshots, _) = watch::channel(session.clone());
        let (target_ready, _) = watch::channel(false);

        Self {
            shared: Arc::new(SessionShared {
                backend,
                zoom: AdaptiveZoom::new(config.zoom.for_backend(backend)),
                config,
                camera,
                sink,
                events,
                inner: Mutex::new(SessionInner {
                    session,
                    run: None,
                    task: None,
                    adapter: Some(adapter),
                    next_run: 0,
                }),
                snapshots,
                target_ready,
            }),
            ops: tokio::sync::Mutex::new(()),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.shared.backend
    }

    pub fn snapshot(&self) -> ScanSession {
        self.shared.inner.lock().session.clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().session.state
    }

    /// Watch every published change of the session record
    pub fn subscribe(&self) -> watch::Receiver<ScanSession> {
        self.shared.snapshots.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// The render target exists; runs wait for this before touching the camera
    pub fn mark_target_ready(&self) {
        if !self.shared.target_ready.send_replace(true) {
            debug!("{} render target ready", self.shared.backend);
        }
    }

    /// Whether a camera handle is currently held by the active run
    pub fn holds_camera(&self) -> bool {
        self.shared
            .inner
            .lock()
            .run
            .as_ref()
            .map_or(false, |run| run.slot.is_held())
    }

    /// Resolves once the session reaches Detected or Failed
    pub async fn wait_until_settled(&self) -> ScanSession {
        let mut updates = self.shared.snapshots.subscribe();
        let settled = updates
            .wait_for(|session| session.state.is_terminal())
            .await
            .map(|session| session.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// Begin a run from Idle, or restart from Detected/Failed
    pub async fn start(&self) -> Result<(), SessionError> {
        self.begin("start", SessionState::can_start).await
    }

    /// Restart after a terminal state with zoom and misses reset
    pub async fn scan_again(&self) -> Result<(), SessionError> {
        self.begin("scan again", SessionState::is_terminal).await
    }

    /// Cancel the active run, stop its adapter and release its camera.
    /// Safe to call repeatedly and from any state.
    pub async fn stop(&self) {
        let _op = self.ops.lock().await;
        let task = {
            let mut inner = self.shared.inner.lock();
            if let Some(run) = inner.run.take() {
                run.token.cancel();
                run.slot.release();
            }
            inner.task.take()
        };

        if let Some(task) = task {
            self.shared.reclaim(task).await;
        }

        let mut inner = self.shared.inner.lock();
        if inner.session.state.is_running() {
            self.shared.transition(&mut inner, SessionState::Idle);
        }
    }

    async fn begin(
        &self,
        operation: &'static str,
        allowed: fn(&SessionState) -> bool,
    ) -> Result<(), SessionError> {
        let _op = self.ops.lock().await;
        let shared = &self.shared;

        let previous = {
            let mut inner = shared.inner.lock();
            let state = inner.session.state;
            if !allowed(&state) {
                return Err(SessionError::InvalidTransition { operation, state });
            }
            if let Some(run) = inner.run.take() {
                run.token.cancel();
                run.slot.release();
            }
            inner.task.take()
        };

        // The previous run must be fully torn down before a new camera is requested
        if let Some(task) = previous {
            shared.reclaim(task).await;
        }

        let mut inner = shared.inner.lock();
        let adapter = inner
            .adapter
            .take()
            .ok_or(SessionError::AdapterUnavailable {
                backend: shared.backend,
            })?;

        shared.zoom.reset(&mut inner.session);
        inner.session.supports_zoom = false;
        inner.session.max_zoom = 1.0;
        inner.session.result = None;
        inner.session.error_message = None;
        inner.session.engine_error = None;

        inner.next_run += 1;
        let token = CancellationToken::new();
        let run = RunContext {
            id: inner.next_run,
            slot: CameraSlot::new(Arc::clone(&shared.camera), token.clone()),
            token,
        };
        info!("{} run {} starting ({})", shared.backend, run.id, operation);

        shared.transition(&mut inner, SessionState::Acquiring);
        inner.run = Some(run.clone());
        inner.task = Some(tokio::spawn(run_session(Arc::clone(shared), adapter, run)));
        Ok(())
    }
}

impl Drop for ScanSessionController {
    fn drop(&mut self) {
        let inner = self.shared.inner.lock();
        if let Some(run) = &inner.run {
            if !run.token.is_cancelled() {
                debug!(
                    "{} controller dropped with run {} active; cancelling",
                    self.shared.backend, run.id
                );
            }
            run.token.cancel();
            run.slot.release();
        }
    }
}

async fn run_session(
    shared: Arc<SessionShared>,
    mut adapter: BackendAdapter,
    run: RunContext,
) -> BackendAdapter {
    match shared.drive(&mut adapter, &run).await {
        RunEnd::Detected(value) => shared.finish_detected(&run, value),
        RunEnd::Failed(message) => shared.finish_failed(&run, message),
        RunEnd::Cancelled => debug!("{} run {} cancelled", shared.backend, run.id),
    }

    adapter.stop().await;
    run.slot.release();
    debug!("{} run {} torn down", shared.backend, run.id);
    adapter
}

impl SessionShared {
    fn transition(&self, inner: &mut SessionInner, to: SessionState) {
        let from = inner.session.state;
        if from == to {
            return;
        }
        inner.session.state = to;
        info!("{} session {:?} -> {:?}", self.backend, from, to);
        self.refresh(inner);
        self.events.publish(ScanEvent::StateChanged {
            backend: self.backend,
            from,
            to,
            timestamp: SystemTime::now(),
        });
    }

    fn refresh(&self, inner: &SessionInner) {
        self.snapshots.send_replace(inner.session.clone());
    }

    async fn reclaim(&self, task: JoinHandle<BackendAdapter>) {
        match task.await {
            Ok(adapter) => self.inner.lock().adapter = Some(adapter),
            Err(e) => error!("{} session run aborted: {}", self.backend, e),
        }
    }

    async fn drive(&self, adapter: &mut BackendAdapter, run: &RunContext) -> RunEnd {
        if let Err(e) = adapter.check_support() {
            return RunEnd::Failed(e.user_message());
        }
        if !self.wait_target_ready(run).await {
            return RunEnd::Cancelled;
        }

        let element_id = self.backend.element_id();
        let facing_mode = self.config.camera.facing_mode;
        let desired_zoom = self.inner.lock().session.zoom_level;

        match adapter {
            BackendAdapter::Polling(detector) => {
                let camera = match self.acquire(run, element_id, facing_mode, desired_zoom).await {
                    Ok(camera) => camera,
                    Err(end) => return end,
                };
                if !self.enter_streaming(run, &camera.capability) {
                    return RunEnd::Cancelled;
                }

                let target = ScanTarget {
                    element_id: element_id.to_string(),
                    source: TargetSource::Stream(camera.stream),
                };
                let started = tokio::select! {
                    _ = run.token.cancelled() => return RunEnd::Cancelled,
                    started = detector.start(&target) => started,
                };
                if let Err(e) = started {
                    return self.start_failure(run, e);
                }
                if !self.enter_detecting(run) {
                    return RunEnd::Cancelled;
                }
                self.poll(detector.as_mut(), run).await
            }
            BackendAdapter::Callback(engine) => {
                let mode = engine.camera_mode();
                let source = match mode {
                    CameraMode::SessionStream => {
                        match self.acquire(run, element_id, facing_mode, desired_zoom).await {
                            Ok(camera) => {
                                if !self.enter_streaming(run, &camera.capability) {
                                    return RunEnd::Cancelled;
                                }
                                TargetSource::Stream(camera.stream)
                            }
                            Err(end) => return end,
                        }
                    }
                    CameraMode::EngineManaged => TargetSource::Camera {
                        slot: run.slot.clone(),
                        facing_mode,
                        desired_zoom,
                    },
                };

                let (callbacks, mut reports) = DetectionCallbacks::new(run.token.clone());
                let target = ScanTarget {
                    element_id: element_id.to_string(),
                    source,
                };
                let started = tokio::select! {
                    _ = run.token.cancelled() => return RunEnd::Cancelled,
                    started = engine.start(target, callbacks) => started,
                };
                if let Err(e) = started {
                    return self.start_failure(run, e);
                }

                if mode == CameraMode::EngineManaged {
                    let capability = run
                        .slot
                        .capability()
                        .unwrap_or_else(ZoomCapability::unsupported);
                    if !self.enter_streaming(run, &capability) {
                        return RunEnd::Cancelled;
                    }
                }
                if !self.enter_detecting(run) {
                    return RunEnd::Cancelled;
                }
                self.pump(&mut reports, run).await
            }
        }
    }

    async fn wait_target_ready(&self, run: &RunContext) -> bool {
        let mut ready = self.target_ready.subscribe();
        let became_ready = async move { ready.wait_for(|ready| *ready).await.is_ok() };
        tokio::select! {
            _ = run.token.cancelled() => false,
            ready = became_ready => ready,
        }
    }

    async fn acquire(
        &self,
        run: &RunContext,
        element_id: &str,
        facing_mode: FacingMode,
        desired_zoom: f64,
    ) -> Result<AcquiredCamera, RunEnd> {
        // No timeout: a pending permission prompt keeps the run in Acquiring
        let acquired = tokio::select! {
            _ = run.token.cancelled() => return Err(RunEnd::Cancelled),
            acquired = run.slot.acquire(facing_mode, desired_zoom, element_id) => acquired,
        };
        match acquired {
            Ok(camera) => Ok(camera),
            Err(CameraError::Abandoned) => Err(RunEnd::Cancelled),
            Err(e) => Err(RunEnd::Failed(e.user_message())),
        }
    }

    fn start_failure(&self, run: &RunContext, error: ScanbenchError) -> RunEnd {
        if run.token.is_cancelled() {
            return RunEnd::Cancelled;
        }
        match error {
            ScanbenchError::Camera(CameraError::Abandoned) => RunEnd::Cancelled,
            ScanbenchError::Camera(e) => RunEnd::Failed(e.user_message()),
            ScanbenchError::Backend(e) => RunEnd::Failed(e.user_message()),
            other => RunEnd::Failed(other.to_string()),
        }
    }

    fn enter_streaming(&self, run: &RunContext, capability: &ZoomCapability) -> bool {
        let mut inner = self.inner.lock();
        if run.token.is_cancelled() {
            return false;
        }
        self.zoom.configure(&mut inner.session, capability);
        self.transition(&mut inner, SessionState::Streaming);
        true
    }

    fn enter_detecting(&self, run: &RunContext) -> bool {
        let mut inner = self.inner.lock();
        if run.token.is_cancelled() {
            return false;
        }
        self.transition(&mut inner, SessionState::Detecting);
        true
    }

    /// One detection attempt per display refresh
    async fn poll(&self, detector: &mut dyn PollingAdapter, run: &RunContext) -> RunEnd {
        let mut frames = interval(self.config.session.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = run.token.cancelled() => return RunEnd::Cancelled,
                _ = frames.tick() => {}
            }

            let track = match run.slot.track() {
                Some(track) => track,
                None => return RunEnd::Cancelled,
            };
            // No frame yet while the video element warms up
            let frame = match track.capture_frame() {
                Some(frame) => frame,
                None => continue,
            };

            let decoded = tokio::select! {
                _ = run.token.cancelled() => return RunEnd::Cancelled,
                decoded = detector.detect(&frame) => decoded,
            };
            match decoded {
                Some(value) => return RunEnd::Detected(value),
                None => self.record_miss(run).await,
            }
        }
    }

    /// Engine reports, in the order the engine produced them
    async fn pump(
        &self,
        reports: &mut mpsc::UnboundedReceiver<EngineReport>,
        run: &RunContext,
    ) -> RunEnd {
        loop {
            let report = tokio::select! {
                _ = run.token.cancelled() => return RunEnd::Cancelled,
                report = reports.recv() => report,
            };
            match report {
                Some(EngineReport::Decoded(value)) => return RunEnd::Detected(value),
                Some(EngineReport::Miss) => self.record_miss(run).await,
                Some(EngineReport::Error(message)) => {
                    debug!("{} engine error counted as miss: {}", self.backend, message);
                    self.note_engine_error(run, message);
                    self.record_miss(run).await;
                }
                None => {
                    warn!("{} engine released its callbacks while running", self.backend);
                    run.token.cancelled().await;
                    return RunEnd::Cancelled;
                }
            }
        }
    }

    fn note_engine_error(&self, run: &RunContext, message: String) {
        let mut inner = self.inner.lock();
        if run.token.is_cancelled() {
            return;
        }
        inner.session.engine_error = Some(message);
        self.refresh(&inner);
    }

    async fn record_miss(&self, run: &RunContext) {
        let target = {
            let mut inner = self.inner.lock();
            if run.token.is_cancelled() {
                return;
            }
            match self.zoom.record_miss(&mut inner.session, Instant::now()) {
                MissOutcome::Escalate { target, .. } => target,
                MissOutcome::Counted { .. } => {
                    self.refresh(&inner);
                    return;
                }
                MissOutcome::Throttled => return,
            }
        };

        let track = match run.slot.track() {
            Some(track) => track,
            None => return,
        };
        let applied = tokio::select! {
            _ = run.token.cancelled() => return,
            applied = track.apply_zoom(target) => applied,
        };

        match applied {
            Ok(()) => {
                let mut inner = self.inner.lock();
                if run.token.is_cancelled() {
                    return;
                }
                if self.zoom.commit(&mut inner.session, target) {
                    let (level, max) = (inner.session.zoom_level, inner.session.max_zoom);
                    info!("{} zoom raised to {:.1}x (max {:.1}x)", self.backend, level, max);
                    self.refresh(&inner);
                    self.events.publish(ScanEvent::ZoomChanged {
                        backend: self.backend,
                        level,
                        max,
                        timestamp: SystemTime::now(),
                    });
                }
            }
            Err(e) => warn!("{} zoom not applied, will retry: {}", self.backend, e),
        }
    }

    fn finish_detected(&self, run: &RunContext, value: String) {
        let event = {
            let mut inner = self.inner.lock();
            if run.token.is_cancelled() {
                debug!("{} ignoring decode from stopped run {}", self.backend, run.id);
                return;
            }
            // Later hits from this run are dropped from here on
            run.token.cancel();

            let event = DetectionEvent {
                value,
                backend: self.backend,
                timestamp: Utc::now(),
            };
            inner.session.result = Some(event.value.clone());
            event
        };

        // Unlocked: the sink may read this controller. The entry still lands
        // before Detected is published.
        self.sink.record(&event.value, event.backend, event.timestamp);
        {
            let mut inner = self.inner.lock();
            self.transition(&mut inner, SessionState::Detected);
        }
        self.events.publish(ScanEvent::Detected(event));
    }

    fn finish_failed(&self, run: &RunContext, message: String) {
        {
            let mut inner = self.inner.lock();
            if run.token.is_cancelled() {
                return;
            }
            run.token.cancel();
            inner.session.error_message = Some(message.clone());
            self.transition(&mut inner, SessionState::Failed);
        }
        self.events.publish(ScanEvent::Failed {
            backend: self.backend,
            message,
            timestamp: SystemTime::now(),
        });
    }
}
