pub mod app;
pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod session;
pub mod zoom;

pub use app::{ComponentState, RunOutcome, ScannerHarness, ShutdownReason};
pub use backend::{
    BackendAdapter, BackendKind, CallbackAdapter, CameraMode, DecodeScript, EngineSuite,
    PollingAdapter, ScriptStep, Symbology,
};
pub use camera::{
    CameraPlatform, CameraResourceManager, CameraSlot, FacingMode, SimulatedCamera,
    SimulatedCameraOptions, ZoomRange,
};
pub use config::ScanbenchConfig;
pub use error::{
    BackendError, CameraError, EventBusError, Result, ScanbenchError, SessionError, UserMessage,
};
pub use events::{EventBus, EventFilter, EventReceiver, ScanEvent};
pub use history::{ResultSink, ScanEntry, ScanHistory};
pub use session::{DetectionEvent, ScanSession, ScanSessionController, SessionState};
pub use zoom::AdaptiveZoom;
