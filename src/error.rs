use crate::backend::BackendKind;
use crate::session::SessionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanbenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("System error: {message}")]
    System { message: String },
}

impl ScanbenchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Failures while acquiring or holding the camera stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Permission denied: {details}")]
    PermissionDenied { details: String },

    #[error("Camera unavailable: {details}")]
    Unavailable { details: String },

    #[error("A camera handle is already live for this session")]
    AlreadyAcquired,

    #[error("Acquisition completed after the session stopped")]
    Abandoned,
}

/// Failures of a decoding backend before it could begin scanning
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("{backend} is not supported: {details}")]
    Unsupported { backend: BackendKind, details: String },

    #[error("{backend} failed to initialize: {details}")]
    Init { backend: BackendKind, details: String },
}

impl BackendError {
    pub fn init<S: Into<String>>(backend: BackendKind, details: S) -> Self {
        Self::Init {
            backend,
            details: details.into(),
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            BackendError::Unsupported { backend, .. } | BackendError::Init { backend, .. } => {
                *backend
            }
        }
    }
}

/// The camera or engine rejected a zoom constraint. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to apply zoom {level:.1}: {details}")]
pub struct ZoomApplyError {
    pub level: f64,
    pub details: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Cannot {operation} while session is {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("The {backend} adapter was lost by an aborted run")]
    AdapterUnavailable { backend: BackendKind },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Receiver lagged behind by {missed} events")]
    Lagged { missed: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

/// Messages shown to the user when a session lands in `Failed`
pub trait UserMessage {
    fn user_message(&self) -> String;
}

impl UserMessage for CameraError {
    fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied { details } | CameraError::Unavailable { details } => {
                format!("Camera error: {}", details)
            }
            other => format!("Camera error: {}", other),
        }
    }
}

impl UserMessage for BackendError {
    fn user_message(&self) -> String {
        match self {
            BackendError::Unsupported {
                backend: BackendKind::Native,
                ..
            } => "BarcodeDetector API not supported on this browser.".to_string(),
            BackendError::Unsupported { backend, details } => {
                format!("{} not supported: {}", backend.label(), details)
            }
            BackendError::Init { backend, details } => {
                format!("{} init error: {}", backend.label(), details)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanbenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_user_message() {
        let error = CameraError::PermissionDenied {
            details: "Permission denied by user".to_string(),
        };
        assert_eq!(error.user_message(), "Camera error: Permission denied by user");
    }

    #[test]
    fn test_backend_user_messages() {
        let unsupported = BackendError::Unsupported {
            backend: BackendKind::Native,
            details: "BarcodeDetector missing".to_string(),
        };
        assert_eq!(
            unsupported.user_message(),
            "BarcodeDetector API not supported on this browser."
        );

        let init = BackendError::init(BackendKind::Quagga2, "no target");
        assert_eq!(init.user_message(), "Quagga2 init error: no target");
        assert_eq!(init.backend(), BackendKind::Quagga2);
    }

    #[test]
    fn test_system_constructor() {
        match ScanbenchError::system("boom") {
            ScanbenchError::System { message } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
