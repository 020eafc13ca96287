mod controller;
mod types;


pub use controller::ScanSessionController;
pub use types::{DetectionEvent, ScanSession, SessionState};
