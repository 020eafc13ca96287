mod orchestrator;
mod runtime;
mod shutdown;
mod state;
mod types;


pub use orchestrator::ScannerHarness;
pub use types::{ComponentState, RunOutcome, ShutdownReason};
