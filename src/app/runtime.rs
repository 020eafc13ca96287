use super::{RunOutcome, ScannerHarness, ShutdownReason};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl ScannerHarness {
    /// Wait for the mounted session to settle, giving up early on Ctrl+C,
    /// SIGTERM or `request_shutdown`
    pub async fn run_until_settled(&self) -> RunOutcome {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let handlers = self.cancellation_token.child_token();
        self.setup_signal_handlers(shutdown_sender, handlers.clone());
        let _handlers_guard = handlers.drop_guard();

        tokio::select! {
            settled = self.wait_until_settled() => match settled {
                Some(session) => RunOutcome::Settled(session),
                None => RunOutcome::Closed,
            },
            Ok(reason) = shutdown_receiver => {
                info!("Stopped waiting: {:?}", reason);
                RunOutcome::Interrupted(reason)
            }
            _ = self.cancellation_token.cancelled() => {
                RunOutcome::Interrupted(ShutdownReason::UserRequest)
            }
        }
    }

    /// Interrupt any `run_until_settled` in progress
    pub fn request_shutdown(&self) {
        self.cancellation_token.cancel();
    }

    fn setup_signal_handlers(
        &self,
        shutdown_sender: oneshot::Sender<ShutdownReason>,
        token: CancellationToken,
    ) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM - Unix only
        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            let token = token.clone();
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                tokio::select! {
                    _ = token.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        if let Some(sender) = sender.lock().await.take() {
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let sender = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    if let Some(sender) = sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                    }
                }
            }
        });
    }
}
