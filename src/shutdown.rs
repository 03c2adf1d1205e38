// Ctrl+C handling for the orchestrator

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Set once the process has been asked to stop. Cloned into the orchestrator
/// so that admission can refuse new sessions.
#[derive(Clone, Default)]
pub struct ShutdownState {
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            log::info!("[Shutdown] Shutdown requested");
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

/// Listen for Ctrl+C. The first signal marks `state` and runs `on_shutdown`;
/// later signals are only logged while running sessions wind down.
pub fn spawn_ctrl_c_listener<F>(state: ShutdownState, on_shutdown: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        let mut on_shutdown = Some(on_shutdown);
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("[Shutdown] Cannot listen for Ctrl+C: {}", e);
                return;
            }

            state.request_shutdown();
            match on_shutdown.take() {
                Some(callback) => {
                    log::info!("[Shutdown] Ctrl+C received, cancelling sessions");
                    callback();
                }
                None => log::info!("[Shutdown] Still waiting for sessions to stop"),
            }
        }
    })
}
