//! Background refresh task handle.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Owns a selector's refresh task and stops it on shutdown or drop.
#[derive(Debug)]
pub struct RefreshTask {
    backend: &'static str,
    shutdown: Shutdown,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshTask {
    /// Spawn `run` with a receiver that fires when the task should exit.
    pub fn spawn<F, Fut>(backend: &'static str, run: F) -> Self
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(run(shutdown.subscribe()));
        tracing::debug!(backend, "Refresh task started");

        Self {
            backend,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Signal the task to stop. Idempotent.
    pub fn stop(&self) {
        if self.shutdown.trigger() {
            tracing::info!(backend = self.backend, "Refresh task stopping");
        }
    }

    /// Stop the task and wait for it to exit.
    pub async fn stop_and_wait(&self) {
        self.stop();
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(backend = self.backend, error = %e, "Refresh task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
