//! Stale Session Reaper
//!
//! Periodic sweep that force-removes sessions older than the maximum call
//! lifetime, bounding memory growth from clients that disconnect without a
//! clean hang-up. Removal goes through the registry's idempotent delete, so
//! a sweep racing a concurrent hang-up never double-fires; the sweep itself
//! emits no terminal broadcasts.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::registry::SessionRegistry;

/// Periodically reclaims sessions past their maximum lifetime
pub struct StaleSessionReaper {
    registry: Arc<SessionRegistry>,
    sweep_interval: Duration,
    max_session_age: Duration,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StaleSessionReaper {
    pub fn new(
        registry: Arc<SessionRegistry>,
        sweep_interval: Duration,
        max_session_age: Duration,
    ) -> Self {
        Self {
            registry,
            sweep_interval,
            max_session_age,
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// Start the periodic sweep task
    pub fn start(self: &Arc<Self>) {
        let reaper = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper.sweep_interval);
            // The first tick fires immediately; skip it so a fresh start
            // does not sweep before anything can age.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                reaper.run_sweep().await;
            }
        });

        *self.handle.lock() = Some(task);
        tracing::info!(
            "Stale session reaper started: sweep every {:?}, max age {:?}",
            self.sweep_interval,
            self.max_session_age
        );
    }

    /// Run one sweep, returning how many sessions were reaped
    ///
    /// Works off a snapshot; each removal is an independent idempotent
    /// delete, so the sweep never holds the registry lock across entries.
    pub async fn run_sweep(&self) -> usize {
        let snapshot = self.registry.snapshot().await;
        let mut reaped = 0;

        for session in snapshot {
            if session.age() >= self.max_session_age {
                if self.registry.delete(&session.call_id).await {
                    tracing::warn!(
                        "Reaped stale session {} (state {}, age {:?})",
                        session.call_id,
                        session.state,
                        session.age()
                    );
                    reaped += 1;
                }
            }
        }

        if reaped > 0 {
            tracing::info!("Reaper sweep removed {} stale session(s)", reaped);
        }
        reaped
    }

    /// Stop the periodic sweep task
    pub fn shutdown(&self) {
        if let Some(task) = self.handle.lock().take() {
            task.abort();
            tracing::debug!("Stale session reaper stopped");
        }
    }
}

impl Drop for StaleSessionReaper {
    fn drop(&mut self) {
        if let Some(task) = self.handle.lock().take() {
            task.abort();
        }
    }
}
