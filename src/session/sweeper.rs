//! Periodic removal of expired session records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::session::SessionStore;

pub struct SessionSweeper {
    sessions: Arc<SessionStore>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(sessions: Arc<SessionStore>, interval: Duration) -> Self {
        Self { sessions, interval }
    }

    /// Sweep on every tick until shutdown. The first sweep runs immediately,
    /// which clears records left over from a previous run.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.interval.is_zero() {
            tracing::info!("Session sweeping disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            session = %self.sessions.name(),
            "Session sweeper starting"
        );
        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn sweep(&self) {
        match self.sessions.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => {
                metrics::record_sessions_purged(removed);
                tracing::debug!(removed, "Purged expired sessions");
            }
            Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
        }
    }
}
