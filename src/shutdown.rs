//! Shutdown manager for graceful termination of the collector daemon.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Manages graceful shutdown of the application
pub struct ShutdownManager {
    /// Token to signal shutdown to all tasks
    cancel_token: CancellationToken,
    /// Handles to all spawned tasks
    task_handles: Vec<JoinHandle<()>>,
    /// How long tasks get to finish after cancellation
    grace_period: Duration,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            task_handles: Vec::new(),
            grace_period: Duration::from_secs(crate::constants::collector::SHUTDOWN_GRACE_SECS),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Get a clone of the cancellation token for spawning tasks
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Register a task handle for shutdown coordination
    pub fn register_task(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    /// Wait for ctrl+c and gracefully shut down all tasks
    pub async fn wait_for_shutdown(self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }

        tracing::info!("🛑 Shutdown signal received");
        self.shutdown().await;
    }

    /// Cancel every task and wait (bounded) for them to finish
    pub async fn shutdown(mut self) -> bool {
        self.cancel_token.cancel();

        let grace_period = self.grace_period;
        let shutdown_tasks = std::pin::pin!(async {
            for handle in self.task_handles.drain(..) {
                let _ = handle.await;
            }
        });

        match tokio::time::timeout(grace_period, shutdown_tasks).await {
            Ok(_) => {
                tracing::info!("✓ All tasks shut down gracefully");
                true
            }
            Err(_) => {
                tracing::warn!("⏱️  Shutdown timeout: Some tasks did not complete");
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
