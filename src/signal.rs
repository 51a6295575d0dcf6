//! Shutdown on SIGINT/SIGTERM.
//!
//! A signal cancels the run's [`ShutdownToken`]. [`crate::compute::CallGuard`]
//! selects on it, so the in-flight API call returns `Cancelled` at once and
//! the auditor stops the current account and skips the rest. The report for
//! completed work still goes out.

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancellation shared by every task of one audit run.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken {
    inner: CancellationToken,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Resolves as soon as the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}

/// Cancels a token on the first SIGINT or SIGTERM while alive.
pub struct ShutdownGuard {
    task: JoinHandle<()>,
}

impl ShutdownGuard {
    /// Must be called inside a Tokio runtime. If neither handler can be
    /// registered the run simply can't be interrupted gracefully.
    pub fn new(token: ShutdownToken) -> Self {
        let task = tokio::spawn(async move {
            let mut sigint = signal(SignalKind::interrupt())
                .map_err(|e| warn!("Failed to register SIGINT handler: {}", e))
                .ok();
            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| warn!("Failed to register SIGTERM handler: {}", e))
                .ok();
            if sigint.is_none() && sigterm.is_none() {
                warn!("No signal handlers registered, graceful shutdown disabled");
                return;
            }

            let name = tokio::select! {
                Some(_) = recv(&mut sigint) => "SIGINT",
                Some(_) = recv(&mut sigterm) => "SIGTERM",
                else => return,
            };
            info!("Received {}, stopping audit after reporting completed work", name);
            token.cancel();
        });

        Self { task }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Waits on an optional signal stream; a missing stream never fires.
async fn recv(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}
