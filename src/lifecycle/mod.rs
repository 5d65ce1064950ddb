//! Background lifecycle for long-running services
//!
//! A [`ManagedTask`] builds its read-only state once, then runs a cancellable
//! body until it finishes or is told to stop. The runner owns the tokio task,
//! the cancellation token, and the startup/shutdown log lines.
//!
//! ```text
//! start(task)
//!     │
//!     ├─► create_context()      (once; failure ends the run)
//!     └─► execute(ctx, token)   (once; returns after the task drained)
//! ```

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A service run by [`start`]
#[async_trait]
pub trait ManagedTask: Send + Sync + 'static {
    /// State built once before execution and handed to `execute`
    type Context: Send + 'static;
    /// What a completed execution reports back
    type Output: Send + 'static;

    /// Human readable name used in diagnostics
    fn name(&self) -> &str;

    async fn create_context(&self) -> Result<Self::Context>;

    /// Run until done or until `cancel` fires. Must not return before any
    /// work it started has stopped.
    async fn execute(&self, context: Self::Context, cancel: CancellationToken)
        -> Result<Self::Output>;
}

/// Handle to a task started with [`start`]
pub struct ManagedHandle<T> {
    name: String,
    cancel: CancellationToken,
    task: JoinHandle<Result<T>>,
}

impl<T> ManagedHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the task to stop. Calling this more than once has no extra effect.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to finish
    pub async fn join(self) -> Result<T> {
        self.task
            .await
            .with_context(|| format!("{} terminated abnormally", self.name))?
    }

    /// Request a stop and wait for the task to finish
    pub async fn stop_and_join(self) -> Result<T> {
        self.stop();
        self.join().await
    }
}

/// Start a task in the background with a fresh cancellation token
pub fn start<T: ManagedTask>(task: T) -> ManagedHandle<T::Output> {
    start_with_token(task, CancellationToken::new())
}

/// Start a task in the background, stopping it when `cancel` fires
pub fn start_with_token<T: ManagedTask>(
    task: T,
    cancel: CancellationToken,
) -> ManagedHandle<T::Output> {
    let task = Arc::new(task);
    let name = task.name().to_string();

    let token = cancel.clone();
    let handle = tokio::spawn(async move { run(task, token).await });

    ManagedHandle {
        name,
        cancel,
        task: handle,
    }
}

async fn run<T: ManagedTask>(task: Arc<T>, cancel: CancellationToken) -> Result<T::Output> {
    let name = task.name().to_string();
    tracing::info!("Starting {}...", name);

    let context = match task.create_context().await {
        Ok(context) => context,
        Err(e) => {
            tracing::error!("{} failed to start: {:#}", name, e);
            return Err(e);
        }
    };

    tracing::info!("{} started.", name);
    let result = task.execute(context, cancel).await;

    match &result {
        Ok(_) => tracing::info!("{} stopped.", name),
        Err(e) => tracing::error!("{} stopped with error: {:#}", name, e),
    }

    result
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
///
/// A signal whose handler cannot be installed is logged and skipped. If
/// neither can be installed this never resolves and only the task finishing
/// on its own ends the run.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C."),
        _ = terminate => tracing::info!("Received SIGTERM."),
    }
}
