//! Graceful shutdown coordinator
//!
//! Long-running tasks (reaper, snapshot saver) subscribe to a broadcast of
//! `ShutdownSignal` and `select!` on it. A graceful shutdown waits for the
//! registered tasks up to the configured timeout.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Finish the current unit of work (e.g. a final snapshot) and stop
    Graceful,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
    done: watch::Sender<bool>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            done: watch::Sender::new(false),
            timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// Track a task so graceful shutdown waits for it
    pub async fn register(&self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.tasks.lock().await.push((name.into(), handle));
    }

    /// Broadcast `Graceful` and wait for registered tasks, up to the timeout
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().await;
            if *state != ShutdownState::Running {
                warn!("Shutdown already in progress");
                return;
            }
            *state = ShutdownState::ShuttingDown;
        }

        info!("Initiating graceful shutdown");
        if self.shutdown_tx.send(ShutdownSignal::Graceful).is_err() {
            warn!("No task listening for the shutdown signal");
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => info!(task = %name, "Task stopped"),
                Ok(Err(e)) => error!(task = %name, "Task failed during shutdown: {}", e),
                Err(_) => {
                    warn!(task = %name, "Task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        *self.state.write().await = ShutdownState::Shutdown;
        self.done.send_replace(true);
        info!("Shutdown complete");
    }

    pub async fn shutdown_immediately(&self) {
        warn!("Initiating immediate shutdown");
        *self.state.write().await = ShutdownState::Shutdown;

        if self.shutdown_tx.send(ShutdownSignal::Immediate).is_err() {
            warn!("No task listening for the shutdown signal");
        }
        for (_, handle) in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
        self.done.send_replace(true);
    }

    /// Resolves once a shutdown has finished
    pub async fn wait_until_complete(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.state.read().await != ShutdownState::Running
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }
}

/// Trigger a graceful shutdown on SIGINT or SIGTERM
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        coordinator.shutdown().await;
    });
}

#[cfg(windows)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("Received Ctrl+C");
        coordinator.shutdown().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_waits_for_tasks() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let mut rx = coordinator.subscribe();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            let signal = rx.recv().await;
            let _ = done_tx.send(signal.ok());
        });
        coordinator.register("listener", handle).await;

        assert_eq!(coordinator.state().await, ShutdownState::Running);
        coordinator.shutdown().await;

        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);
        assert_eq!(done_rx.await.unwrap(), Some(ShutdownSignal::Graceful));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_aborted_after_timeout() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        coordinator.register("stuck", handle).await;

        coordinator.shutdown().await;
        coordinator.wait_until_complete().await;
        assert!(coordinator.is_shutting_down().await);
        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);
    }

    #[tokio::test]
    async fn test_second_shutdown_is_noop() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        coordinator.shutdown().await;
        coordinator.shutdown().await;
        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);
    }
}
