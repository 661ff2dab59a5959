//! Wiring and ordered shutdown of the relay tasks.
//!
//! Shutdown order:
//!
//! 1. A termination signal sets the stopping flag, cancels the poller's stop
//!    token and tears down the stream connection.
//! 2. The poller finishes its current cycle and hands back its sender.
//! 3. The coordinator drops that sender, closing the match channel.
//! 4. The publisher drains what is buffered, stops the queue and reports.
//!
//! A separate timer tears the connection down every reset interval whether a
//! read is stuck or not, so no single stream request outlives one interval.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::pipeline::connection::ConnectionManager;
use crate::pipeline::poller::StreamPoller;
use crate::pipeline::publisher::{PublishStats, Publisher};

/// Process-wide "stopping" flag. Set at most once.
#[derive(Debug, Default)]
pub struct ShutdownState {
    stopping: Mutex<bool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `false` if it was already set.
    pub fn begin(&self) -> bool {
        let mut stopping = self.stopping.lock().unwrap_or_else(PoisonError::into_inner);
        if *stopping {
            return false;
        }
        *stopping = true;
        true
    }

    pub fn is_stopping(&self) -> bool {
        *self.stopping.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs the poller and publisher and shuts them down in order.
pub struct Coordinator {
    poller: StreamPoller,
    publisher: Publisher,
    connections: Arc<ConnectionManager>,
    state: Arc<ShutdownState>,
    reset_interval: Duration,
    channel_capacity: usize,
}

impl Coordinator {
    pub fn new(
        poller: StreamPoller,
        publisher: Publisher,
        connections: Arc<ConnectionManager>,
        reset_interval: Duration,
        channel_capacity: usize,
    ) -> Self {
        Self {
            poller,
            publisher,
            connections,
            state: Arc::new(ShutdownState::new()),
            reset_interval,
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn state(&self) -> Arc<ShutdownState> {
        Arc::clone(&self.state)
    }

    /// Run until `shutdown` resolves and every task has wound down.
    pub async fn run<F>(self, shutdown: F) -> Result<PublishStats>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(self.channel_capacity);
        let (poller_done_tx, poller_done_rx) = oneshot::channel();
        let (publisher_done_tx, publisher_done_rx) = oneshot::channel();

        let publisher = tokio::spawn(self.publisher.run(events_rx, publisher_done_tx));
        let poller = tokio::spawn(self.poller.run(stop.clone(), events_tx, poller_done_tx));
        let listener = tokio::spawn(listen_for_shutdown(
            shutdown,
            Arc::clone(&self.state),
            stop,
            Arc::clone(&self.connections),
        ));
        let resetter = tokio::spawn(reset_periodically(
            Arc::clone(&self.connections),
            Arc::clone(&self.state),
            self.reset_interval,
        ));
        log::info!("Relay running");

        match poller_done_rx.await {
            Ok(stopped) => {
                log::info!(
                    "Poller stopped after {} cycles; closing match channel",
                    stopped.cycles
                );
                drop(stopped.output);
            }
            Err(_) => log::error!("Poller exited without reporting; match channel closed"),
        }

        let stats = match publisher_done_rx.await {
            Ok(stats) => stats,
            Err(_) => {
                log::error!("Publisher exited without reporting");
                PublishStats::default()
            }
        };

        listener.abort();
        resetter.abort();
        join("poller", poller).await?;
        join("publisher", publisher).await?;

        log::info!(
            "Relay stopped: {} matches published, {} dropped",
            stats.published,
            stats.failed
        );
        Ok(stats)
    }
}

async fn join(task: &'static str, handle: JoinHandle<()>) -> Result<()> {
    handle.await.map_err(|e| AppError::Task {
        task,
        message: e.to_string(),
    })
}

/// Wait for `shutdown`, then stop the poller and unblock any pending read.
async fn listen_for_shutdown<F>(
    shutdown: F,
    state: Arc<ShutdownState>,
    stop: CancellationToken,
    connections: Arc<ConnectionManager>,
) where
    F: Future<Output = ()>,
{
    shutdown.await;
    if state.begin() {
        log::info!("Shutdown requested; stopping poller");
        stop.cancel();
        connections.teardown();
    }
}

/// Tear the connection down every `interval` until shutdown begins.
async fn reset_periodically(
    connections: Arc<ConnectionManager>,
    state: Arc<ShutdownState>,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;
        log::debug!("Periodic connection reset");
        connections.teardown();
        if state.is_stopping() {
            break;
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            log::error!("Failed to listen for SIGINT: {}", e);
                            std::future::pending::<()>().await;
                        }
                        log::info!("SIGINT received");
                    }
                    _ = sigterm.recv() => log::info!("SIGTERM received"),
                }
                return;
            }
            Err(e) => log::warn!("Failed to register SIGTERM handler: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("SIGINT received"),
        Err(e) => {
            log::error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
