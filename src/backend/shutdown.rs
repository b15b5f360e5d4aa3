//! Cooperative shutdown for background loops
//!
//! Every long-lived task (publish pumps, tail pumps, fan-out loops, consumer
//! group readers) is spawned through a [`TaskTracker`] and holds a
//! [`Shutdown`] handle. Loops check the handle between iterations and at
//! every sleep, so cancellation never interrupts an in-flight log operation.
//!
//! Shutdown sequence:
//!
//! 1. Flip the shared signal; loops stop picking up new work
//! 2. Pumps drain what is already queued
//! 3. Wait for tasks until the drain deadline, abort the stragglers

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Receiving side of the shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until shutdown is requested
    ///
    /// A dropped tracker counts as a shutdown request.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration` unless shutdown arrives first
    ///
    /// Returns `false` when woken by shutdown.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.wait() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Outcome of [`TaskTracker::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that finished within the drain deadline
    pub completed: usize,
    /// Tasks aborted at the deadline
    pub aborted: usize,
}

/// Owns the shutdown signal and the handles of every spawned loop
#[derive(Debug)]
pub struct TaskTracker {
    tx: watch::Sender<bool>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// A new handle on the shutdown signal
    pub fn signal(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Spawn a tracked background task
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.lock();
        handles.retain(|(_, h)| !h.is_finished());
        handles.push((name, handle));
        tracing::debug!("[Runtime] Spawned {} ({} tracked tasks)", name, handles.len());
    }

    /// Number of tracked tasks still running
    pub fn active(&self) -> usize {
        self.lock().iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Signal shutdown and wait up to `drain_timeout` for tasks to finish
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        self.tx.send_replace(true);
        let handles: Vec<_> = std::mem::take(&mut *self.lock());
        tracing::info!(
            "[Runtime] Shutdown requested, draining {} tasks (timeout {:?})",
            handles.len(),
            drain_timeout
        );

        let deadline = tokio::time::Instant::now() + drain_timeout;
        let mut report = ShutdownReport::default();
        for (name, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.completed += 1,
                Ok(Err(e)) => {
                    tracing::warn!("[Runtime] Task {} ended abnormally: {}", name, e);
                    report.completed += 1;
                }
                Err(_) => {
                    tracing::warn!("[Runtime] Task {} did not drain in time, aborting", name);
                    handle.abort();
                    report.aborted += 1;
                }
            }
        }

        tracing::info!(
            "[Runtime] Shutdown complete: {} drained, {} aborted",
            report.completed,
            report.aborted
        );
        report
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(&'static str, JoinHandle<()>)>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
