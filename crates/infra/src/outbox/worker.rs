//! Background thread that drains due outbox tasks.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};

use gasflow_core::{DomainError, DomainResult};

use super::dispatcher::{DrainReport, OutboxDispatcher};
use super::store::OutboxStore;

#[derive(Debug, Clone)]
pub struct OutboxWorkerConfig {
    pub poll_interval: Duration,
    pub name: String,
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "outbox-worker".to_string(),
        }
    }
}

impl OutboxWorkerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WorkerStats {
    pub passes: u64,
    pub tasks_attempted: u64,
    pub tasks_completed: u64,
    pub tasks_retrying: u64,
    pub tasks_dead_lettered: u64,
    pub uptime_secs: u64,
}

impl WorkerStats {
    fn record(&mut self, report: DrainReport) {
        self.passes += 1;
        self.tasks_attempted += report.attempted as u64;
        self.tasks_completed += report.completed as u64;
        self.tasks_retrying += report.retrying as u64;
        self.tasks_dead_lettered += report.dead_lettered as u64;
    }
}

/// Handle to a running worker.
#[derive(Debug)]
pub struct OutboxWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl OutboxWorkerHandle {
    /// Stop the worker and wait for the current pass to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        match self.stats.lock() {
            Ok(s) => *s,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub struct OutboxWorker;

impl OutboxWorker {
    pub fn spawn<O>(dispatcher: Arc<OutboxDispatcher<O>>, config: OutboxWorkerConfig) -> DomainResult<OutboxWorkerHandle>
    where
        O: OutboxStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let loop_stats = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker_loop(&dispatcher, &config, &shutdown_rx, &loop_stats))
            .map_err(|e| DomainError::internal(format!("failed to spawn outbox worker: {e}")))?;

        Ok(OutboxWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn worker_loop<O: OutboxStore>(
    dispatcher: &OutboxDispatcher<O>,
    config: &OutboxWorkerConfig,
    shutdown_rx: &mpsc::Receiver<()>,
    stats: &Mutex<WorkerStats>,
) {
    info!(worker = %config.name, "outbox worker started");
    let started = Instant::now();

    loop {
        match dispatcher.drain_due(Utc::now()) {
            Ok(report) => {
                if report.attempted > 0 {
                    debug!(
                        worker = %config.name,
                        attempted = report.attempted,
                        completed = report.completed,
                        retrying = report.retrying,
                        dead_lettered = report.dead_lettered,
                        "outbox pass finished"
                    );
                }
                if let Ok(mut s) = stats.lock() {
                    s.record(report);
                    s.uptime_secs = started.elapsed().as_secs();
                }
            }
            Err(e) => error!(worker = %config.name, error = %e, "outbox pass failed"),
        }

        match shutdown_rx.recv_timeout(config.poll_interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = %config.name, "outbox worker stopped");
}
