use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::worker::runner::ReportWorker;

const WAKE_CAPACITY: usize = 64;

/// Signals idle workers that new work may be available.
///
/// Signals beyond the channel capacity are dropped; workers still poll.
#[derive(Clone)]
pub struct WakeHandle {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl WakeHandle {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(WAKE_CAPACITY);
        Self { sender, receiver }
    }

    pub fn wake(&self) {
        match self.sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => debug!("Wake channel closed"),
        }
    }

    /// Blocks until a wake signal arrives or `timeout` elapses.
    fn wait(&self, timeout: Duration) -> Result<(), WorkerError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::ChannelClosed),
        }
    }
}

impl Default for WakeHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs report workers on dedicated threads until shut down.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    wake: WakeHandle,
}

impl WorkerPool {
    /// Spawns one thread per worker. Idle workers sleep until woken or until
    /// `poll_interval` passes.
    pub fn start(
        workers: Vec<ReportWorker>,
        poll_interval: Duration,
        wake: WakeHandle,
    ) -> Result<Self, WorkerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(workers.len());

        for (index, worker) in workers.into_iter().enumerate() {
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_wake = wake.clone();

            let spawned = thread::Builder::new()
                .name(format!("report-worker-{}", index))
                .spawn(move || run_worker(worker, shutdown_flag, worker_wake, poll_interval));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Stop whatever already started before reporting.
                    let partial = Self {
                        workers: handles,
                        shutdown,
                        wake,
                    };
                    partial.shutdown();
                    partial.wait();
                    return Err(WorkerError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} report workers", handles.len());

        Ok(Self {
            workers: handles,
            shutdown,
            wake,
        })
    }

    pub fn wake_handle(&self) -> WakeHandle {
        self.wake.clone()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Asks workers to stop after their current job.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
        for _ in 0..self.workers.len() {
            self.wake.wake();
        }
    }

    pub fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker: ReportWorker,
    shutdown: Arc<AtomicBool>,
    wake: WakeHandle,
    poll_interval: Duration,
) {
    debug!("Worker {} started", worker.id());

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker.id());
            break;
        }

        let idle = match worker.run_once() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) if e.is_transient() => {
                warn!("Worker {} could not reach the ledger: {}", worker.id(), e);
                true
            }
            Err(e) => {
                error!("Worker {} ledger error: {}", worker.id(), e);
                true
            }
        };

        if idle {
            if let Err(e) = wake.wait(poll_interval) {
                error!("Worker {} stopping: {}", worker.id(), e);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker.id());
}
