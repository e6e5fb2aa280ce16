//! Reader thread pool for side-input merging.
//!
//! Provides the thread pool that owns reader thread lifecycle, the shared work
//! queue and the element channel back to the consumer.
//!
//! # Key features
//! - Work queue is pre-filled and closed before any thread starts, so a claim
//!   is a single atomic `try_recv` and an empty queue means "no more work"
//! - Bounded output channel provides backpressure against a slow consumer
//! - Graceful shutdown on drop: flag raised, channel disconnected, threads joined
//! - `detach()` for runs that failed: threads are left to finish on their own
//! - Thread-local reader ids for logging

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, RecvError, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::SideInputError;
use crate::merger::common::thread::set_reader_id;

/// Thread pool for one merge run.
///
/// Manages reader threads and communication through channels:
/// - Work queue: Pre-filled claims, shared by all threads (load-balanced)
/// - Output channel: Threads -> consumer (bounded)
/// - Shutdown flag: Asks threads to stop between elements
///
/// # Type Parameters
/// - `Output`: Messages returned from reader threads
pub(crate) struct ReaderPool<Output> {
    workers: Vec<thread::JoinHandle<()>>,
    // Dropped before joining so threads blocked on a full channel wake up.
    output_rx: Option<Receiver<Output>>,
    shutdown: Arc<AtomicBool>,
}

impl<Output> ReaderPool<Output>
where
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads draining `tasks` in order.
    ///
    /// Each thread runs `worker_fn` once with its own handle on the work queue
    /// and returns when `worker_fn` returns.
    pub(crate) fn new<Task, F>(
        tasks: Vec<Task>,
        num_workers: usize,
        buffer_size: usize,
        worker_fn: F,
    ) -> Result<Self>
    where
        Task: Send + 'static,
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(SideInputError::InvalidConfig(
                "Cannot create ReaderPool with 0 threads".to_string(),
            )
            .into());
        }

        if buffer_size == 0 {
            return Err(SideInputError::InvalidConfig(
                "Cannot create ReaderPool with buffer_size 0. \
                Buffer size must be > 0 to prevent deadlocks."
                    .to_string(),
            )
            .into());
        }

        // Fill the work queue up front, then close it
        let (task_tx, task_rx) = bounded(tasks.len().max(1));
        for task in tasks {
            // Capacity covers every task and the receiver is alive
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        let (output_tx, output_rx) = bounded(buffer_size);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);

        let mut pool = Self {
            workers: Vec::with_capacity(num_workers),
            output_rx: Some(output_rx),
            shutdown: shutdown.clone(),
        };

        for reader_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown_clone = shutdown.clone();
            let worker_fn_clone = worker_fn.clone();

            // On failure `pool` drops here and joins the threads already started
            let handle = thread::Builder::new()
                .name(format!("side-input-reader-{}", reader_id))
                .spawn(move || {
                    set_reader_id(reader_id);
                    worker_fn_clone(task_rx, output_tx, shutdown_clone);
                })
                .map_err(|source| SideInputError::ThreadSpawn { reader_id, source })?;

            pool.workers.push(handle);
        }

        Ok(pool)
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn recv(&self) -> Result<Output, RecvError> {
        match &self.output_rx {
            Some(rx) => rx.recv(),
            None => Err(RecvError),
        }
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<Output, RecvTimeoutError> {
        match &self.output_rx {
            Some(rx) => rx.recv_timeout(timeout),
            None => Err(RecvTimeoutError::Disconnected),
        }
    }

    /// Asks reader threads to stop at their next element boundary.
    pub(crate) fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Stops the pool without waiting for its threads.
    ///
    /// Raises the shutdown flag, disconnects the output channel and drops the
    /// join handles. A thread stuck inside a read keeps running until that read
    /// returns, then sees the disconnected channel, closes its reader and exits.
    pub(crate) fn detach(&mut self) {
        self.signal_shutdown();
        self.output_rx.take();

        let detached = self.workers.len();
        self.workers.clear();
        tracing::debug!(detached, "Detached side input reader threads");
    }
}

impl<Output> Drop for ReaderPool<Output> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // Disconnect the output channel so blocked senders return
        self.output_rx.take();

        for worker in self.workers.drain(..) {
            let name = worker.thread().name().map(String::from);
            if worker.join().is_err() {
                tracing::warn!("Reader thread {:?} panicked before shutdown", name);
            }
        }
    }
}
