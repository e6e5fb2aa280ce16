//! src/merger/iterator.rs
//!
//! Iterator implementation for `SourceMerger`.
//!
//! This module contains the `iter()` method that starts a merge run and the
//! `PrefetchingIterator` it returns.
//!
//! The number of reader threads is `min(max_reader_threads, num_sources)`, so
//! no thread is ever started without a source to claim. A merger without
//! sources starts no threads and yields nothing.
//!
//! The `sideinput_io_metrics` experiment is looked up once per `iter()` call;
//! flipping it mid-run does not affect a run already started.

use anyhow::{Context, Result};
use crossbeam_channel::{RecvError, RecvTimeoutError};
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::workers::pool::ReaderPool;
use super::workers::reader::{run_reader_thread, ReaderContext, SourceClaim};
use super::workers::ReaderEvent;
use super::SourceMerger;
use crate::error::SideInputError;
use crate::source::ReadObserver;
use crate::window::WindowedValue;

impl<T> SourceMerger<T>
where
    T: Send + 'static,
{
    /// Starts a new merge run and returns an iterator over its elements.
    ///
    /// Every source is reopened; elements are prefetched by the reader threads
    /// while the caller consumes them.
    ///
    /// # Errors
    /// - Reader thread creation failure
    pub fn iter(&self) -> Result<PrefetchingIterator<T>> {
        let run = self.runs_started.fetch_add(1, Ordering::SeqCst);
        let num_sources = self.sources.len();
        let num_threads = self.reader_threads();

        if num_threads == 0 {
            tracing::debug!(run, "Side input merge has no sources");
            return Ok(PrefetchingIterator::empty());
        }

        let observer = self.bytes_read_observer();
        tracing::debug!(
            run,
            num_sources,
            num_threads,
            metrics_enabled = observer.is_some(),
            "Starting side input merge"
        );

        let claims: Vec<SourceClaim<T>> = self
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| SourceClaim {
                index,
                source: source.clone(),
            })
            .collect();

        let context = ReaderContext {
            failed: Arc::new(AtomicBool::new(false)),
            observer,
        };

        let pool = ReaderPool::new(
            claims,
            num_threads,
            self.config.element_queue_size,
            move |claims, output_tx, shutdown| {
                run_reader_thread(claims, output_tx, shutdown, &context);
            },
        )
        .with_context(|| {
            format!(
                "Failed to start {} reader threads for side input with {} sources",
                num_threads, num_sources
            )
        })?;

        Ok(PrefetchingIterator {
            num_threads: pool.num_workers(),
            pool: Some(pool),
            threads_done: 0,
            read_timeout: self.config.read_timeout,
            finished: false,
        })
    }

    /// Observer for this run, or `None` when metrics are off.
    fn bytes_read_observer(&self) -> Option<Arc<dyn ReadObserver<T>>> {
        let observer = self.bytes_observer.as_ref()?;
        if !self.config.runtime_options.side_input_io_metrics_enabled() {
            return None;
        }
        Some(observer.clone())
    }
}

/// Single-pass iterator over the elements of one merge run.
///
/// Created by calling `merger.iter()`. Yields `Ok(value)` for every element,
/// then ends once every reader thread has finished. A reader failure is yielded
/// once as `Err` (the reader's original error) and ends the iteration.
///
/// Dropping the iterator early stops the run: reader threads finish the
/// element they are reading, close their readers and are joined. After an
/// error or a read timeout the threads are not joined, so a reader stuck in
/// I/O never blocks the consumer.
pub struct PrefetchingIterator<T> {
    pool: Option<ReaderPool<ReaderEvent<T>>>,
    num_threads: usize,
    threads_done: usize,
    read_timeout: Option<Duration>,
    finished: bool,
}

impl<T> PrefetchingIterator<T>
where
    T: Send + 'static,
{
    fn empty() -> Self {
        Self {
            pool: None,
            num_threads: 0,
            threads_done: 0,
            read_timeout: None,
            finished: true,
        }
    }

    /// Number of reader threads serving this iterator.
    pub fn num_reader_threads(&self) -> usize {
        self.num_threads
    }

    fn recv_event(&self) -> Result<ReaderEvent<T>> {
        let disconnected = || -> anyhow::Error {
            SideInputError::ReaderThreadPanicked {
                finished: self.threads_done,
                total: self.num_threads,
            }
            .into()
        };

        let Some(pool) = &self.pool else {
            return Err(disconnected());
        };

        match self.read_timeout {
            Some(timeout) => match pool.recv_timeout(timeout) {
                Ok(event) => Ok(event),
                Err(RecvTimeoutError::Timeout) => Err(SideInputError::ReadTimeout(timeout).into()),
                Err(RecvTimeoutError::Disconnected) => Err(disconnected()),
            },
            None => pool.recv().map_err(|RecvError| disconnected()),
        }
    }

    /// All reader threads reported completion; they are exiting, so join them.
    fn complete(&mut self) {
        self.finished = true;
        self.pool.take();
    }

    /// Failure or timeout: stop the run and abandon the reader threads.
    ///
    /// Threads finish their in-flight read, close their reader and exit on
    /// their own; nothing waits for them.
    fn abort(&mut self) {
        self.finished = true;
        if let Some(mut pool) = self.pool.take() {
            pool.detach();
        }
    }
}

impl<T> Iterator for PrefetchingIterator<T>
where
    T: Send + 'static,
{
    type Item = Result<WindowedValue<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.recv_event() {
                Ok(ReaderEvent::Value(value)) => return Some(Ok(value)),
                Ok(ReaderEvent::Done) => {
                    self.threads_done += 1;
                    if self.threads_done >= self.num_threads {
                        self.complete();
                        return None;
                    }
                }
                Ok(ReaderEvent::Failed(e)) | Err(e) => {
                    self.abort();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<T> FusedIterator for PrefetchingIterator<T> where T: Send + 'static {}
