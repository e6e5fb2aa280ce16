//! src/merger/mod.rs
//!
//! This module implements the `SourceMerger`.
//!
//! The `SourceMerger` reads every source of a side input with a bounded pool of
//! reader threads and hands the elements to a single consumer, so that I/O on
//! the sources overlaps with consumption.
//!
//! # Architecture Overview
//!
//! ```text
//!         ┌──────────────────────────┐
//!         │ Sources [s0, s1, ... sN] │
//!         └────────────┬─────────────┘
//!                      │ one claim per source
//!                      ↓
//!               ┌────────────┐
//!               │ Work Queue │ (pre-filled, closed)
//!               └──────┬─────┘
//!                      │ try_recv (atomic claim)
//!                      ↓
//!             [Reader Threads] ×min(max_reader_threads, N)
//!                      │ open → read_next → wrap → close
//!                      ↓
//!            ┌──────────────────┐
//!            │ Element Channel  │ (bounded: backpressure)
//!            └────────┬─────────┘
//!                     │ Value | Done | Failed
//!                     ↓
//!         ┌──────────────────────┐
//!         │ PrefetchingIterator  │ → Result<WindowedValue<T>>
//!         └──────────────────────┘
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/merger/
//! ├── mod.rs         # SourceMerger and constructors
//! ├── config.rs      # MergerConfig, builder, and validation
//! ├── iterator.rs    # SourceMerger::iter() and PrefetchingIterator
//! ├── workers/
//! │   ├── mod.rs     # ReaderEvent protocol
//! │   ├── pool.rs    # ReaderPool: threads, work queue, element channel
//! │   └── reader.rs  # Per-thread read loop
//! └── common/
//!     ├── mod.rs
//!     └── thread.rs  # Thread-local reader id
//! ```
//!
//! # Ordering
//! - One reader thread: elements come out as the concatenation of the sources
//!   in list order.
//! - Several reader threads: elements of one source keep their order, elements
//!   of different sources interleave arbitrarily.
//!
//! # Failures
//! The first reader failure is delivered from `next()` as the reader's own
//! error, after the elements that were queued before it. Elements read by other
//! threads around the same time may or may not be delivered first; only the
//! error itself is guaranteed to surface. After it, the iterator is exhausted
//! and the remaining reader threads are abandoned rather than joined.
//!
//! # Example Usage
//! ```ignore
//! let merger = get_merged_iterator(sources, 4, Some(counter))?;
//!
//! // Every call re-reads all sources
//! for value in merger.iter()? {
//!     let value: WindowedValue<Vec<u8>> = value?;
//! }
//! ```

mod common;
mod config;
mod iterator;
mod workers;

pub use common::thread::current_reader_id;
pub use config::{MergerConfig, MergerConfigBuilder, ELEMENT_QUEUE_SIZE, MAX_SOURCE_READER_THREADS};
pub use iterator::PrefetchingIterator;

use crate::metrics::{BytesReadObserver, ReadCounter};
use crate::source::{ByteSize, ReadObserver, Source};
use anyhow::{Context, Result};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

/// Restartable factory over the merged elements of a set of sources.
///
/// Each call to `iter()` starts a new run: new reader threads, every source
/// reopened from scratch.
///
/// # Thread safety:
/// - `SourceMerger` is Send + Sync and can be shared across threads.
/// - Several iterators can be alive at once; each owns its own threads.
pub struct SourceMerger<T> {
    pub(crate) sources: Vec<Arc<dyn Source<T>>>,
    pub(crate) config: MergerConfig,
    /// Attached to every reader while the `sideinput_io_metrics` experiment is on
    pub(crate) bytes_observer: Option<Arc<dyn ReadObserver<T>>>,
    pub(crate) runs_started: AtomicUsize,
}

impl<T> SourceMerger<T>
where
    T: Send + 'static,
{
    /// Creates a merger over `sources`.
    ///
    /// # Errors
    /// - Returns error if `max_reader_threads` or `element_queue_size` is 0
    pub fn new(sources: Vec<Arc<dyn Source<T>>>, config: MergerConfig) -> Result<Self> {
        config
            .validate()
            .context("Failed to create side input source merger")?;

        Ok(Self {
            sources,
            config,
            bytes_observer: None,
            runs_started: AtomicUsize::new(0),
        })
    }

    /// Reports every item read to `observer` when the `sideinput_io_metrics`
    /// experiment is enabled at the time `iter()` is called.
    ///
    /// For item types without a `ByteSize`, this is how byte accounting is
    /// supplied.
    pub fn with_bytes_observer(mut self, observer: Arc<dyn ReadObserver<T>>) -> Self {
        self.bytes_observer = Some(observer);
        self
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    /// Number of reader threads each run will use.
    pub fn reader_threads(&self) -> usize {
        self.config.effective_reader_threads(self.sources.len())
    }
}

impl<T> SourceMerger<T>
where
    T: ByteSize + Send + 'static,
{
    /// Reports the size of every encoded item into `counter` when the
    /// `sideinput_io_metrics` experiment is enabled at the time `iter()` is called.
    pub fn with_read_counter(self, counter: Arc<dyn ReadCounter>) -> Self {
        self.with_bytes_observer(Arc::new(BytesReadObserver::new(counter)))
    }
}

/// Merges `sources` with up to `max_reader_threads` reader threads, using the
/// process-wide runtime options for experiment lookup.
///
/// The returned merger is the iterator factory: call `iter()` for each pass.
/// Item sizes for `read_counter` come from `ByteSize`; other item types go
/// through `SourceMerger::new` and `with_bytes_observer`.
pub fn get_merged_iterator<T>(
    sources: Vec<Arc<dyn Source<T>>>,
    max_reader_threads: usize,
    read_counter: Option<Arc<dyn ReadCounter>>,
) -> Result<SourceMerger<T>>
where
    T: ByteSize + Send + 'static,
{
    let config = MergerConfig::builder()
        .max_reader_threads(max_reader_threads)
        .build();

    let merger = SourceMerger::new(sources, config)?;
    Ok(match read_counter {
        Some(counter) => merger.with_read_counter(counter),
        None => merger,
    })
}
