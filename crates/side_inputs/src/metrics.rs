//! src/metrics.rs
//!
//! Bytes-read accounting for side-input reads.
//!
//! The merger only reports into a `ReadCounter` when the
//! `sideinput_io_metrics` experiment is enabled; see `options.rs`.

use crate::source::{ByteSize, ReadObserver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sink for the number of bytes read from side-input sources.
///
/// Implementations are shared by every reader thread of a merge run and must
/// tolerate concurrent calls.
pub trait ReadCounter: Send + Sync {
    fn add_bytes_read(&self, n: u64);
}

/// Atomic in-process byte counter.
#[derive(Debug, Default)]
pub struct BytesReadCounter {
    bytes_read: AtomicU64,
    items_counted: AtomicU64,
}

impl BytesReadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Number of `add_bytes_read` calls received.
    pub fn items_counted(&self) -> u64 {
        self.items_counted.load(Ordering::Relaxed)
    }
}

impl ReadCounter for BytesReadCounter {
    fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
        self.items_counted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Observer that forwards the size of every encoded item to a counter.
pub struct BytesReadObserver {
    counter: Arc<dyn ReadCounter>,
}

impl BytesReadObserver {
    pub fn new(counter: Arc<dyn ReadCounter>) -> Self {
        Self { counter }
    }
}

impl<T: ByteSize> ReadObserver<T> for BytesReadObserver {
    fn on_item_read(&self, item: &T, is_encoded: bool) {
        if is_encoded {
            self.counter.add_bytes_read(item.byte_size() as u64);
        }
    }
}
