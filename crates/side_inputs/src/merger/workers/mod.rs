//! Reader threads for side-input merging.
//!
//! - `pool`: Thread pool owning the work queue and the element channel
//! - `reader`: The loop each reader thread runs over claimed sources
//!
//! Threads report back through the element channel using the `ReaderEvent`
//! protocol below.

pub(crate) mod pool;
pub(crate) mod reader;

use crate::window::WindowedValue;

/// Messages from reader threads to the prefetching iterator.
pub(crate) enum ReaderEvent<T> {
    /// An element, already window-tagged
    Value(WindowedValue<T>),
    /// The sending thread found the work queue empty and exited
    Done,
    /// The sending thread's reader failed; the error is the reader's own
    Failed(anyhow::Error),
}
