//! Thread-local storage for reader thread identification.
//!
//! Each reader thread records its id when spawned so that log lines and
//! captured failures can name the thread that produced them.

use std::cell::Cell;

thread_local! {
    /// Thread-local reader id.
    ///
    /// Assigned (0 to num_threads-1) when a reader thread starts. `None` on
    /// threads that are not side-input reader threads, including the consumer.
    pub static READER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Id of the reader thread the caller runs on, if any.
pub fn current_reader_id() -> Option<usize> {
    READER_ID.with(|id| id.get())
}

pub(crate) fn set_reader_id(reader_id: usize) {
    READER_ID.with(|id| id.set(Some(reader_id)));
}
