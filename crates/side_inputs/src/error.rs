//! src/error.rs
//!
//! Errors raised by the side-input core itself.
//!
//! Failures coming out of a `Source` or `SourceReader` are never converted into
//! these variants: they travel through the merger as the reader's own
//! `anyhow::Error` so the consumer can still `downcast_ref` to the original type.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SideInputError {
    /// Rejected merger or iterable configuration
    #[error("Invalid side input configuration: {0}")]
    InvalidConfig(String),

    /// The OS refused to start a reader thread
    #[error("Failed to spawn side input reader thread {reader_id}: {source}")]
    ThreadSpawn {
        reader_id: usize,
        #[source]
        source: std::io::Error,
    },

    /// A source's reader panicked while being read
    #[error("Reader for side input source {source_index} panicked: {message}")]
    ReaderPanicked { source_index: usize, message: String },

    /// A reader thread went away without reporting completion or failure
    #[error(
        "Side input reader thread panicked ({finished} of {total} reader threads finished cleanly)"
    )]
    ReaderThreadPanicked { finished: usize, total: usize },

    /// No element arrived within the configured read timeout
    #[error("Timed out after {0:?} waiting for side input elements")]
    ReadTimeout(Duration),

    /// Runtime options could not be parsed
    #[error("Invalid runtime options: {0}")]
    InvalidOptions(String),

    /// A reader declared windowed output but produced a bare value
    #[error("Reader for side input source {source_index} declared windowed values but produced a bare value")]
    WindowedValueExpected { source_index: usize },
}
