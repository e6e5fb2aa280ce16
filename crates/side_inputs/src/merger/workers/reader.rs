//! src/merger/workers/reader.rs
//!
//! The loop each side-input reader thread runs.
//!
//! # Thread lifecycle
//! 1. Claim the next source from the shared work queue (exit when empty)
//! 2. Open its reader, attaching the bytes-read observer when metrics are on
//! 3. Forward every element, window-tagged, into the element channel
//! 4. Close the reader (on every exit path) and go back to 1
//! 5. Send `ReaderEvent::Done` on exit
//!
//! A failure to open, read or close is sent as `ReaderEvent::Failed`, raises the
//! shared `failed` flag and ends the thread. Other threads check the flags at
//! every element boundary, so shutdown is cooperative: an element being read
//! when the failure happens is finished, never interrupted.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::ReaderEvent;
use crate::error::SideInputError;
use crate::merger::common::thread::current_reader_id;
use crate::source::{ReadItem, ReadObserver, Source, SourceReader};
use crate::window::WindowedValue;

/// One entry of the work queue.
pub(crate) struct SourceClaim<T> {
    pub(crate) index: usize,
    pub(crate) source: Arc<dyn Source<T>>,
}

/// State shared by all reader threads of one merge run.
pub(crate) struct ReaderContext<T> {
    /// Raised by the first thread whose reader fails
    pub(crate) failed: Arc<AtomicBool>,
    /// Bytes-read observer, present only when metrics are enabled for this run
    pub(crate) observer: Option<Arc<dyn ReadObserver<T>>>,
}

enum SourceOutcome {
    /// Reader returned `Ok(None)`
    Exhausted { elements: usize },
    /// Stopped early: shutdown, another thread failed, or the consumer left
    Abandoned,
}

/// Body of a reader thread.
pub(crate) fn run_reader_thread<T>(
    claims: Receiver<SourceClaim<T>>,
    output_tx: Sender<ReaderEvent<T>>,
    shutdown: Arc<AtomicBool>,
    context: &ReaderContext<T>,
) where
    T: Send + 'static,
{
    let reader_id = current_reader_id().unwrap_or_default();
    let mut sources_read = 0usize;

    loop {
        if stop_requested(&shutdown, &context.failed) {
            break;
        }

        // Empty and disconnected both mean the queue is drained
        let Ok(claim) = claims.try_recv() else {
            break;
        };
        tracing::trace!(reader_id, source_index = claim.index, "Claimed side input source");

        let result = catch_unwind(AssertUnwindSafe(|| {
            read_source(&claim, &output_tx, &shutdown, context)
        }))
        .unwrap_or_else(|payload| {
            Err(SideInputError::ReaderPanicked {
                source_index: claim.index,
                message: panic_message(payload.as_ref()),
            }
            .into())
        });

        match result {
            Ok(SourceOutcome::Exhausted { elements }) => {
                sources_read += 1;
                tracing::trace!(
                    reader_id,
                    source_index = claim.index,
                    elements,
                    "Finished side input source"
                );
            }
            Ok(SourceOutcome::Abandoned) => break,
            Err(e) => {
                context.failed.store(true, Ordering::SeqCst);
                tracing::warn!(
                    reader_id,
                    source_index = claim.index,
                    "Side input reader failed: {:#}",
                    e
                );
                // The consumer may already be gone
                let _ = output_tx.send(ReaderEvent::Failed(e));
                break;
            }
        }
    }

    tracing::trace!(reader_id, sources_read, "Side input reader thread exiting");
    let _ = output_tx.send(ReaderEvent::Done);
}

fn stop_requested(shutdown: &AtomicBool, failed: &AtomicBool) -> bool {
    shutdown.load(Ordering::SeqCst) || failed.load(Ordering::SeqCst)
}

/// Reads one claimed source to completion.
fn read_source<T>(
    claim: &SourceClaim<T>,
    output_tx: &Sender<ReaderEvent<T>>,
    shutdown: &AtomicBool,
    context: &ReaderContext<T>,
) -> Result<SourceOutcome>
where
    T: Send + 'static,
{
    let mut reader = ScopedReader::open(claim.source.as_ref())?;

    if let Some(observer) = &context.observer {
        reader.register_observer(observer.clone());
    }
    let returns_windowed = reader.returns_windowed_values();

    let mut elements = 0usize;
    let outcome = loop {
        if stop_requested(shutdown, &context.failed) {
            break SourceOutcome::Abandoned;
        }

        // An error here drops `reader`, which still closes it
        let Some(item) = reader.read_next()? else {
            break SourceOutcome::Exhausted { elements };
        };
        let value = into_windowed(item, returns_windowed, claim.index)?;

        // Blocks while the element queue is full
        if output_tx.send(ReaderEvent::Value(value)).is_err() {
            break SourceOutcome::Abandoned;
        }
        elements += 1;
    };

    reader.close()?;
    Ok(outcome)
}

fn into_windowed<T>(
    item: ReadItem<T>,
    returns_windowed: bool,
    source_index: usize,
) -> Result<WindowedValue<T>> {
    match item {
        ReadItem::Windowed(value) => Ok(value),
        ReadItem::Value(_) if returns_windowed => {
            Err(SideInputError::WindowedValueExpected { source_index }.into())
        }
        ReadItem::Value(value) => Ok(WindowedValue::in_global_window(value)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Reader that is closed exactly once, whichever way its scope is left.
///
/// `close()` reports the close error; dropping an unclosed reader (error or
/// unwind paths) closes it and only logs a close error, so the original
/// failure is the one propagated.
struct ScopedReader<T> {
    reader: Box<dyn SourceReader<T>>,
    closed: bool,
}

impl<T> ScopedReader<T> {
    fn open(source: &dyn Source<T>) -> Result<Self> {
        Ok(Self {
            reader: source.open_reader()?,
            closed: false,
        })
    }

    fn close(mut self) -> Result<()> {
        self.closed = true;
        self.reader.close()
    }
}

impl<T> Deref for ScopedReader<T> {
    type Target = dyn SourceReader<T>;

    fn deref(&self) -> &Self::Target {
        self.reader.as_ref()
    }
}

impl<T> DerefMut for ScopedReader<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.reader.as_mut()
    }
}

impl<T> Drop for ScopedReader<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.reader.close() {
            tracing::warn!("Failed to close side input reader after an earlier failure: {:#}", e);
        }
    }
}
