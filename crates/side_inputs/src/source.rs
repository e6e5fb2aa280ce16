//! src/source.rs
//!
//! Capability traits the merger consumes: sources, their readers, and the
//! per-item observer hook readers use to report what they read.
//!
//! # Reader lifecycle
//! ```text
//!   Source::open_reader()          acquisition (may fail)
//!         │
//!         ↓
//!   register_observer(..)          zero or more, before the first read
//!         │
//!         ↓
//!   read_next() ... Ok(None)       sequential, forward-only
//!         │
//!         ↓
//!   close()                        exactly once, on every exit path
//! ```

use crate::window::WindowedValue;
use anyhow::Result;
use std::sync::Arc;

/// A side-input dataset that can be opened for reading any number of times.
///
/// Side-input sources are expected to be deterministically re-readable: every
/// merge run reopens them from scratch.
pub trait Source<T>: Send + Sync {
    /// Opens a fresh reader positioned at the start of the source.
    fn open_reader(&self) -> Result<Box<dyn SourceReader<T>>>;
}

/// An item produced by a reader.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadItem<T> {
    /// A bare value that still needs a window assignment
    Value(T),
    /// A value the reader already tagged with window metadata
    Windowed(WindowedValue<T>),
}

impl<T> ReadItem<T> {
    /// The underlying value, regardless of windowing.
    pub fn value(&self) -> &T {
        match self {
            ReadItem::Value(value) => value,
            ReadItem::Windowed(wv) => &wv.value,
        }
    }
}

/// Stateful cursor over one source.
pub trait SourceReader<T>: Send {
    /// Whether `read_next` yields `ReadItem::Windowed` items.
    fn returns_windowed_values(&self) -> bool {
        false
    }

    /// Registers a callback to be invoked synchronously for every item read.
    fn register_observer(&mut self, observer: Arc<dyn ReadObserver<T>>);

    /// Produces the next item, or `Ok(None)` once the source is exhausted.
    fn read_next(&mut self) -> Result<Option<ReadItem<T>>>;

    /// Releases the reader. Called exactly once, after success or failure.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Per-item notification hook.
///
/// `is_encoded` is true when the item is the raw encoded byte sequence read
/// from storage, which is what byte accounting counts.
pub trait ReadObserver<T>: Send + Sync {
    fn on_item_read(&self, item: &T, is_encoded: bool);
}

impl<T, F> ReadObserver<T> for F
where
    F: Fn(&T, bool) + Send + Sync,
{
    fn on_item_read(&self, item: &T, is_encoded: bool) {
        self(item, is_encoded)
    }
}

/// Observer registry readers embed to implement `register_observer`.
pub struct ObserverList<T> {
    observers: Vec<Arc<dyn ReadObserver<T>>>,
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<T> ObserverList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn ReadObserver<T>>) {
        self.observers.push(observer);
    }

    pub fn notify(&self, item: &T, is_encoded: bool) {
        for observer in &self.observers {
            observer.on_item_read(item, is_encoded);
        }
    }
}

/// Size in bytes an item contributes to the bytes-read metric.
pub trait ByteSize {
    fn byte_size(&self) -> usize;
}

impl ByteSize for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for [u8] {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Box<[u8]> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for String {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for str {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for &str {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl<T: ByteSize + ?Sized> ByteSize for Arc<T> {
    fn byte_size(&self) -> usize {
        (**self).byte_size()
    }
}

macro_rules! impl_byte_size_for_primitives {
    ($($ty:ty),*) => {
        $(
            impl ByteSize for $ty {
                fn byte_size(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }
            }
        )*
    };
}

impl_byte_size_for_primitives!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char);
