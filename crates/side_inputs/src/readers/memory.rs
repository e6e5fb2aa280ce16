use crate::source::{ObserverList, ReadItem, ReadObserver, Source, SourceReader};
use crate::window::WindowedValue;
use anyhow::Result;
use std::sync::Arc;

/// In-memory source over a fixed list of values.
///
/// Every reader replays the same values in order. Values are reported to
/// observers as encoded bytes only when built with `.encoded(true)`.
///
/// # Example
/// ```ignore
/// let source = IterSource::new(vec![b"a".to_vec(), b"bc".to_vec()]).encoded(true);
/// let sources: Vec<Arc<dyn Source<Vec<u8>>>> = vec![Arc::new(source)];
/// ```
pub struct IterSource<T> {
    items: Arc<[T]>,
    encoded: bool,
}

impl<T> IterSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
            encoded: false,
        }
    }

    /// Marks the values as raw encoded bytes for byte accounting.
    pub fn encoded(mut self, encoded: bool) -> Self {
        self.encoded = encoded;
        self
    }
}

impl<T> Source<T> for IterSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open_reader(&self) -> Result<Box<dyn SourceReader<T>>> {
        Ok(Box::new(IterSourceReader {
            items: self.items.clone(),
            position: 0,
            encoded: self.encoded,
            observers: ObserverList::new(),
        }))
    }
}

struct IterSourceReader<T> {
    items: Arc<[T]>,
    position: usize,
    encoded: bool,
    observers: ObserverList<T>,
}

impl<T> SourceReader<T> for IterSourceReader<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn register_observer(&mut self, observer: Arc<dyn ReadObserver<T>>) {
        self.observers.register(observer);
    }

    fn read_next(&mut self) -> Result<Option<ReadItem<T>>> {
        let Some(item) = self.items.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        self.observers.notify(item, self.encoded);
        Ok(Some(ReadItem::Value(item.clone())))
    }
}

/// In-memory source whose values already carry window metadata.
pub struct WindowedIterSource<T> {
    items: Arc<[WindowedValue<T>]>,
}

impl<T> WindowedIterSource<T> {
    pub fn new(items: Vec<WindowedValue<T>>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl<T> Source<T> for WindowedIterSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open_reader(&self) -> Result<Box<dyn SourceReader<T>>> {
        Ok(Box::new(WindowedIterSourceReader {
            items: self.items.clone(),
            position: 0,
            observers: ObserverList::new(),
        }))
    }
}

struct WindowedIterSourceReader<T> {
    items: Arc<[WindowedValue<T>]>,
    position: usize,
    observers: ObserverList<T>,
}

impl<T> SourceReader<T> for WindowedIterSourceReader<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn returns_windowed_values(&self) -> bool {
        true
    }

    fn register_observer(&mut self, observer: Arc<dyn ReadObserver<T>>) {
        self.observers.register(observer);
    }

    fn read_next(&mut self) -> Result<Option<ReadItem<T>>> {
        let Some(item) = self.items.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        self.observers.notify(&item.value, false);
        Ok(Some(ReadItem::Windowed(item.clone())))
    }
}

/// Source backed by a routine producing a fresh fallible iterator per reader.
///
/// Useful for sources that are computed rather than stored, and for sources
/// that fail part-way through.
pub struct GeneratorSource<F> {
    generate: F,
    encoded: bool,
}

impl<F> GeneratorSource<F> {
    pub fn new(generate: F) -> Self {
        Self {
            generate,
            encoded: false,
        }
    }

    /// Marks the values as raw encoded bytes for byte accounting.
    pub fn encoded(mut self, encoded: bool) -> Self {
        self.encoded = encoded;
        self
    }
}

impl<T, F, I> Source<T> for GeneratorSource<F>
where
    T: Send + 'static,
    F: Fn() -> I + Send + Sync,
    I: Iterator<Item = Result<T>> + Send + 'static,
{
    fn open_reader(&self) -> Result<Box<dyn SourceReader<T>>> {
        Ok(Box::new(GeneratorReader {
            items: (self.generate)(),
            encoded: self.encoded,
            observers: ObserverList::new(),
        }))
    }
}

struct GeneratorReader<T, I> {
    items: I,
    encoded: bool,
    observers: ObserverList<T>,
}

impl<T, I> SourceReader<T> for GeneratorReader<T, I>
where
    T: Send + 'static,
    I: Iterator<Item = Result<T>> + Send,
{
    fn register_observer(&mut self, observer: Arc<dyn ReadObserver<T>>) {
        self.observers.register(observer);
    }

    fn read_next(&mut self) -> Result<Option<ReadItem<T>>> {
        match self.items.next() {
            Some(Ok(item)) => {
                self.observers.notify(&item, self.encoded);
                Ok(Some(ReadItem::Value(item)))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
