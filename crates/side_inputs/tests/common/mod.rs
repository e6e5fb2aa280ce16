#![allow(dead_code)]

use side_inputs::{ObserverList, ReadCounter, ReadItem, ReadObserver, Source, SourceReader};

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error raised by `FakeSource` readers, distinct from anything the crate raises.
#[derive(Error, Debug, PartialEq)]
#[error("fake source {source_name} failed: {stage}")]
pub struct FakeSourceError {
    pub source_name: String,
    pub stage: &'static str,
}

/// Where a `FakeSource` reader should fail.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FailAt {
    Never,
    Open,
    /// Before reading the item at this position
    Read(usize),
    Close,
}

/// Per-source lifecycle counters, shared with the test.
#[derive(Default)]
pub struct Lifecycle {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub items_read: AtomicUsize,
}

impl Lifecycle {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn items_read(&self) -> usize {
        self.items_read.load(Ordering::SeqCst)
    }
}

/// Scriptable in-memory source.
pub struct FakeSource<T> {
    pub name: String,
    pub items: Vec<T>,
    pub fail_at: FailAt,
    pub encoded: bool,
    pub delay: Option<Duration>,
    pub lifecycle: Arc<Lifecycle>,
}

impl<T> FakeSource<T> {
    pub fn new(name: &str, items: Vec<T>) -> Self {
        Self {
            name: name.to_string(),
            items,
            fail_at: FailAt::Never,
            encoded: false,
            delay: None,
            lifecycle: Arc::new(Lifecycle::default()),
        }
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = fail_at;
        self
    }

    pub fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn error(&self, stage: &'static str) -> anyhow::Error {
        FakeSourceError {
            source_name: self.name.clone(),
            stage,
        }
        .into()
    }
}

impl<T> Source<T> for FakeSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open_reader(&self) -> Result<Box<dyn SourceReader<T>>> {
        if self.fail_at == FailAt::Open {
            return Err(self.error("open"));
        }
        self.lifecycle.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeReader {
            name: self.name.clone(),
            items: self.items.clone().into_iter(),
            position: 0,
            fail_at: self.fail_at,
            encoded: self.encoded,
            delay: self.delay,
            lifecycle: self.lifecycle.clone(),
            observers: ObserverList::new(),
        }))
    }
}

struct FakeReader<T> {
    name: String,
    items: std::vec::IntoIter<T>,
    position: usize,
    fail_at: FailAt,
    encoded: bool,
    delay: Option<Duration>,
    lifecycle: Arc<Lifecycle>,
    observers: ObserverList<T>,
}

impl<T> SourceReader<T> for FakeReader<T>
where
    T: Send + 'static,
{
    fn register_observer(&mut self, observer: Arc<dyn ReadObserver<T>>) {
        self.observers.register(observer);
    }

    fn read_next(&mut self) -> Result<Option<ReadItem<T>>> {
        if self.fail_at == FailAt::Read(self.position) {
            return Err(FakeSourceError {
                source_name: self.name.clone(),
                stage: "read",
            }
            .into());
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let Some(item) = self.items.next() else {
            return Ok(None);
        };
        self.position += 1;
        self.lifecycle.items_read.fetch_add(1, Ordering::SeqCst);
        self.observers.notify(&item, self.encoded);
        Ok(Some(ReadItem::Value(item)))
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == FailAt::Close {
            return Err(FakeSourceError {
                source_name: self.name.clone(),
                stage: "close",
            }
            .into());
        }
        Ok(())
    }
}

/// Counter that records every call it receives.
#[derive(Default)]
pub struct RecordingCounter {
    pub calls: Mutex<Vec<u64>>,
}

impl RecordingCounter {
    pub fn calls(&self) -> Vec<u64> {
        let mut calls = self.calls.lock().clone();
        calls.sort_unstable();
        calls
    }

    pub fn total(&self) -> u64 {
        self.calls.lock().iter().sum()
    }
}

impl ReadCounter for RecordingCounter {
    fn add_bytes_read(&self, n: u64) {
        self.calls.lock().push(n);
    }
}

pub fn as_sources<T, S>(sources: Vec<S>) -> Vec<Arc<dyn Source<T>>>
where
    S: Source<T> + 'static,
{
    sources
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn Source<T>>)
        .collect()
}

/// Routes `tracing` output through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
