//! Reader thread lifecycle and failure tests for the side-input source merger.
//!
//! Tests cover:
//! - Reader failures (open, read, close, panic) surfacing to the consumer
//! - Failure while other readers are still producing
//! - Reader cleanup (close exactly once, early drop, timeouts, abandoned readers)
//! - Configuration validation

mod common;
use common::{as_sources, init_tracing, FailAt, FakeSource, FakeSourceError};
use side_inputs::{
    current_reader_id, get_merged_iterator, readers::GeneratorSource, MergerConfig,
    RuntimeOptions, SideInputError, Source, SourceMerger, MAX_SOURCE_READER_THREADS,
};

use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug)]
#[error("I am an exception!")]
struct MyError;

/// Yields 0, then fails after `pause`.
fn failing_source(pause: Duration) -> Arc<dyn Source<u32>> {
    Arc::new(GeneratorSource::new(move || {
        (0..2).map(move |i| -> Result<u32> {
            if i == 0 {
                return Ok(0);
            }
            thread::sleep(pause);
            Err(MyError.into())
        })
    }))
}

/// Yields `value` forever, pausing between elements.
fn perpetual_source(value: u32, pause: Duration) -> Arc<dyn Source<u32>> {
    Arc::new(GeneratorSource::new(move || {
        (0u64..).map(move |i| {
            if i > 0 {
                thread::sleep(pause);
            }
            anyhow::Ok(value)
        })
    }))
}

fn default_threads_merger(sources: Vec<Arc<dyn Source<u32>>>) -> Result<SourceMerger<u32>> {
    get_merged_iterator(sources, MAX_SOURCE_READER_THREADS, None)
}

// ============================================================================
// 1. Failure Propagation
// ============================================================================

#[test]
fn test_single_source_exception() -> Result<()> {
    init_tracing();
    let merger = default_threads_merger(vec![failing_source(Duration::ZERO)])?;

    let mut seen = HashSet::new();
    let mut error = None;
    for value in merger.iter()? {
        match value {
            Ok(wv) => {
                seen.insert(wv.value);
            }
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    let error = error.expect("iteration ended without the reader error");
    assert!(error.downcast_ref::<MyError>().is_some(), "got {:#}", error);
    assert_eq!(seen, HashSet::from([0]));
    Ok(())
}

#[test]
fn test_exception_while_other_readers_produce() -> Result<()> {
    let pause = Duration::from_millis(100);
    let sources = vec![
        perpetual_source(1, pause),
        perpetual_source(2, pause),
        perpetual_source(3, pause),
        perpetual_source(4, pause),
        failing_source(pause),
    ];
    let merger = default_threads_merger(sources)?;
    assert_eq!(merger.reader_threads(), 5);

    let mut iter = merger.iter()?;
    let mut seen = HashSet::new();
    let error = loop {
        match iter.next() {
            Some(Ok(wv)) => {
                seen.insert(wv.value);
            }
            Some(Err(e)) => break e,
            None => panic!("perpetual sources ended without an error"),
        }
    };

    assert!(error.downcast_ref::<MyError>().is_some(), "got {:#}", error);
    assert!(seen.contains(&0));
    assert!(seen.is_subset(&(0..5).collect()));

    // Exhausted after the error; dropping stops the perpetual readers
    assert!(iter.next().is_none());
    let start = Instant::now();
    drop(iter);
    assert!(start.elapsed() < Duration::from_millis(500));
    Ok(())
}

#[test]
fn test_open_failure_surfaces() -> Result<()> {
    let sources = as_sources(vec![
        FakeSource::new("good", vec![1u32, 2]),
        FakeSource::new("broken", vec![3u32]).failing_at(FailAt::Open),
    ]);
    let merger = get_merged_iterator(sources, 1, None)?;

    let results: Vec<_> = merger.iter()?.collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().map(|wv| wv.value).ok(), Some(1));
    assert_eq!(results[1].as_ref().map(|wv| wv.value).ok(), Some(2));

    let error = results[2].as_ref().unwrap_err();
    assert_eq!(
        error.downcast_ref::<FakeSourceError>().map(|e| e.stage),
        Some("open")
    );
    Ok(())
}

#[test]
fn test_close_failure_after_all_elements() -> Result<()> {
    let source = FakeSource::new("s0", vec![1u32, 2, 3]).failing_at(FailAt::Close);
    let lifecycle = source.lifecycle.clone();
    let merger = get_merged_iterator(as_sources(vec![source]), 1, None)?;

    let mut iter = merger.iter()?;
    let mut values = Vec::new();
    let error = loop {
        match iter.next() {
            Some(Ok(wv)) => values.push(wv.value),
            Some(Err(e)) => break e,
            None => panic!("close failure was swallowed"),
        }
    };

    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(
        error.downcast_ref::<FakeSourceError>().map(|e| e.stage),
        Some("close")
    );
    assert_eq!(lifecycle.closed(), 1);
    Ok(())
}

#[test]
fn test_reader_closed_once_on_read_failure() -> Result<()> {
    let source = FakeSource::new("s0", vec![1u32, 2, 3]).failing_at(FailAt::Read(1));
    let lifecycle = source.lifecycle.clone();
    let merger = get_merged_iterator(as_sources(vec![source]), 1, None)?;

    let results: Vec<_> = merger.iter()?.collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert_eq!(
        results[1].as_ref().unwrap_err().downcast_ref::<FakeSourceError>().map(|e| e.stage),
        Some("read")
    );

    assert_eq!(lifecycle.opened(), 1);
    assert_eq!(lifecycle.closed(), 1);
    Ok(())
}

#[test]
fn test_reader_panic_becomes_error() -> Result<()> {
    let source = GeneratorSource::new(|| {
        (0u32..3).map(|i| {
            if i == 2 {
                panic!("reader blew up");
            }
            anyhow::Ok(i)
        })
    });
    let sources: Vec<Arc<dyn Source<u32>>> = vec![Arc::new(source)];
    let merger = get_merged_iterator(sources, 1, None)?;

    let results: Vec<_> = merger.iter()?.collect();
    assert_eq!(results.len(), 3);

    let error = results[2].as_ref().unwrap_err();
    match error.downcast_ref::<SideInputError>() {
        Some(SideInputError::ReaderPanicked {
            source_index,
            message,
        }) => {
            assert_eq!(*source_index, 0);
            assert!(message.contains("reader blew up"));
        }
        other => panic!("expected ReaderPanicked, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_failure_stops_unclaimed_sources() -> Result<()> {
    let broken = FakeSource::new("broken", vec![0u32]).failing_at(FailAt::Read(0));
    let later: Vec<_> = (0..5)
        .map(|i| FakeSource::new(&format!("later{}", i), vec![i]))
        .collect();
    let later_lifecycles: Vec<_> = later.iter().map(|s| s.lifecycle.clone()).collect();

    let mut sources = vec![broken];
    sources.extend(later);
    let merger = get_merged_iterator(as_sources(sources), 1, None)?;

    let results: Vec<_> = merger.iter()?.collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
    for lifecycle in later_lifecycles {
        assert_eq!(lifecycle.opened(), 0);
    }
    Ok(())
}

// ============================================================================
// 2. Reader Lifecycle
// ============================================================================

#[test]
fn test_early_drop_stops_and_closes_readers() -> Result<()> {
    let sources: Vec<_> = (0..3)
        .map(|s| FakeSource::new(&format!("s{}", s), (0..1000u32).collect()))
        .collect();
    let lifecycles: Vec<_> = sources.iter().map(|s| s.lifecycle.clone()).collect();

    let merger = get_merged_iterator(as_sources(sources), 2, None)?;
    let mut iter = merger.iter()?;
    assert!(iter.next().transpose()?.is_some());
    drop(iter);

    // Drop joins the reader threads, so every opened reader is closed by now
    let mut total_read = 0;
    for lifecycle in &lifecycles {
        assert_eq!(lifecycle.opened(), lifecycle.closed());
        total_read += lifecycle.items_read();
    }
    assert!(
        total_read < 100,
        "readers kept going after drop: {} items read",
        total_read
    );
    Ok(())
}

#[test]
fn test_read_timeout_does_not_wait_for_stuck_reader() -> Result<()> {
    let source = FakeSource::new("stuck", vec![1u32, 2]).with_delay(Duration::from_secs(4));
    let config = MergerConfig::builder()
        .max_reader_threads(1)
        .read_timeout(Duration::from_millis(50))
        .runtime_options(Arc::new(RuntimeOptions::new()))
        .build();
    let merger = SourceMerger::new(as_sources(vec![source]), config)?;

    let start = Instant::now();
    let mut iter = merger.iter()?;
    let error = iter.next().expect("timeout not reported").unwrap_err();
    assert!(matches!(
        error.downcast_ref::<SideInputError>(),
        Some(SideInputError::ReadTimeout(_))
    ));
    assert!(iter.next().is_none());

    drop(iter);
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "consumer waited {:?} for the stuck reader",
        start.elapsed()
    );
    Ok(())
}

#[test]
fn test_failure_does_not_wait_for_in_flight_reads() -> Result<()> {
    let sources = as_sources(vec![
        FakeSource::new("stuck", vec![1u32]).with_delay(Duration::from_secs(4)),
        FakeSource::new("broken", vec![2u32]).failing_at(FailAt::Read(0)),
    ]);
    let merger = get_merged_iterator(sources, 2, None)?;

    let start = Instant::now();
    let results: Vec<_> = merger.iter()?.collect();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].as_ref().unwrap_err().downcast_ref::<FakeSourceError>().map(|e| e.stage),
        Some("read")
    );
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "consumer waited {:?} for the in-flight read",
        start.elapsed()
    );
    Ok(())
}

#[test]
fn test_reader_ids_visible_inside_readers() -> Result<()> {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let sources: Vec<Arc<dyn Source<u32>>> = (0..4u32)
        .map(|value| {
            let ids = ids.clone();
            Arc::new(GeneratorSource::new(move || {
                ids.lock().push(current_reader_id());
                std::iter::once(anyhow::Ok(value))
            })) as Arc<dyn Source<u32>>
        })
        .collect();

    let merger = get_merged_iterator(sources, 2, None)?;
    assert_eq!(merger.iter()?.count(), 4);

    assert_eq!(current_reader_id(), None);
    let ids = ids.lock();
    assert_eq!(ids.len(), 4);
    assert!(ids.iter().all(|id| matches!(id, Some(0) | Some(1))));
    Ok(())
}

// ============================================================================
// 3. Configuration
// ============================================================================

#[test]
fn test_invalid_configs_rejected() {
    let zero_threads = get_merged_iterator::<u32>(vec![], 0, None);
    let zero_queue = SourceMerger::<u32>::new(
        vec![],
        MergerConfig::builder().element_queue_size(0).build(),
    );
    let zero_timeout = SourceMerger::<u32>::new(
        vec![],
        MergerConfig::builder().read_timeout(Duration::ZERO).build(),
    );

    for result in [zero_threads, zero_queue, zero_timeout] {
        let error = result.err().expect("invalid config accepted");
        assert!(matches!(
            error.downcast_ref::<SideInputError>(),
            Some(SideInputError::InvalidConfig(_))
        ));
    }
}
