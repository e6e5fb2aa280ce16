//! src/merger/config.rs
//!
//! Configuration for side-input source merging.
//!
//! Example:
//! ```ignore
//! let config = MergerConfig::builder()
//!     .max_reader_threads(4)
//!     .element_queue_size(10)
//!     .read_timeout(Duration::from_secs(60))
//!     .build();
//! ```
//!
//! # Memory considerations:
//! At most `effective_threads + element_queue_size` elements are alive at once:
//! one in flight per reader thread plus the queued ones. Elements can be large,
//! so the queue is intentionally smaller than the thread budget.

use crate::error::SideInputError;
use crate::options::RuntimeOptions;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of reader threads per side input.
pub const MAX_SOURCE_READER_THREADS: usize = 15;

/// Number of slots in the element queue between reader threads and the consumer.
pub const ELEMENT_QUEUE_SIZE: usize = 10;

/// Configuration for `SourceMerger`
#[derive(Clone, Debug)]
pub struct MergerConfig {
    /// Upper bound on concurrent reader threads (must be > 0)
    pub max_reader_threads: usize,
    /// Capacity of the bounded element queue (must be > 0)
    pub element_queue_size: usize,
    /// Maximum time the consumer waits for the next element.
    /// `None` waits forever: a hung reader hangs the merge.
    pub read_timeout: Option<Duration>,
    /// Options consulted once per run for experiment flags
    pub runtime_options: Arc<RuntimeOptions>,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            max_reader_threads: MAX_SOURCE_READER_THREADS,
            element_queue_size: ELEMENT_QUEUE_SIZE,
            read_timeout: None,
            runtime_options: RuntimeOptions::global(),
        }
    }
}

impl MergerConfig {
    pub fn builder() -> MergerConfigBuilder {
        MergerConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_reader_threads == 0 {
            return Err(SideInputError::InvalidConfig(
                "max_reader_threads must be > 0. \
                Use 1 for deterministic, source-ordered reads."
                    .to_string(),
            )
            .into());
        }

        if self.element_queue_size == 0 {
            return Err(SideInputError::InvalidConfig(
                "element_queue_size must be > 0 to let reader threads make progress".to_string(),
            )
            .into());
        }

        if self.read_timeout == Some(Duration::ZERO) {
            return Err(SideInputError::InvalidConfig(
                "read_timeout must be non-zero; leave it unset to wait forever".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Number of reader threads actually spawned for `num_sources` sources.
    pub fn effective_reader_threads(&self, num_sources: usize) -> usize {
        self.max_reader_threads.min(num_sources)
    }
}

/// Builder for MergerConfig with method chaining
#[derive(Default)]
pub struct MergerConfigBuilder {
    config: MergerConfig,
}

impl MergerConfigBuilder {
    /// Set the reader thread budget.
    /// A budget of 1 reads sources one after another in list order.
    pub fn max_reader_threads(mut self, threads: usize) -> Self {
        self.config.max_reader_threads = threads;
        self
    }

    /// Set the element queue capacity.
    ///
    /// - Too low: readers stall waiting for the consumer.
    /// - Too high: more large elements held in memory.
    pub fn element_queue_size(mut self, size: usize) -> Self {
        self.config.element_queue_size = size;
        self
    }

    /// Fail the iterator instead of waiting forever on a stuck reader.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Use these options instead of the process-wide ones.
    pub fn runtime_options(mut self, options: Arc<RuntimeOptions>) -> Self {
        self.config.runtime_options = options;
        self
    }

    pub fn build(self) -> MergerConfig {
        self.config
    }
}
