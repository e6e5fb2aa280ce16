pub mod error;
pub mod merger;
pub mod metrics;
pub mod options;
pub mod readers;
pub mod rematerialize;
pub mod source;
pub mod window;

pub use error::SideInputError;
pub use merger::{
    current_reader_id, get_merged_iterator, MergerConfig, MergerConfigBuilder,
    PrefetchingIterator, SourceMerger, ELEMENT_QUEUE_SIZE, MAX_SOURCE_READER_THREADS,
};
pub use metrics::{BytesReadCounter, BytesReadObserver, ReadCounter};
pub use options::{RuntimeOptions, EXPERIMENTS_OPTION, SIDEINPUT_IO_METRICS_EXPERIMENT};
pub use rematerialize::{make_rematerializing_iterable, RematerializingIterable};
pub use source::{ByteSize, ObserverList, ReadItem, ReadObserver, Source, SourceReader};
pub use window::{PaneInfo, Window, WindowedValue};
