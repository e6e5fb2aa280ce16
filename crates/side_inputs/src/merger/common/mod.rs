//! src/merger/common/mod.rs
//!
//! Utilities shared by the reader threads and the prefetching iterator.

pub mod thread;
