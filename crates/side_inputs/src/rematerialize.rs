//! src/rematerialize.rs
//!
//! Iterables that rebuild their contents on every traversal.
//!
//! A side input too large to hold in memory cannot be cached, yet a processing
//! step may iterate it many times. `RematerializingIterable` stores only the
//! routine that produces the elements and calls it again for every pass, so a
//! traversal holds one element at a time plus whatever state the routine keeps.
//!
//! Nothing is cached between passes: if the data behind the routine changes,
//! later passes see the new data.

use std::fmt;

/// Reusable iterable over the output of a production routine.
///
/// # Example
/// ```ignore
/// let merger = get_merged_iterator(sources, 4, None)?;
/// let side_input = make_rematerializing_iterable(move || {
///     merger.iter().expect("reader threads").map(|wv| wv.map(|wv| wv.value))
/// });
///
/// for _ in 0..3 {
///     for value in &side_input { /* each pass re-reads the sources */ }
/// }
/// ```
pub struct RematerializingIterable<F> {
    produce: F,
}

impl<F, I> RematerializingIterable<F>
where
    F: Fn() -> I,
    I: IntoIterator,
{
    pub fn new(produce: F) -> Self {
        Self { produce }
    }

    /// Starts an independent traversal by invoking the routine afresh.
    pub fn iter(&self) -> I::IntoIter {
        (self.produce)().into_iter()
    }
}

impl<'a, F, I> IntoIterator for &'a RematerializingIterable<F>
where
    F: Fn() -> I,
    I: IntoIterator,
{
    type Item = I::Item;
    type IntoIter = I::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<F> fmt::Debug for RematerializingIterable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RematerializingIterable").finish_non_exhaustive()
    }
}

/// Wraps `produce` in an iterable that calls it once per traversal.
pub fn make_rematerializing_iterable<F, I>(produce: F) -> RematerializingIterable<F>
where
    F: Fn() -> I,
    I: IntoIterator,
{
    RematerializingIterable::new(produce)
}
