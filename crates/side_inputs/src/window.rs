//! src/window.rs
//!
//! Minimal windowing vocabulary needed to tag side-input elements.
//!
//! The engine's full windowing model lives elsewhere; the side-input core only
//! needs to carry window/timestamp metadata through unchanged, or attach the
//! default global window to bare values.

/// Event time in microseconds since the epoch.
pub type Timestamp = i64;

/// Smallest representable event time, used for values in the global window.
pub const MIN_TIMESTAMP: Timestamp = i64::MIN;

/// A window an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    /// The single window spanning all of event time
    Global,
    /// Half-open interval `[start, end)` of event time
    Interval { start: Timestamp, end: Timestamp },
}

/// Where an element sits among the firings of its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PaneInfo {
    /// Not produced by a trigger firing
    #[default]
    NoFiring,
    /// The `index`-th firing of the window
    Firing { index: u64, is_last: bool },
}

/// A value paired with its window and timestamp metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedValue<T> {
    pub value: T,
    pub timestamp: Timestamp,
    pub windows: Vec<Window>,
    pub pane: PaneInfo,
}

impl<T> WindowedValue<T> {
    pub fn new(value: T, timestamp: Timestamp, windows: Vec<Window>) -> Self {
        Self {
            value,
            timestamp,
            windows,
            pane: PaneInfo::NoFiring,
        }
    }

    /// Wraps a bare value in the global window at the minimum timestamp.
    pub fn in_global_window(value: T) -> Self {
        Self::new(value, MIN_TIMESTAMP, vec![Window::Global])
    }

    pub fn with_pane(mut self, pane: PaneInfo) -> Self {
        self.pane = pane;
        self
    }

    pub fn is_global(&self) -> bool {
        self.windows == [Window::Global]
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
