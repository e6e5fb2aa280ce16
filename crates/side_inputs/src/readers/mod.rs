pub mod lines;
pub mod memory;

pub use lines::LineFileSource;
pub use memory::{GeneratorSource, IterSource, WindowedIterSource};
