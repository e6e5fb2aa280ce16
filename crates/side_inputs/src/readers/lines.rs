use crate::source::{ObserverList, ReadItem, ReadObserver, Source, SourceReader};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

/// Reads a text file line by line as raw bytes. Skips blank lines.
///
/// Lines are reported to observers as encoded bytes, so every line counts
/// toward the bytes-read metric. Line terminators are stripped.
///
/// # Example
/// ```ignore
/// let sources: Vec<Arc<dyn Source<Vec<u8>>>> = paths
///     .iter()
///     .map(|p| Arc::new(LineFileSource::new(p)) as Arc<dyn Source<Vec<u8>>>)
///     .collect();
/// ```
pub struct LineFileSource {
    path: PathBuf,
}

impl LineFileSource {
    /// Creates a new line source
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Source<Vec<u8>> for LineFileSource {
    fn open_reader(&self) -> Result<Box<dyn SourceReader<Vec<u8>>>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open side input file: {}", self.path.display()))?;

        Ok(Box::new(LineFileReader {
            path: self.path.clone(),
            reader: Some(BufReader::new(file)),
            line_num: 0,
            observers: ObserverList::new(),
        }))
    }
}

struct LineFileReader {
    path: PathBuf,
    // `None` once closed
    reader: Option<BufReader<File>>,
    line_num: usize,
    observers: ObserverList<Vec<u8>>,
}

impl SourceReader<Vec<u8>> for LineFileReader {
    fn register_observer(&mut self, observer: Arc<dyn ReadObserver<Vec<u8>>>) {
        self.observers.register(observer);
    }

    fn read_next(&mut self) -> Result<Option<ReadItem<Vec<u8>>>> {
        let Some(reader) = self.reader.as_mut() else {
            anyhow::bail!("Side input file {} read after close", self.path.display());
        };

        loop {
            let mut line = Vec::new();
            self.line_num += 1;
            let read = reader.read_until(b'\n', &mut line).with_context(|| {
                format!(
                    "Error reading line {} of {}",
                    self.line_num,
                    self.path.display()
                )
            })?;
            if read == 0 {
                return Ok(None);
            }

            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue; // Skip blank lines
            }

            self.observers.notify(&line, true);
            return Ok(Some(ReadItem::Value(line)));
        }
    }

    fn close(&mut self) -> Result<()> {
        self.reader.take();
        Ok(())
    }
}
