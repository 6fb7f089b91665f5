use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::traits::{ByteSource, READ_CHUNK_SIZE};

#[derive(Debug)]
enum Step {
    Data(Bytes),
    Idle,
    Error(ErrorKind),
}

/// A scripted byte source.
///
/// Replays chunks, idle polls and injected read errors in order, then reports
/// [`TransportError::Closed`] (or idles forever if built with
/// [`keep_open`](Self::keep_open)). Chunks longer than [`READ_CHUNK_SIZE`] are
/// handed out over several receives.
#[derive(Debug, Default)]
pub struct MemorySource {
    steps: VecDeque<Step>,
    keep_open: bool,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that yields each chunk from one `receive`.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let mut source = Self::new();
        for chunk in chunks {
            source = source.chunk(chunk);
        }
        source
    }

    /// Create a source that yields `data` one byte per `receive`.
    pub fn byte_by_byte(data: &[u8]) -> Self {
        Self::from_chunks(data.iter().map(|b| vec![*b]))
    }

    /// Append a data chunk.
    pub fn chunk(mut self, data: impl Into<Bytes>) -> Self {
        self.steps.push_back(Step::Data(data.into()));
        self
    }

    /// Append a receive that returns nothing.
    pub fn idle(mut self) -> Self {
        self.steps.push_back(Step::Idle);
        self
    }

    /// Append a receive that fails with an I/O error of `kind`.
    pub fn error(mut self, kind: ErrorKind) -> Self {
        self.steps.push_back(Step::Error(kind));
        self
    }

    /// Idle instead of closing once the script runs out.
    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }

    /// Whether every scripted step has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ByteSource for MemorySource {
    fn receive(&mut self, _max_wait: Duration) -> Result<Bytes> {
        match self.steps.pop_front() {
            Some(Step::Data(mut data)) => {
                if data.len() > READ_CHUNK_SIZE {
                    let rest = data.split_off(READ_CHUNK_SIZE);
                    self.steps.push_front(Step::Data(rest));
                }
                Ok(data)
            }
            Some(Step::Idle) => Ok(Bytes::new()),
            Some(Step::Error(kind)) => Err(TransportError::Io(std::io::Error::new(
                kind,
                "injected read failure",
            ))),
            None if self.keep_open => Ok(Bytes::new()),
            None => Err(TransportError::Closed),
        }
    }

    fn source_name(&self) -> &'static str {
        "memory"
    }
}
