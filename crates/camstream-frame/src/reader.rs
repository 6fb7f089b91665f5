use camstream_transport::{ByteSource, TransportError};

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reassembler::Reassembler;

/// Reads complete frames from any [`ByteSource`].
///
/// Handles partial and delayed arrivals internally. Callers always get
/// complete, length-correct payloads.
pub struct FrameReader<S> {
    source: S,
    reassembler: Reassembler,
    config: FrameConfig,
}

impl<S: ByteSource> FrameReader<S> {
    /// Create a new frame reader with default configuration.
    pub fn new(source: S) -> Self {
        Self {
            source,
            reassembler: Reassembler::default(),
            config: FrameConfig::default(),
        }
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(source: S, config: FrameConfig) -> Result<Self> {
        let reassembler = Reassembler::new(&config)?;
        Ok(Self {
            source,
            reassembler,
            config,
        })
    }

    /// Read the next complete frame.
    ///
    /// Frames already buffered are returned without touching the source.
    /// Returns `Err(FrameError::Timeout)` when a receive yields nothing within
    /// `read_timeout`, and `Err(FrameError::ConnectionClosed)` once the source
    /// is exhausted. Both leave the reader usable.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.reassembler.next_frame()? {
                return Ok(frame);
            }

            let chunk = self
                .source
                .receive(self.config.read_timeout)
                .map_err(transport_to_frame_error)?;
            if chunk.is_empty() {
                return Err(FrameError::Timeout(self.config.read_timeout));
            }

            self.reassembler.push(&chunk);
        }
    }

    /// Run one receive and one extraction pass.
    ///
    /// Returns every frame completed by the bytes that arrived (possibly none).
    pub fn poll_frames(&mut self) -> Result<Vec<Frame>> {
        let chunk = self
            .source
            .receive(self.config.read_timeout)
            .map_err(transport_to_frame_error)?;
        if !chunk.is_empty() {
            self.reassembler.push(&chunk);
        }
        self.reassembler.extract_frames()
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &S {
        &self.source
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// The accumulator and its counters.
    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    /// Mutable access to the accumulator, e.g. to clear it after an overflow.
    pub fn reassembler_mut(&mut self) -> &mut Reassembler {
        &mut self.reassembler
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Map a byte source failure onto the frame error space.
pub fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Closed => FrameError::ConnectionClosed,
        TransportError::Io(io) => FrameError::Io(io),
        TransportError::Open { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
    }
}
