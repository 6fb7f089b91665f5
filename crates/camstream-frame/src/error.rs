use std::time::Duration;

use crate::sink::SinkError;

/// Errors that can occur while reassembling or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A header declared a payload that can never fit in the buffer.
    ///
    /// `required` is the buffer length the frame would need (`usize::MAX` if
    /// the declared length does not even fit in memory arithmetic).
    #[error("buffer too small for frame (needs {required} bytes, max {max})")]
    BufferOverflow { required: usize, max: usize },

    /// The frame configuration cannot work (empty delimiter, tiny buffer).
    #[error("invalid frame configuration: {0}")]
    InvalidConfig(String),

    /// Nothing arrived within the read timeout.
    #[error("no data received within {0:?}")]
    Timeout(Duration),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source closed; no further frames will arrive.
    #[error("connection closed")]
    ConnectionClosed,

    /// The frame sink failed in a way that ends the session.
    #[error("frame sink failed: {0}")]
    Sink(#[from] SinkError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
