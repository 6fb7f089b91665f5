use std::sync::LazyLock;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use regex::bytes::Regex;

use crate::delimiter::Delimiter;
use crate::error::{FrameError, Result};

/// Default accumulator bound: 128 KiB.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 8192 * 16;

/// Default wait handed to the byte source on each receive.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Content type the camera firmware advertises. Never interpreted on read.
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

static CONTENT_LENGTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Content-Length: ([0-9]+)").expect("valid Content-Length pattern"));

/// A complete image payload cut out of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 1-based position of this frame in the session.
    pub sequence: u64,
    /// Exactly `Content-Length` bytes; opaque to the framing layer.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(sequence: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Extract the declared payload length from a header unit.
///
/// Returns `None` when the header carries no `Content-Length: <digits>` or the
/// digits do not fit in `usize`.
pub fn parse_content_length(header: &[u8]) -> Option<usize> {
    let captures = CONTENT_LENGTH_RE.captures(header)?;
    let digits = captures.get(1)?.as_bytes();
    // The pattern only admits ASCII digits.
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn header_text(payload_len: usize) -> String {
    format!("Content-Type: {DEFAULT_CONTENT_TYPE}\r\nContent-Length: {payload_len}\r\n\r\n")
}

/// Buffer length the receiver needs to hold this frame (up to the payload end).
pub fn required_buffer_size(payload_len: usize, delimiter: &Delimiter) -> usize {
    2 * delimiter.len() + header_text(payload_len).len() + payload_len
}

/// Encode a payload into the camera wire format.
///
/// Wire format:
/// ```text
/// ┌───────┬──────────────────────────────────┬───────┬──────────────┬───────┐
/// │ DELIM │ Content-Type: image/jpeg\r\n     │ DELIM │ Payload      │ DELIM │
/// │       │ Content-Length: N\r\n\r\n        │       │ (N bytes)    │       │
/// └───────┴──────────────────────────────────┴───────┴──────────────┴───────┘
/// ```
pub fn encode_frame(payload: &[u8], delimiter: &Delimiter, dst: &mut BytesMut) {
    let header = header_text(payload.len());
    let delim = delimiter.as_bytes();

    dst.reserve(3 * delim.len() + header.len() + payload.len());
    dst.put_slice(delim);
    dst.put_slice(header.as_bytes());
    dst.put_slice(delim);
    dst.put_slice(payload);
    dst.put_slice(delim);
}

/// Configuration for frame reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Accumulator bound in bytes. Default: 128 KiB.
    pub max_buffer_size: usize,
    /// Frame boundary marker. Default: the camera firmware token.
    pub delimiter: Delimiter,
    /// Longest wait for a single receive from the byte source.
    pub read_timeout: Duration,
}

impl FrameConfig {
    /// Check that frames can be reassembled with these settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_buffer_size <= self.delimiter.len() {
            return Err(FrameError::InvalidConfig(format!(
                "max buffer size ({}) must be larger than the delimiter ({} bytes)",
                self.max_buffer_size,
                self.delimiter.len()
            )));
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            delimiter: Delimiter::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}
