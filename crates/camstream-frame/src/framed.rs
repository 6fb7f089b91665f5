use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_frame, required_buffer_size, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reassembler::{FrameScanner, ReassemblerStats};

/// `tokio_util` codec for the camera wire format.
///
/// Runs the same scan as [`Reassembler`](crate::Reassembler) over the
/// `FramedRead` buffer. Decoding yields [`Frame`]s; encoding takes raw payloads.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    scanner: FrameScanner,
}

impl FrameCodec {
    pub fn new(config: &FrameConfig) -> Result<Self> {
        Ok(Self {
            scanner: FrameScanner::new(config)?,
        })
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.scanner.stats()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            scanner: FrameScanner::default(),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        self.scanner.enforce_bound(src);
        self.scanner
            .scan(src)
            .inspect_err(|err| self.scanner.record_overflow(err))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if !buf.is_empty() {
            debug!(dropped = buf.len(), "stream ended inside a frame");
            buf.clear();
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        let required = required_buffer_size(payload.len(), self.scanner.delimiter());
        if required > self.scanner.max_buffer_size() {
            return Err(FrameError::BufferOverflow {
                required,
                max: self.scanner.max_buffer_size(),
            });
        }
        encode_frame(&payload, self.scanner.delimiter(), dst);
        Ok(())
    }
}
