use std::io::{self, ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, required_buffer_size, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Encodes payloads in the camera wire format and writes them out.
///
/// This is the sending half the firmware implements. It lets a host replay
/// captured images into a FIFO, a pseudo-terminal or a capture file.
pub struct FrameWriter<W> {
    out: W,
    config: FrameConfig,
    scratch: BytesMut,
    frames_written: u64,
    bytes_written: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(out: W) -> Self {
        Self::from_parts(out, FrameConfig::default())
    }

    /// Use the given delimiter and bound; the bound must match the reader's.
    pub fn with_config(out: W, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(out, config))
    }

    fn from_parts(out: W, config: FrameConfig) -> Self {
        Self {
            out,
            config,
            scratch: BytesMut::new(),
            frames_written: 0,
            bytes_written: 0,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
        self.send(frame.payload.as_ref())
    }

    /// Encode, write and flush one payload. Returns the bytes put on the wire.
    ///
    /// Payloads a reader with the same configuration could never hold are
    /// rejected with [`FrameError::BufferOverflow`] before anything is written.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize> {
        let required = required_buffer_size(payload.len(), &self.config.delimiter);
        if required > self.config.max_buffer_size {
            return Err(FrameError::BufferOverflow {
                required,
                max: self.config.max_buffer_size,
            });
        }

        self.scratch.clear();
        encode_frame(payload, &self.config.delimiter, &mut self.scratch);
        write_retrying(&mut self.out, &self.scratch)?;
        flush_retrying(&mut self.out)?;

        let written = self.scratch.len();
        self.frames_written += 1;
        self.bytes_written += written as u64;
        trace!(
            frame = self.frames_written,
            payload = payload.len(),
            written,
            "frame written"
        );
        Ok(written)
    }

    pub fn flush(&mut self) -> Result<()> {
        flush_retrying(&mut self.out)
    }

    /// Frames successfully written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Wire bytes successfully written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// `write_all` that also rides out `WouldBlock` on non-blocking ttys and FIFOs.
fn write_retrying<W: Write>(out: &mut W, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        match out.write(data) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => data = &data[n..],
            Err(err) if is_retry(&err) => std::thread::yield_now(),
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

fn flush_retrying<W: Write>(out: &mut W) -> Result<()> {
    loop {
        match out.flush() {
            Ok(()) => return Ok(()),
            Err(err) if is_retry(&err) => std::thread::yield_now(),
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

fn is_retry(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}
