//! Frame reassembly for serial camera streams.
//!
//! This is the core of camstream. The camera writes every image as:
//! - a delimiter line (`\n12345678900STREAM00987654321\n` by default)
//! - a text header carrying `Content-Length: <n>`
//! - a second delimiter, then exactly `n` payload bytes, then a delimiter
//!
//! Bytes arrive in arbitrary chunks with arbitrary gaps. The [`Reassembler`]
//! accumulates them in a bounded buffer, resynchronizes on garbage and hands
//! back complete payloads. No partial frames, no buffer management in user code.

pub mod codec;
pub mod delimiter;
pub mod error;
#[cfg(feature = "async")]
pub mod framed;
pub mod reader;
pub mod reassembler;
pub mod session;
pub mod sink;
pub mod writer;

pub use codec::{
    encode_frame, parse_content_length, required_buffer_size, Frame, FrameConfig,
    DEFAULT_CONTENT_TYPE, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_READ_TIMEOUT,
};
pub use delimiter::{Delimiter, DEFAULT_DELIMITER};
pub use error::{FrameError, Result};
#[cfg(feature = "async")]
pub use framed::FrameCodec;
pub use reader::FrameReader;
pub use reassembler::{FrameScanner, Reassembler, ReassemblerStats};
pub use session::{OverflowPolicy, Session, SessionConfig, SessionEnd, SessionReport};
pub use sink::{FnSink, FrameSink, SinkError};
pub use writer::FrameWriter;
