use std::io::Read;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{is_retryable, ByteSource, READ_CHUNK_SIZE};

/// Shortest read timeout handed to the socket; zero would mean "block forever".
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Reads a camera stream relayed over a Unix domain socket.
///
/// Useful when another process owns the serial port and forwards its bytes.
/// `max_wait` is applied as the socket read timeout before each read.
#[derive(Debug)]
pub struct SocketSource {
    stream: UnixStream,
    path: Option<PathBuf>,
    applied_timeout: Option<Duration>,
}

impl SocketSource {
    /// Connect to a listening Unix domain socket.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(Self {
            stream,
            path: Some(path.to_path_buf()),
            applied_timeout: None,
        })
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream,
            path: None,
            applied_timeout: None,
        }
    }

    /// The socket path, if this source was created by [`connect`](Self::connect).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn apply_timeout(&mut self, max_wait: Duration) -> Result<()> {
        let timeout = max_wait.max(MIN_READ_TIMEOUT);
        if self.applied_timeout != Some(timeout) {
            self.stream.set_read_timeout(Some(timeout))?;
            self.applied_timeout = Some(timeout);
        }
        Ok(())
    }
}

impl ByteSource for SocketSource {
    fn receive(&mut self, max_wait: Duration) -> Result<Bytes> {
        self.apply_timeout(max_wait)?;

        let mut chunk = BytesMut::zeroed(READ_CHUNK_SIZE);
        match self.stream.read(&mut chunk[..]) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                chunk.truncate(n);
                Ok(chunk.freeze())
            }
            Err(err) if is_retryable(err.kind()) => Ok(Bytes::new()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn source_name(&self) -> &'static str {
        "unix-socket"
    }
}
