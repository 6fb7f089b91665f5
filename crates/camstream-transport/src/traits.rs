use std::io::ErrorKind;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// Upper bound on the bytes returned by a single `receive`.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Something that yields stream bytes as they arrive.
///
/// `receive` waits at most `max_wait` and returns whatever arrived, possibly
/// nothing. It never blocks indefinitely. Transient failures are returned as
/// [`TransportError::Io`](crate::TransportError::Io) without poisoning the
/// source; retry policy belongs to the caller.
pub trait ByteSource {
    /// Receive up to [`READ_CHUNK_SIZE`] bytes, waiting at most `max_wait`.
    fn receive(&mut self, max_wait: Duration) -> Result<Bytes>;

    /// Short name for logs and diagnostics.
    fn source_name(&self) -> &'static str {
        "byte-source"
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn receive(&mut self, max_wait: Duration) -> Result<Bytes> {
        (**self).receive(max_wait)
    }

    fn source_name(&self) -> &'static str {
        (**self).source_name()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn receive(&mut self, max_wait: Duration) -> Result<Bytes> {
        (**self).receive(max_wait)
    }

    fn source_name(&self) -> &'static str {
        (**self).source_name()
    }
}

/// Read errors that only mean "nothing right now".
pub(crate) fn is_retryable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}
