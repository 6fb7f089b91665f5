use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{is_retryable, ByteSource, READ_CHUNK_SIZE};

/// Reads from a character device, FIFO or plain file.
///
/// The path is opened read-only and non-blocking, without making a tty our
/// controlling terminal. `receive` waits on `poll(2)` for at most `max_wait`.
/// Line settings (baud rate, parity) are left as the system configured them.
///
/// `O_NONBLOCK` lives on the open file description, which `/dev/stdin` may
/// share with the invoking shell. Dropping the source clears it again.
#[derive(Debug)]
pub struct DeviceSource {
    file: File,
    path: PathBuf,
}

impl DeviceSource {
    /// Open the device at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        info!(?path, "opened byte source device");
        Ok(Self { file, path })
    }

    /// The path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Put the descriptor back into blocking mode.
    pub fn restore_blocking(&self) -> std::io::Result<()> {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is owned by `self.file` and open for the duration of both calls.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if flags & libc::O_NONBLOCK == 0 {
            return Ok(());
        }
        // SAFETY: as above; only the O_NONBLOCK bit changes.
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    /// Wait until the descriptor is readable. Returns `false` on timeout.
    fn wait_readable(&self, max_wait: Duration) -> Result<bool> {
        let timeout_ms = max_wait.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid, initialised pollfd and we pass a count of 1.
        // The descriptor stays open for the lifetime of `self.file`.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if is_retryable(err.kind()) {
                return Ok(false);
            }
            return Err(TransportError::Io(err));
        }

        Ok(rc > 0)
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        if let Err(err) = self.restore_blocking() {
            warn!(path = ?self.path, error = %err, "could not clear O_NONBLOCK");
        }
    }
}

impl ByteSource for DeviceSource {
    fn receive(&mut self, max_wait: Duration) -> Result<Bytes> {
        if !self.wait_readable(max_wait)? {
            return Ok(Bytes::new());
        }

        let mut chunk = BytesMut::zeroed(READ_CHUNK_SIZE);
        match self.file.read(&mut chunk[..]) {
            Ok(0) => {
                debug!(path = ?self.path, "device reached end of stream");
                Err(TransportError::Closed)
            }
            Ok(n) => {
                chunk.truncate(n);
                Ok(chunk.freeze())
            }
            Err(err) if is_retryable(err.kind()) => Ok(Bytes::new()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn source_name(&self) -> &'static str {
        "device"
    }
}
