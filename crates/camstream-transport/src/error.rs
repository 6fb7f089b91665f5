use std::path::PathBuf;

/// Errors that can occur while pulling bytes from a source.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device or file at the specified path.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified socket.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A read failed. The source stays usable; the caller decides whether to retry.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end hung up or the input reached end of file.
    #[error("byte source closed")]
    Closed,
}

impl TransportError {
    /// Whether another `receive` on the same source may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
