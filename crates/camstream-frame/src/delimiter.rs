//! Frame boundary marker.

use std::fmt;

use memchr::memmem::Finder;

use crate::error::{FrameError, Result};

/// Delimiter written by the camera firmware: newline, 28-char token, newline.
pub const DEFAULT_DELIMITER: &[u8] = b"\n12345678900STREAM00987654321\n";

/// A fixed byte sequence separating headers and payloads.
///
/// Holds a prebuilt substring searcher; the delimiter never changes during a
/// session and is never empty.
#[derive(Clone)]
pub struct Delimiter {
    finder: Finder<'static>,
}

impl Delimiter {
    /// Build a delimiter from raw bytes. Empty input is rejected.
    pub fn new(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Err(FrameError::InvalidConfig(
                "delimiter must not be empty".to_string(),
            ));
        }
        Ok(Self {
            finder: Finder::new(bytes).into_owned(),
        })
    }

    /// The delimiter bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.finder.needle()
    }

    /// Length of the delimiter in bytes.
    pub fn len(&self) -> usize {
        self.finder.needle().len()
    }

    /// Always `false`; kept for parity with `len`.
    pub fn is_empty(&self) -> bool {
        self.finder.needle().is_empty()
    }

    /// Position of the first occurrence at or after `from`.
    pub fn find(&self, haystack: &[u8], from: usize) -> Option<usize> {
        let tail = haystack.get(from..)?;
        self.finder.find(tail).map(|pos| pos + from)
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self {
            finder: Finder::new(DEFAULT_DELIMITER).into_owned(),
        }
    }
}

impl PartialEq for Delimiter {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Delimiter {}

impl fmt::Debug for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Delimiter")
            .field(&self.as_bytes().escape_ascii().to_string())
            .finish()
    }
}
