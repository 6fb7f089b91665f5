use std::fs;
use std::path::{Path, PathBuf};

use camstream_frame::{Frame, FrameSink, SinkError};
use tracing::debug;

use crate::output::{print_frame, OutputFormat};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Check that a payload is framed like a JPEG image (SOI ... EOI).
pub fn check_jpeg(payload: &[u8]) -> Result<(), String> {
    if !payload.starts_with(&JPEG_SOI) {
        return Err("missing JPEG start-of-image marker".to_string());
    }
    if !payload.ends_with(&JPEG_EOI) {
        return Err("missing JPEG end-of-image marker".to_string());
    }
    Ok(())
}

/// File name used when saving a frame.
pub fn frame_file_name(sequence: u64) -> String {
    format!("frame-{sequence:06}.jpg")
}

/// Sink behind `camstream view`: optional check, optional save, then print.
pub struct ViewSink {
    format: OutputFormat,
    validate_jpeg: bool,
    save_dir: Option<PathBuf>,
}

impl ViewSink {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            validate_jpeg: false,
            save_dir: None,
        }
    }

    pub fn validate_jpeg(mut self, enabled: bool) -> Self {
        self.validate_jpeg = enabled;
        self
    }

    pub fn save_to(mut self, dir: Option<PathBuf>) -> Self {
        self.save_dir = dir;
        self
    }

    fn save(&self, dir: &Path, frame: &Frame) -> Result<PathBuf, SinkError> {
        let path = dir.join(frame_file_name(frame.sequence));
        fs::write(&path, &frame.payload)?;
        debug!(path = %path.display(), size = frame.len(), "frame saved");
        Ok(path)
    }
}

impl FrameSink for ViewSink {
    fn deliver(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if self.validate_jpeg {
            check_jpeg(frame.payload.as_ref()).map_err(SinkError::Decode)?;
        }

        let saved = match &self.save_dir {
            Some(dir) => Some(self.save(dir, frame)?),
            None => None,
        };

        print_frame(frame, saved.as_deref(), self.format)?;
        Ok(())
    }
}
