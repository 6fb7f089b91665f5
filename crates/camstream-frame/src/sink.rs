//! Where reassembled frames go.

use crate::codec::Frame;

/// Errors a frame sink can report.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The payload is length-correct but not a usable image.
    ///
    /// Does not end a session; the frame is counted and skipped.
    #[error("could not decode frame: {0}")]
    Decode(String),

    /// The sink itself failed (disk full, closed pipe). Ends the session.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives every frame a session extracts, in arrival order.
pub trait FrameSink {
    fn deliver(&mut self, frame: &Frame) -> Result<(), SinkError>;
}

impl<K: FrameSink + ?Sized> FrameSink for &mut K {
    fn deliver(&mut self, frame: &Frame) -> Result<(), SinkError> {
        (**self).deliver(frame)
    }
}

impl<K: FrameSink + ?Sized> FrameSink for Box<K> {
    fn deliver(&mut self, frame: &Frame) -> Result<(), SinkError> {
        (**self).deliver(frame)
    }
}

/// Collects frames in memory.
impl FrameSink for Vec<Frame> {
    fn deliver(&mut self, frame: &Frame) -> Result<(), SinkError> {
        self.push(frame.clone());
        Ok(())
    }
}

/// Adapts a closure into a [`FrameSink`].
pub struct FnSink<F>(pub F);

impl<F> FrameSink for FnSink<F>
where
    F: FnMut(&Frame) -> Result<(), SinkError>,
{
    fn deliver(&mut self, frame: &Frame) -> Result<(), SinkError> {
        (self.0)(frame)
    }
}
