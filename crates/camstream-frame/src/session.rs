//! The outer receive/extract/deliver loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camstream_transport::ByteSource;
use tracing::{debug, info, warn};

use crate::error::{FrameError, Result};
use crate::reader::FrameReader;
use crate::sink::{FrameSink, SinkError};

/// What to do when a header declares a frame larger than the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// End the session with [`FrameError::BufferOverflow`].
    #[default]
    Abort,
    /// Drop the whole accumulator and keep reading.
    Resync,
}

/// Driver policy. Framing itself is configured through `FrameConfig`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub overflow_policy: OverflowPolicy,
    /// Transport errors tolerated in a row before the session fails.
    pub max_consecutive_errors: u32,
    /// Pause after a failed receive.
    pub retry_delay: Duration,
    /// Stop after this many frames reached the sink.
    pub max_frames: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            overflow_policy: OverflowPolicy::Abort,
            max_consecutive_errors: 5,
            retry_delay: Duration::from_millis(100),
            max_frames: None,
        }
    }
}

/// Why a session stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    SourceClosed,
    Cancelled,
    FrameLimit,
}

impl SessionEnd {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEnd::SourceClosed => "source_closed",
            SessionEnd::Cancelled => "cancelled",
            SessionEnd::FrameLimit => "frame_limit",
        }
    }
}

/// Session counters. Also available mid-run and after a failed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Frames handed to the sink, including those it could not decode.
    pub frames: u64,
    pub decode_faults: u64,
    pub transport_errors: u64,
    pub overflows: u64,
    pub resyncs: u64,
    pub bytes_discarded: u64,
    pub end: Option<SessionEnd>,
}

/// Pulls bytes from a source, reassembles frames and feeds a sink.
///
/// Single-threaded and synchronous. All waiting happens inside the byte
/// source, bounded by the configured read timeout, so cancellation is noticed
/// within one timeout.
pub struct Session<S, K> {
    reader: FrameReader<S>,
    sink: K,
    config: SessionConfig,
    report: SessionReport,
}

impl<S: ByteSource, K: FrameSink> Session<S, K> {
    pub fn new(reader: FrameReader<S>, sink: K, config: SessionConfig) -> Self {
        Self {
            reader,
            sink,
            config,
            report: SessionReport::default(),
        }
    }

    /// Run until the source closes, `running` is cleared, the frame limit is
    /// reached, or an unrecoverable error occurs.
    pub fn run(&mut self, running: &AtomicBool) -> Result<SessionReport> {
        info!(
            source = self.reader.get_ref().source_name(),
            max_buffer_size = self.reader.config().max_buffer_size,
            "stream session started"
        );

        let outcome = self.drive(running);
        self.sync_stats();

        match &outcome {
            Ok(end) => {
                self.report.end = Some(*end);
                info!(
                    end = end.as_str(),
                    frames = self.report.frames,
                    decode_faults = self.report.decode_faults,
                    resyncs = self.report.resyncs,
                    "stream session finished"
                );
            }
            Err(err) => {
                warn!(error = %err, frames = self.report.frames, "stream session failed");
            }
        }

        outcome.map(|_| self.report.clone())
    }

    fn drive(&mut self, running: &AtomicBool) -> Result<SessionEnd> {
        let mut consecutive_errors = 0u32;

        loop {
            if !running.load(Ordering::SeqCst) {
                return Ok(SessionEnd::Cancelled);
            }

            let frames = match self.reader.poll_frames() {
                Ok(frames) => {
                    consecutive_errors = 0;
                    frames
                }
                Err(FrameError::ConnectionClosed) => return Ok(SessionEnd::SourceClosed),
                Err(err @ FrameError::BufferOverflow { .. }) => {
                    self.report.overflows += 1;
                    match self.config.overflow_policy {
                        OverflowPolicy::Abort => return Err(err),
                        OverflowPolicy::Resync => {
                            let dropped = self.reader.reassembler_mut().clear();
                            warn!(error = %err, dropped, "discarding buffer after overflow");
                            continue;
                        }
                    }
                }
                Err(FrameError::Io(err)) => {
                    consecutive_errors += 1;
                    self.report.transport_errors += 1;
                    warn!(error = %err, consecutive_errors, "byte source read failed");
                    if consecutive_errors > self.config.max_consecutive_errors {
                        return Err(FrameError::Io(err));
                    }
                    std::thread::sleep(self.config.retry_delay);
                    continue;
                }
                Err(err) => return Err(err),
            };

            for frame in frames {
                self.report.frames += 1;
                match self.sink.deliver(&frame) {
                    Ok(()) => debug!(sequence = frame.sequence, size = frame.len(), "frame delivered"),
                    Err(SinkError::Decode(reason)) => {
                        self.report.decode_faults += 1;
                        warn!(sequence = frame.sequence, %reason, "frame could not be decoded");
                    }
                    Err(err @ SinkError::Io(_)) => return Err(FrameError::Sink(err)),
                }

                if self
                    .config
                    .max_frames
                    .is_some_and(|limit| self.report.frames >= limit)
                {
                    return Ok(SessionEnd::FrameLimit);
                }
            }
        }
    }

    fn sync_stats(&mut self) {
        let stats = self.reader.reassembler().stats();
        self.report.resyncs = stats.resyncs;
        self.report.bytes_discarded = stats.bytes_discarded;
    }

    /// Counters so far; complete after `run` returns, even on error.
    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn reader(&self) -> &FrameReader<S> {
        &self.reader
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn into_parts(self) -> (FrameReader<S>, K) {
        (self.reader, self.sink)
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use bytes::BytesMut;
    use camstream_transport::MemorySource;

    use super::*;
    use crate::codec::{encode_frame, Frame, FrameConfig};
    use crate::delimiter::Delimiter;
    use crate::sink::FnSink;

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let delimiter = Delimiter::default();
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &delimiter, &mut buf);
        }
        buf.to_vec()
    }

    fn quick() -> SessionConfig {
        SessionConfig {
            retry_delay: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    fn session_over(
        source: MemorySource,
        config: SessionConfig,
    ) -> Session<MemorySource, Vec<Frame>> {
        Session::new(FrameReader::new(source), Vec::new(), config)
    }

    #[test]
    fn delivers_all_frames_until_source_closes() {
        let source = MemorySource::byte_by_byte(&wire(&[b"one", b"two", b"three"]));
        let mut session = session_over(source, quick());

        let report = session.run(&AtomicBool::new(true)).unwrap();

        assert_eq!(report.frames, 3);
        assert_eq!(report.end, Some(SessionEnd::SourceClosed));
        let payloads: Vec<&[u8]> = session.sink().iter().map(|f| f.payload.as_ref()).collect();
        assert_eq!(payloads, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
    }

    #[test]
    fn cancelled_before_start() {
        let mut session = session_over(MemorySource::new().keep_open(), quick());
        let report = session.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(report.end, Some(SessionEnd::Cancelled));
        assert_eq!(report.frames, 0);
    }

    #[test]
    fn stops_at_frame_limit() {
        let source = MemorySource::from_chunks([wire(&[b"1", b"2", b"3", b"4"])]).keep_open();
        let config = SessionConfig {
            max_frames: Some(2),
            ..quick()
        };
        let mut session = session_over(source, config);

        let report = session.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(report.frames, 2);
        assert_eq!(report.end, Some(SessionEnd::FrameLimit));
        assert_eq!(session.sink().len(), 2);
    }

    #[test]
    fn transient_errors_are_retried() {
        let bytes = wire(&[b"after-errors"]);
        let source = MemorySource::new()
            .chunk(bytes[..20].to_vec())
            .error(ErrorKind::TimedOut)
            .error(ErrorKind::Other)
            .chunk(bytes[20..].to_vec());
        let mut session = session_over(source, quick());

        let report = session.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(report.transport_errors, 2);
        assert_eq!(report.frames, 1);
    }

    #[test]
    fn persistent_errors_end_session() {
        let mut source = MemorySource::new();
        for _ in 0..4 {
            source = source.error(ErrorKind::BrokenPipe);
        }
        let config = SessionConfig {
            max_consecutive_errors: 2,
            ..quick()
        };
        let mut session = session_over(source, config);

        let err = session.run(&AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
        assert_eq!(session.report().transport_errors, 3);
    }

    fn overflow_then_frame() -> MemorySource {
        let big = wire(&[&[0u8; 600]]);
        let small = wire(&[b"fits"]);
        MemorySource::new()
            .chunk(big[..120].to_vec())
            .chunk(small)
    }

    fn small_buffer() -> FrameConfig {
        FrameConfig {
            max_buffer_size: 512,
            ..FrameConfig::default()
        }
    }

    #[test]
    fn overflow_aborts_by_default() {
        let reader = FrameReader::with_config(overflow_then_frame(), small_buffer()).unwrap();
        let mut session = Session::new(reader, Vec::new(), quick());

        let err = session.run(&AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, FrameError::BufferOverflow { max: 512, .. }));
        assert_eq!(session.report().overflows, 1);
        assert!(session.sink().is_empty());
    }

    #[test]
    fn overflow_resync_keeps_reading() {
        let reader = FrameReader::with_config(overflow_then_frame(), small_buffer()).unwrap();
        let config = SessionConfig {
            overflow_policy: OverflowPolicy::Resync,
            ..quick()
        };
        let mut session = Session::new(reader, Vec::new(), config);

        let report = session.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(report.overflows, 1);
        assert_eq!(report.frames, 1);
        assert_eq!(session.sink()[0].payload.as_ref(), b"fits");
        assert!(report.bytes_discarded >= 120);
    }

    #[test]
    fn decode_faults_do_not_stop_session() {
        let source = MemorySource::from_chunks([wire(&[
            b"\xFF\xD8ok\xFF\xD9",
            b"junk",
            b"\xFF\xD8\xFF\xD9",
        ])]);
        let sink = FnSink(|frame: &Frame| {
            if frame.payload.starts_with(b"\xFF\xD8") {
                Ok(())
            } else {
                Err(SinkError::Decode("missing SOI marker".to_string()))
            }
        });
        let mut session = Session::new(FrameReader::new(source), sink, quick());

        let report = session.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(report.frames, 3);
        assert_eq!(report.decode_faults, 1);
    }

    #[test]
    fn sink_io_error_is_fatal() {
        let source = MemorySource::from_chunks([wire(&[b"a", b"b"])]);
        let sink = FnSink(|_: &Frame| -> std::result::Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::from(ErrorKind::StorageFull)))
        });
        let mut session = Session::new(FrameReader::new(source), sink, quick());

        let err = session.run(&AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, FrameError::Sink(SinkError::Io(_))));
        assert_eq!(session.report().frames, 1);
    }

    #[test]
    fn report_counts_resyncs() {
        let mut bytes = Delimiter::default().as_bytes().to_vec();
        bytes.extend_from_slice(b"not a header");
        bytes.extend(wire(&[b"good"]));
        let mut session = session_over(MemorySource::from_chunks([bytes]), quick());

        let report = session.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(report.resyncs, 1);

        let (reader, sink) = session.into_parts();
        assert_eq!(reader.reassembler().frames_emitted(), 1);
        assert_eq!(sink.len(), 1);
    }
}
