use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{parse_content_length, Frame, FrameConfig};
use crate::delimiter::Delimiter;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 16 * 1024;

/// Counters kept across a session. Observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Frames handed out so far; the last frame's `sequence`.
    pub frames_emitted: u64,
    /// Header units dropped because they carried no usable `Content-Length`.
    pub resyncs: u64,
    /// Bytes dropped without becoming part of a payload.
    pub bytes_discarded: u64,
    /// Headers that declared a frame larger than the buffer bound.
    pub overflows: u64,
}

/// The delimiter/header scan, independent of who owns the buffer.
///
/// [`Reassembler`] drives it over its own accumulator; the async codec drives
/// it over a `FramedRead` buffer.
#[derive(Debug, Clone)]
pub struct FrameScanner {
    delimiter: Delimiter,
    max_buffer_size: usize,
    stats: ReassemblerStats,
}

impl FrameScanner {
    /// Create a scanner from a validated configuration.
    pub fn new(config: &FrameConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            delimiter: config.delimiter.clone(),
            max_buffer_size: config.max_buffer_size,
            stats: ReassemblerStats::default(),
        })
    }

    /// Cut the next complete frame out of `buf`.
    ///
    /// Returns `Ok(None)` once no further progress is possible with the bytes
    /// at hand. Consumed bytes, dropped header units and the trimmed prefix of
    /// a delimiter-free buffer are removed from the front of `buf`.
    ///
    /// A header whose frame would end beyond `max_buffer_size` yields
    /// [`FrameError::BufferOverflow`] and leaves `buf` untouched. The scan does
    /// not count it; whoever surfaces the error calls
    /// [`record_overflow`](Self::record_overflow).
    pub fn scan(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        let delim_len = self.delimiter.len();

        loop {
            let Some(first) = self.delimiter.find(&buf[..], 0) else {
                self.retain_tail(buf, delim_len);
                return Ok(None);
            };

            let header_start = first + delim_len;
            let Some(second) = self.delimiter.find(&buf[..], header_start) else {
                return Ok(None);
            };

            let Some(payload_len) = parse_content_length(&buf[header_start..second]) else {
                debug!(
                    dropped = second,
                    "segment between delimiters is not a header, resynchronizing"
                );
                self.discard(buf, second);
                self.stats.resyncs += 1;
                continue;
            };

            let payload_start = second + delim_len;
            let frame_end = match payload_start.checked_add(payload_len) {
                Some(end) if end <= self.max_buffer_size => end,
                end => {
                    return Err(FrameError::BufferOverflow {
                        required: end.unwrap_or(usize::MAX),
                        max: self.max_buffer_size,
                    });
                }
            };

            if buf.len() < frame_end {
                trace!(
                    have = buf.len(),
                    need = frame_end,
                    "waiting for rest of payload"
                );
                return Ok(None);
            }

            self.stats.bytes_discarded += first as u64;
            buf.advance(payload_start);
            let payload = buf.split_to(payload_len).freeze();
            // The trailing delimiter is consumed unseen; it may not have arrived yet.
            buf.advance(delim_len.min(buf.len()));

            self.stats.frames_emitted += 1;
            return Ok(Some(Frame {
                sequence: self.stats.frames_emitted,
                payload,
            }));
        }
    }

    /// Count and log an overflow that is being reported to the caller.
    pub fn record_overflow(&mut self, err: &FrameError) {
        if let FrameError::BufferOverflow { required, max } = err {
            self.stats.overflows += 1;
            warn!(required, max, "declared frame does not fit in buffer");
        }
    }

    /// Drop the oldest bytes so `buf` holds at most `max_buffer_size`.
    pub fn enforce_bound(&mut self, buf: &mut BytesMut) {
        if buf.len() > self.max_buffer_size {
            let excess = buf.len() - self.max_buffer_size;
            warn!(
                dropped = excess,
                max = self.max_buffer_size,
                "buffer full, dropping oldest bytes"
            );
            self.discard(buf, excess);
        }
    }

    /// Keep only the last `keep` bytes; anything earlier cannot start a delimiter.
    fn retain_tail(&mut self, buf: &mut BytesMut, keep: usize) {
        if buf.len() > keep {
            let excess = buf.len() - keep;
            self.discard(buf, excess);
        }
    }

    fn discard(&mut self, buf: &mut BytesMut, count: usize) {
        buf.advance(count);
        self.stats.bytes_discarded += count as u64;
    }

    pub fn delimiter(&self) -> &Delimiter {
        &self.delimiter
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }
}

/// Owns the session accumulator and extracts frames from it.
///
/// Feed arrivals with [`push`](Self::push), then call
/// [`extract_frames`](Self::extract_frames) (or [`next_frame`](Self::next_frame)
/// repeatedly). After every call the accumulator holds at most
/// `max_buffer_size` bytes.
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
    scanner: FrameScanner,
}

impl Reassembler {
    /// Create a reassembler with explicit configuration.
    pub fn new(config: &FrameConfig) -> Result<Self> {
        let scanner = FrameScanner::new(config)?;
        Ok(Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY.min(config.max_buffer_size)),
            scanner,
        })
    }

    /// Append received bytes, dropping the oldest ones beyond the bound.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.scanner.enforce_bound(&mut self.buf);
    }

    /// Extract a single frame, if one is complete.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.scanner.scan(&mut self.buf).inspect_err(|err| {
            self.scanner.record_overflow(err);
        })
    }

    /// Extract every complete frame, in arrival order.
    ///
    /// The bound is checked against where the frame would end in the current
    /// buffer, so line noise still sitting ahead of the first delimiter counts
    /// toward it. A frame that would fit on its own can overflow behind enough
    /// junk.
    ///
    /// Frames found before an oversized header are returned as `Ok`; the
    /// oversized header stays at the front and the next call reports
    /// [`FrameError::BufferOverflow`] without emitting anything. After an
    /// overflow the caller either gives up or calls [`clear`](Self::clear).
    pub fn extract_frames(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        loop {
            match self.scanner.scan(&mut self.buf) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                Err(err) if frames.is_empty() => {
                    self.scanner.record_overflow(&err);
                    return Err(err);
                }
                Err(_) => return Ok(frames),
            }
        }
    }

    /// Discard everything buffered. Returns the number of bytes dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.buf.len();
        self.scanner.discard(&mut self.buf, dropped);
        dropped
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Frames emitted so far in this session.
    pub fn frames_emitted(&self) -> u64 {
        self.scanner.stats.frames_emitted
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.scanner.stats()
    }

    pub fn delimiter(&self) -> &Delimiter {
        self.scanner.delimiter()
    }

    pub fn max_buffer_size(&self) -> usize {
        self.scanner.max_buffer_size()
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        let config = FrameConfig::default();
        Self {
            delimiter: config.delimiter,
            max_buffer_size: config.max_buffer_size,
            stats: ReassemblerStats::default(),
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scanner: FrameScanner::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;

    const D: &[u8] = b"\nD\n";

    fn small(max_buffer_size: usize) -> Reassembler {
        Reassembler::new(&FrameConfig {
            max_buffer_size,
            delimiter: Delimiter::new(D).unwrap(),
            ..FrameConfig::default()
        })
        .unwrap()
    }

    fn unit(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(D);
        out.extend_from_slice(format!("Content-Length: {}", payload.len()).as_bytes());
        out.extend_from_slice(D);
        out.extend_from_slice(payload);
        out.extend_from_slice(D);
        out
    }

    fn payloads(frames: &[Frame]) -> Vec<&[u8]> {
        frames.iter().map(|f| f.payload.as_ref()).collect()
    }

    /// Feed `wire` in chunks of the given sizes (cycled), collecting every frame.
    fn feed_chunked(reassembler: &mut Reassembler, wire: &[u8], sizes: &[usize]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut offset = 0;
        let mut i = 0;
        while offset < wire.len() {
            let end = (offset + sizes[i % sizes.len()]).min(wire.len());
            reassembler.push(&wire[offset..end]);
            frames.extend(reassembler.extract_frames().unwrap());
            assert!(reassembler.len() <= reassembler.max_buffer_size());
            offset = end;
            i += 1;
        }
        frames
    }

    #[test]
    fn single_frame_in_one_call() {
        let mut r = small(1000);
        r.push(b"\nD\nContent-Length: 3\nD\nABC\nD\n");

        let frames = r.extract_frames().unwrap();
        assert_eq!(payloads(&frames), vec![&b"ABC"[..]]);
        assert_eq!(frames[0].sequence, 1);
        assert!(r.is_empty());
        assert_eq!(r.frames_emitted(), 1);
    }

    #[test]
    fn split_after_byte_ten() {
        let wire = b"\nD\nContent-Length: 3\nD\nABC\nD\n";
        let mut r = small(1000);

        r.push(&wire[..10]);
        assert!(r.extract_frames().unwrap().is_empty());
        assert_eq!(r.buffered(), &wire[..10]);

        r.push(&wire[10..]);
        let frames = r.extract_frames().unwrap();
        assert_eq!(payloads(&frames), vec![&b"ABC"[..]]);
        assert!(r.is_empty());
    }

    #[test]
    fn framing_is_independent_of_chunking() {
        let delimiter = Delimiter::default();
        let originals: Vec<Vec<u8>> = vec![
            b"\xFF\xD8first\xFF\xD9".to_vec(),
            Vec::new(),
            (0..5000u32).map(|i| (i % 251) as u8).collect(),
            b"x".to_vec(),
            vec![b'\n'; 64],
        ];
        let mut wire = BytesMut::new();
        for payload in &originals {
            encode_frame(payload, &delimiter, &mut wire);
        }

        let chunkings: [&[usize]; 7] = [
            &[1],
            &[2],
            &[7, 1, 13],
            &[29],
            &[30, 28],
            &[1000],
            &[wire.len()],
        ];
        for sizes in chunkings {
            let mut r = Reassembler::default();
            let frames = feed_chunked(&mut r, &wire, sizes);

            let got: Vec<&[u8]> = payloads(&frames);
            let want: Vec<&[u8]> = originals.iter().map(Vec::as_slice).collect();
            assert_eq!(got, want, "chunk sizes {sizes:?}");
            let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
            assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
            // Small chunks emit the last frame before its trailing delimiter lands.
            assert!(
                r.is_empty() || r.buffered() == delimiter.as_bytes(),
                "chunk sizes {sizes:?}, left {:?}",
                r.buffered()
            );
        }
    }

    #[test]
    fn pseudo_random_chunking() {
        let mut wire = Vec::new();
        let mut want = Vec::new();
        for i in 0..40u8 {
            let payload: Vec<u8> = (0..(i as usize * 7)).map(|j| (j as u8) ^ i).collect();
            wire.extend(unit(&payload));
            want.push(payload);
        }

        let mut state = 0x2545_F491_u32;
        let mut sizes = Vec::new();
        for _ in 0..64 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            sizes.push(1 + (state >> 16) as usize % 97);
        }

        let mut r = small(4096);
        let frames = feed_chunked(&mut r, &wire, &sizes);
        let got: Vec<Vec<u8>> = frames.into_iter().map(|f| f.payload.to_vec()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn insufficient_payload_leaves_buffer_unchanged() {
        let mut r = small(1000);
        let partial = b"\nD\nContent-Length: 10\nD\nabc";
        r.push(partial);

        assert!(r.extract_frames().unwrap().is_empty());
        assert_eq!(r.buffered(), partial);
        assert!(r.extract_frames().unwrap().is_empty());
        assert_eq!(r.buffered(), partial);
    }

    #[test]
    fn single_delimiter_waits_for_header() {
        let mut r = small(1000);
        r.push(b"noise\nD\nContent-Len");

        assert!(r.extract_frames().unwrap().is_empty());
        assert_eq!(r.buffered(), b"noise\nD\nContent-Len");
    }

    #[test]
    fn garbage_segment_is_resynchronized() {
        let mut wire = Vec::new();
        wire.extend_from_slice(D);
        wire.extend_from_slice(b"garbage without length");
        wire.extend(unit(b"valid"));

        let mut r = small(1000);
        r.push(&wire);
        let frames = r.extract_frames().unwrap();

        assert_eq!(payloads(&frames), vec![&b"valid"[..]]);
        assert_eq!(r.stats().resyncs, 1);
        assert!(r.is_empty());
    }

    #[test]
    fn truncated_frame_recovers_on_next_unit() {
        // A frame cut short by a dropped serial chunk, followed by two good ones.
        let mut wire = unit(b"0123456789");
        wire.truncate(D.len() + "Content-Length: 10".len() + D.len() + 4);
        wire.extend(unit(b"ok"));

        let mut r = small(1000);
        r.push(&wire);
        let frames = r.extract_frames().unwrap();

        // The short frame borrows bytes from the next header; "ok" is lost and
        // its leftover segment is dropped as noise.
        assert_eq!(payloads(&frames), vec![&b"0123\nD\nCon"[..]]);
        assert_eq!(r.stats().resyncs, 1);
        assert_eq!(r.buffered(), D);

        r.push(&unit(b"next"));
        let frames = r.extract_frames().unwrap();
        assert_eq!(payloads(&frames), vec![&b"next"[..]]);
        assert!(r.is_empty());
    }

    #[test]
    fn unparseable_length_is_treated_as_noise() {
        let mut wire = Vec::new();
        wire.extend_from_slice(D);
        wire.extend_from_slice(b"Content-Length: 99999999999999999999999999999");
        wire.extend(unit(b"next"));

        let mut r = small(1000);
        r.push(&wire);
        let frames = r.extract_frames().unwrap();

        assert_eq!(payloads(&frames), vec![&b"next"[..]]);
        assert_eq!(r.stats().overflows, 0);
        assert_eq!(r.stats().resyncs, 1);
    }

    #[test]
    fn no_delimiter_bounds_growth() {
        let mut r = small(1000);
        for chunk in [&b"abcdefgh"[..], b"ijklmnop", b"q", b"\n", b"D", b"rstuvwxyz"] {
            r.push(chunk);
            assert!(r.extract_frames().unwrap().is_empty());
            assert!(r.len() <= D.len());
        }
        assert_eq!(r.buffered(), b"xyz");
    }

    #[test]
    fn split_delimiter_survives_trim() {
        let wire = unit(b"PAY");
        let mut r = small(1000);

        r.push(b"line noise before the camera boots\n");
        assert!(r.extract_frames().unwrap().is_empty());
        assert_eq!(r.buffered(), b"ts\n");

        r.push(b"D\n");
        r.push(&wire);
        let frames = r.extract_frames().unwrap();
        // "\nD\n" assembled across the trim boundary acts as a first delimiter
        // whose "header" is empty, so it is resynchronized away.
        assert_eq!(payloads(&frames), vec![&b"PAY"[..]]);
    }

    #[test]
    fn overflow_is_reported_once_without_frames() {
        let mut r = small(1000);
        let header = b"\nD\nContent-Length: 2000\nD\n";
        r.push(header);

        let err = r.extract_frames().unwrap_err();
        match err {
            FrameError::BufferOverflow { required, max } => {
                assert_eq!(required, header.len() + 2000);
                assert_eq!(max, 1000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(r.stats().overflows, 1);
        assert_eq!(r.frames_emitted(), 0);
        assert_eq!(r.buffered(), header);

        assert_eq!(r.clear(), header.len());
        assert!(r.extract_frames().unwrap().is_empty());
    }

    #[test]
    fn overflow_arithmetic_does_not_wrap() {
        let mut r = small(1000);
        r.push(format!("\nD\nContent-Length: {}\nD\n", usize::MAX).as_bytes());

        assert!(matches!(
            r.extract_frames(),
            Err(FrameError::BufferOverflow {
                required: usize::MAX,
                max: 1000
            })
        ));
    }

    #[test]
    fn frames_before_overflow_are_kept() {
        let mut r = small(1000);
        r.push(&unit(b"ABC"));
        r.push(b"\nD\nContent-Length: 5000\nD\n");

        let frames = r.extract_frames().unwrap();
        assert_eq!(payloads(&frames), vec![&b"ABC"[..]]);

        assert!(matches!(
            r.extract_frames(),
            Err(FrameError::BufferOverflow { .. })
        ));
        assert_eq!(r.stats().overflows, 1);
    }

    #[test]
    fn run_of_bare_delimiters_terminates() {
        let mut r = small(1000);
        r.push(&D.repeat(10));

        assert!(r.extract_frames().unwrap().is_empty());
        assert_eq!(r.buffered(), D);
        assert_eq!(r.stats().resyncs, 9);
    }

    #[test]
    fn overlapping_delimiter_pattern_terminates() {
        let mut r = Reassembler::new(&FrameConfig {
            max_buffer_size: 64,
            delimiter: Delimiter::new(b"aa").unwrap(),
            ..FrameConfig::default()
        })
        .unwrap();
        r.push(b"aaaaaaaaa");

        assert!(r.extract_frames().unwrap().is_empty());
        assert!(r.len() <= 3);
    }

    #[test]
    fn noise_ahead_of_header_counts_toward_bound() {
        let payload = [b'j'; 40];
        let framed = unit(&payload);
        let header_len = framed.len() - payload.len() - D.len();

        let mut clean = small(100);
        clean.push(&framed);
        assert_eq!(payloads(&clean.extract_frames().unwrap()), vec![&payload[..]]);

        let mut noisy = small(100);
        noisy.push(&[b'x'; 60]);
        noisy.push(&framed[..header_len + 10]);
        assert!(matches!(
            noisy.extract_frames(),
            Err(FrameError::BufferOverflow {
                required: 124,
                max: 100
            })
        ));
    }

    #[test]
    fn lone_trailing_delimiter_stays_buffered() {
        let delimiter = Delimiter::default();
        let mut wire = BytesMut::new();
        encode_frame(b"\xFF\xD8jpeg\xFF\xD9", &delimiter, &mut wire);

        let mut r = Reassembler::default();
        let frames = feed_chunked(&mut r, &wire, &[1]);

        assert_eq!(payloads(&frames), vec![&b"\xFF\xD8jpeg\xFF\xD9"[..]]);
        assert_eq!(r.buffered(), delimiter.as_bytes());
        assert!(r.extract_frames().unwrap().is_empty());
        assert_eq!(r.buffered(), delimiter.as_bytes());
        assert_eq!(r.stats().bytes_discarded, 0);
    }

    #[test]
    fn trailing_delimiter_may_arrive_later() {
        let first = unit(b"ABC");
        let second = unit(b"XYZ");
        let mut r = small(1000);

        r.push(&first[..first.len() - 2]);
        let frames = r.extract_frames().unwrap();
        assert_eq!(payloads(&frames), vec![&b"ABC"[..]]);
        assert!(r.is_empty());

        r.push(&first[first.len() - 2..]);
        r.push(&second);
        let frames = r.extract_frames().unwrap();
        assert_eq!(payloads(&frames), vec![&b"XYZ"[..]]);
        assert_eq!(frames[0].sequence, 2);
    }

    #[test]
    fn leading_noise_before_first_frame() {
        let mut wire = b"boot: rst:0x1 (POWERON_RESET)\r\n".to_vec();
        wire.extend(unit(b"IMG"));

        let mut r = small(1000);
        r.push(&wire);
        let frames = r.extract_frames().unwrap();

        assert_eq!(payloads(&frames), vec![&b"IMG"[..]]);
        assert!(r.stats().bytes_discarded >= 31);
    }

    #[test]
    fn push_drops_oldest_bytes_beyond_bound() {
        let mut r = small(64);
        r.push(&[b'z'; 100]);

        assert_eq!(r.len(), 64);
        assert_eq!(r.stats().bytes_discarded, 36);

        assert!(r.extract_frames().unwrap().is_empty());
        assert_eq!(r.len(), D.len());
    }

    #[test]
    fn payload_may_contain_delimiter() {
        let mut r = small(1000);
        r.push(&unit(b"a\nD\nb"));
        r.push(&unit(b"c"));

        let frames = r.extract_frames().unwrap();
        assert_eq!(payloads(&frames), vec![&b"a\nD\nb"[..], &b"c"[..]]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = FrameConfig {
            max_buffer_size: 2,
            delimiter: Delimiter::new(D).unwrap(),
            ..FrameConfig::default()
        };
        assert!(matches!(
            Reassembler::new(&config),
            Err(FrameError::InvalidConfig(_))
        ));
    }
}
