//! Decode a raw capture of a camera stream and write each image to disk.
//!
//! Run with:
//!   cargo run --example decode-capture -- capture.bin out/
//!
//! A capture can be produced with `cat /dev/ttyUSB0 > capture.bin` or with
//! `camstream send --output capture.bin image.jpg`.

use std::fs;
use std::path::PathBuf;

use camstream::frame::{FrameError, FrameReader};
use camstream::transport::MemorySource;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args_os().skip(1);
    let (Some(capture), Some(out_dir)) = (args.next(), args.next()) else {
        eprintln!("usage: decode-capture <CAPTURE> <OUT_DIR>");
        std::process::exit(64);
    };
    let out_dir = PathBuf::from(out_dir);
    fs::create_dir_all(&out_dir)?;

    let bytes = fs::read(&capture)?;
    let mut reader = FrameReader::new(MemorySource::from_chunks([bytes]));

    loop {
        match reader.read_frame() {
            Ok(frame) => {
                let path = out_dir.join(format!("frame-{:06}.jpg", frame.sequence));
                fs::write(&path, &frame.payload)?;
                eprintln!("{} ({} bytes)", path.display(), frame.len());
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(err.into()),
        }
    }

    let stats = reader.reassembler().stats();
    eprintln!(
        "{} frames, {} resyncs, {} bytes discarded",
        stats.frames_emitted, stats.resyncs, stats.bytes_discarded
    );
    Ok(())
}
