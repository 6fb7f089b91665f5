use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camstream_frame::{FrameReader, Session, SessionConfig};
use camstream_transport::ByteSource;
use tracing::info;

use crate::cmd::{parse_duration, ViewArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};
use crate::sink::ViewSink;

pub fn run(args: ViewArgs, format: OutputFormat) -> CliResult<i32> {
    let read_timeout = parse_duration(&args.read_timeout)?;
    let frame_config = args.framing.frame_config(read_timeout)?;
    let session_config = SessionConfig {
        overflow_policy: args.on_overflow.into(),
        max_consecutive_errors: args.max_errors,
        max_frames: args.count,
        ..SessionConfig::default()
    };

    if let Some(dir) = &args.save {
        fs::create_dir_all(dir)
            .map_err(|err| io_error(&format!("failed creating {}", dir.display()), err))?;
    }

    let source = open_source(&args)?;
    let reader = FrameReader::with_config(source, frame_config)
        .map_err(|err| frame_error("invalid framing options", err))?;
    let sink = ViewSink::new(format)
        .validate_jpeg(args.validate_jpeg)
        .save_to(args.save.clone());

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut session = Session::new(reader, sink, session_config);
    let result = session.run(&running);
    print_report(session.report(), format);

    match result {
        Ok(report) => {
            info!(frames = report.frames, "viewer stopped");
            Ok(SUCCESS)
        }
        Err(err) => Err(frame_error("stream session failed", err)),
    }
}

#[cfg(unix)]
fn open_source(args: &ViewArgs) -> CliResult<Box<dyn ByteSource>> {
    use std::path::Path;

    use camstream_transport::{DeviceSource, SocketSource};

    use crate::exit::transport_error;

    if let Some(path) = &args.socket {
        let source =
            SocketSource::connect(path).map_err(|err| transport_error("connect failed", err))?;
        return Ok(Box::new(source));
    }

    let path = match args.device.as_deref() {
        Some(path) if path == Path::new("-") => Path::new("/dev/stdin"),
        Some(path) => path,
        None => return Err(CliError::usage("either --device or --socket is required")),
    };
    let source = DeviceSource::open(path).map_err(|err| transport_error("open failed", err))?;
    Ok(Box::new(source))
}

#[cfg(not(unix))]
fn open_source(_args: &ViewArgs) -> CliResult<Box<dyn ByteSource>> {
    Err(CliError::usage(
        "serial devices and sockets are only supported on Unix platforms",
    ))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
