use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use camstream_frame::{FrameWriter, DEFAULT_READ_TIMEOUT};
use tracing::{debug, info};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_send_summary, OutputFormat, SendSummary};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;
    let config = args.framing.frame_config(DEFAULT_READ_TIMEOUT)?;

    let payloads = args
        .files
        .iter()
        .map(|path| {
            fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
        })
        .collect::<CliResult<Vec<_>>>()?;

    let to_stdout = args.output == Path::new("-");
    let out: Box<dyn Write> = if to_stdout {
        Box::new(std::io::stdout().lock())
    } else {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&args.output)
            .map_err(|err| {
                io_error(&format!("failed opening {}", args.output.display()), err)
            })?;
        Box::new(file)
    };

    let mut writer = FrameWriter::with_config(out, config)
        .map_err(|err| frame_error("invalid framing options", err))?;

    for round in 0..args.repeat {
        for (payload, path) in payloads.iter().zip(&args.files) {
            if writer.frames_written() > 0 {
                if let Some(interval) = interval {
                    std::thread::sleep(interval);
                }
            }
            let written = writer
                .send(payload)
                .map_err(|err| frame_error(&format!("failed sending {}", path.display()), err))?;
            debug!(round, file = %path.display(), written, "frame sent");
        }
    }

    let frames = writer.frames_written();
    let bytes = writer.bytes_written();
    info!(frames, bytes, "stream written");
    if !to_stdout {
        print_send_summary(
            &SendSummary {
                output: args.output.display().to_string(),
                frames,
                bytes,
            },
            format,
        );
    }
    Ok(SUCCESS)
}
