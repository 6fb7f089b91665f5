use std::path::PathBuf;
use std::time::Duration;

use camstream_frame::{
    Delimiter, FrameConfig, OverflowPolicy, DEFAULT_DELIMITER, DEFAULT_MAX_BUFFER_SIZE,
};
use clap::{ArgGroup, Args, Subcommand, ValueEnum};

use crate::exit::{frame_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod send;
pub mod version;
pub mod view;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reassemble frames from a camera stream.
    View(ViewArgs),
    /// Frame image files onto a stream, like the camera does.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::View(args) => view::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// Framing settings shared by both ends of a stream.
#[derive(Args, Debug)]
pub struct FramingArgs {
    /// Reassembly buffer bound in bytes.
    #[arg(
        long,
        value_name = "BYTES",
        env = "CAMSTREAM_MAX_BUFFER_SIZE",
        default_value_t = DEFAULT_MAX_BUFFER_SIZE
    )]
    pub max_buffer_size: usize,
    /// Frame delimiter; accepts \n, \r, \t, \\ and \xNN escapes.
    #[arg(long, value_name = "TEXT", env = "CAMSTREAM_DELIMITER")]
    pub delimiter: Option<String>,
}

impl FramingArgs {
    pub fn frame_config(&self, read_timeout: Duration) -> CliResult<FrameConfig> {
        let delimiter = match &self.delimiter {
            Some(text) => parse_delimiter(text)?,
            None => DEFAULT_DELIMITER.to_vec(),
        };
        let config = FrameConfig {
            max_buffer_size: self.max_buffer_size,
            delimiter: Delimiter::new(delimiter)
                .map_err(|err| frame_error("invalid --delimiter", err))?,
            read_timeout,
        };
        config
            .validate()
            .map_err(|err| frame_error("invalid framing options", err))?;
        Ok(config)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OverflowArg {
    /// Stop with exit code 60.
    Abort,
    /// Drop the buffer and keep reading.
    Resync,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(arg: OverflowArg) -> Self {
        match arg {
            OverflowArg::Abort => OverflowPolicy::Abort,
            OverflowArg::Resync => OverflowPolicy::Resync,
        }
    }
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["device", "socket"])))]
pub struct ViewArgs {
    /// Serial device, FIFO or capture file to read (`-` for stdin).
    #[arg(long, value_name = "PATH")]
    pub device: Option<PathBuf>,
    /// Unix socket to connect to (e.g. a serial bridge).
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    /// Write every frame to DIR as frame-NNNNNN.jpg.
    #[arg(long, value_name = "DIR")]
    pub save: Option<PathBuf>,
    /// Count frames without JPEG SOI/EOI markers as decode faults and skip them.
    #[arg(long)]
    pub validate_jpeg: bool,
    /// Exit after N frames.
    #[arg(long, value_name = "N")]
    pub count: Option<u64>,
    /// Longest wait for a single read (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub read_timeout: String,
    /// What to do when a header declares a frame larger than the buffer.
    #[arg(long, value_enum, default_value = "abort")]
    pub on_overflow: OverflowArg,
    /// Consecutive read errors tolerated before giving up.
    #[arg(long, default_value_t = 5)]
    pub max_errors: u32,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Image files to send, in order.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
    /// Device, FIFO or file to write to (`-` for stdout).
    #[arg(long, short = 'o', value_name = "PATH", default_value = "-")]
    pub output: PathBuf,
    /// Send the whole file list N times.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,
    /// Pause between frames (e.g. 100ms, 1s).
    #[arg(long)]
    pub interval: Option<String>,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Decode a delimiter given on the command line or in the environment.
pub fn parse_delimiter(input: &str) -> CliResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = u8::from_str_radix(&hex, 16).ok().filter(|_| hex.len() == 2);
                match byte {
                    Some(byte) => out.push(byte),
                    None => {
                        return Err(CliError::usage(format!(
                            "invalid \\x escape in delimiter: \\x{hex}"
                        )))
                    }
                }
            }
            Some(other) => {
                return Err(CliError::usage(format!(
                    "unsupported escape in delimiter: \\{other}"
                )))
            }
            None => return Err(CliError::usage("delimiter ends with a lone backslash")),
        }
    }

    if out.is_empty() {
        return Err(CliError::usage("delimiter must not be empty"));
    }
    Ok(out)
}
